//! Webhook intake: signature verification and event decoding.
//!
//! Verification is the only integrity check between an attacker and an
//! arbitrary tier grant, so it runs before any field of the payload is
//! interpreted. The scheme is the provider's standard one: a
//! `t=<unix>,v1=<hex>` header, HMAC-SHA256 over `"{t}.{body}"` with the
//! shared endpoint secret, plus a freshness window against replays.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use tracing::warn;

use crate::billing::reconciler::{BillingEvent, ReconcileInput};
use crate::errors::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum accepted age of a signed payload.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Verifies the signature header against the raw body, then decodes the
/// event. `now` is the caller's unix clock.
pub fn construct_event(
    payload: &str,
    signature_header: &str,
    secret: &str,
    now: i64,
) -> Result<BillingEvent, AppError> {
    verify_signature(payload, signature_header, secret, now)?;
    decode_event(payload)
}

/// Checks `signature_header` against the HMAC of `"{t}.{payload}"`.
/// Any malformed header, stale timestamp or signature mismatch is the same
/// `InvalidSignature` error — callers get no oracle for which part failed.
pub fn verify_signature(
    payload: &str,
    signature_header: &str,
    secret: &str,
    now: i64,
) -> Result<(), AppError> {
    let (timestamp, candidates) = parse_signature_header(signature_header)?;

    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(AppError::InvalidSignature);
    }

    let signed_payload = format!("{timestamp}.{payload}");
    let mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::InvalidSignature)?;

    for candidate in candidates {
        let Ok(bytes) = hex::decode(candidate) else {
            continue;
        };
        let mut mac = mac.clone();
        mac.update(signed_payload.as_bytes());
        if mac.verify_slice(&bytes).is_ok() {
            return Ok(());
        }
    }

    Err(AppError::InvalidSignature)
}

/// Parses `t=<unix>,v1=<hex>[,v1=<hex>...]`, ignoring unknown schemes.
fn parse_signature_header(header: &str) -> Result<(i64, Vec<&str>), AppError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = value.parse().ok();
            }
            Some(("v1", value)) => candidates.push(value),
            _ => {}
        }
    }

    match (timestamp, candidates.is_empty()) {
        (Some(t), false) => Ok((t, candidates)),
        _ => Err(AppError::InvalidSignature),
    }
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(rename = "type")]
    kind: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: serde_json::Value,
}

/// Decodes a verified payload into the provider-neutral event the
/// reconciler consumes.
fn decode_event(payload: &str) -> Result<BillingEvent, AppError> {
    let envelope: EventEnvelope = serde_json::from_str(payload)
        .map_err(|e| AppError::Validation(format!("Malformed webhook payload: {e}")))?;
    let object = &envelope.data.object;

    let event = match envelope.kind.as_str() {
        "checkout.session.completed" => {
            let metadata = &object["metadata"];
            let user_id = metadata["userId"].as_str();
            let plan_name = metadata["planName"].as_str();
            match (user_id, plan_name) {
                (Some(user_id), Some(plan_name)) => {
                    BillingEvent::CheckoutCompleted(ReconcileInput {
                        user_id: user_id.to_string(),
                        plan_name: plan_name.to_string(),
                        subscription_ref: field_ref(object, "subscription"),
                        customer_ref: field_ref(object, "customer"),
                        customer_email: object["customer_details"]["email"]
                            .as_str()
                            .map(str::to_string),
                    })
                }
                _ => {
                    warn!("Checkout session event missing user metadata");
                    BillingEvent::Unhandled {
                        kind: envelope.kind.clone(),
                    }
                }
            }
        }
        "invoice.payment_succeeded" => match field_ref(object, "customer") {
            Some(customer_ref) => BillingEvent::InvoicePaid { customer_ref },
            None => BillingEvent::Unhandled {
                kind: envelope.kind.clone(),
            },
        },
        "customer.subscription.deleted" => match field_ref(object, "customer") {
            Some(customer_ref) => BillingEvent::SubscriptionDeleted { customer_ref },
            None => BillingEvent::Unhandled {
                kind: envelope.kind.clone(),
            },
        },
        "invoice.payment_failed" => match field_ref(object, "customer") {
            Some(customer_ref) => BillingEvent::InvoicePaymentFailed { customer_ref },
            None => BillingEvent::Unhandled {
                kind: envelope.kind.clone(),
            },
        },
        _ => BillingEvent::Unhandled {
            kind: envelope.kind.clone(),
        },
    };

    Ok(event)
}

/// Reads a field that may be a bare id string or an expanded object.
fn field_ref(object: &serde_json::Value, field: &str) -> Option<String> {
    let value = &object[field];
    value
        .as_str()
        .map(str::to_string)
        .or_else(|| value["id"].as_str().map(str::to_string))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn sign(payload: &str, timestamp: i64, secret: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.{payload}").as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        format!("t={timestamp},v1={signature}")
    }

    #[test]
    fn test_valid_signature_accepted() {
        let payload = r#"{"type":"invoice.payment_succeeded","data":{"object":{"customer":"cus_1"}}}"#;
        let now = 1_700_000_000;
        let header = sign(payload, now, SECRET);
        assert!(verify_signature(payload, &header, SECRET, now).is_ok());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let payload = r#"{"type":"invoice.payment_succeeded","data":{"object":{"customer":"cus_1"}}}"#;
        let now = 1_700_000_000;
        let header = sign(payload, now, SECRET);
        let tampered = payload.replace("cus_1", "cus_2");
        match verify_signature(&tampered, &header, SECRET, now) {
            Err(AppError::InvalidSignature) => {}
            other => panic!("expected InvalidSignature, got {other:?}"),
        }
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let payload = "{}";
        let now = 1_700_000_000;
        let header = sign(payload, now, "whsec_other");
        assert!(verify_signature(payload, &header, SECRET, now).is_err());
    }

    #[test]
    fn test_stale_timestamp_rejected() {
        let payload = "{}";
        let then = 1_700_000_000;
        let header = sign(payload, then, SECRET);
        let now = then + SIGNATURE_TOLERANCE_SECS + 1;
        assert!(verify_signature(payload, &header, SECRET, now).is_err());
    }

    #[test]
    fn test_malformed_header_rejected() {
        assert!(verify_signature("{}", "garbage", SECRET, 0).is_err());
        assert!(verify_signature("{}", "t=notanumber,v1=aa", SECRET, 0).is_err());
        assert!(verify_signature("{}", "t=123", SECRET, 123).is_err());
    }

    #[test]
    fn test_decode_checkout_completed() {
        let payload = serde_json::json!({
            "type": "checkout.session.completed",
            "data": { "object": {
                "metadata": { "userId": "u1", "planName": "Premium+" },
                "subscription": "sub_1",
                "customer": "cus_1",
                "customer_details": { "email": "payer@example.com" }
            }}
        })
        .to_string();
        match decode_event(&payload).unwrap() {
            BillingEvent::CheckoutCompleted(input) => {
                assert_eq!(input.user_id, "u1");
                assert_eq!(input.plan_name, "Premium+");
                assert_eq!(input.subscription_ref.as_deref(), Some("sub_1"));
                assert_eq!(input.customer_ref.as_deref(), Some("cus_1"));
                assert_eq!(input.customer_email.as_deref(), Some("payer@example.com"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_checkout_without_metadata_is_unhandled() {
        let payload = serde_json::json!({
            "type": "checkout.session.completed",
            "data": { "object": { "customer": "cus_1" } }
        })
        .to_string();
        assert!(matches!(
            decode_event(&payload).unwrap(),
            BillingEvent::Unhandled { .. }
        ));
    }

    #[test]
    fn test_decode_expanded_customer_object() {
        let payload = serde_json::json!({
            "type": "customer.subscription.deleted",
            "data": { "object": { "customer": { "id": "cus_9" } } }
        })
        .to_string();
        match decode_event(&payload).unwrap() {
            BillingEvent::SubscriptionDeleted { customer_ref } => {
                assert_eq!(customer_ref, "cus_9")
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_decode_unknown_kind_is_unhandled() {
        let payload = serde_json::json!({
            "type": "charge.refunded",
            "data": { "object": {} }
        })
        .to_string();
        assert!(matches!(
            decode_event(&payload).unwrap(),
            BillingEvent::Unhandled { kind } if kind == "charge.refunded"
        ));
    }
}
