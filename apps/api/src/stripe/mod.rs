//! Stripe client — the single point of entry for all payment-provider
//! calls in Align.
//!
//! ARCHITECTURAL RULE: no other module may call the Stripe API directly.
//! The surface is small (checkout sessions, subscription cancel/list), so
//! this is a thin form-encoded wrapper over the REST API with typed
//! responses. Calls are single-shot with a bounded timeout: apart from the
//! webhook path, none of these operations is safely retryable without
//! first checking for side effects.

use std::collections::HashMap;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::errors::AppError;

pub mod webhook;

const STRIPE_API_URL: &str = "https://api.stripe.com/v1";
const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Free-trial window granted on every new subscription checkout.
const TRIAL_PERIOD_DAYS: &str = "7";

#[derive(Debug, Error)]
pub enum StripeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

impl StripeError {
    /// True when the provider reports the referenced object no longer
    /// exists — e.g. cancelling a subscription that is already gone.
    pub fn is_resource_missing(&self) -> bool {
        matches!(self, StripeError::Api { status: 404, .. })
    }
}

impl From<StripeError> for AppError {
    fn from(e: StripeError) -> Self {
        match e {
            StripeError::Http(e) => AppError::PaymentProvider {
                status: e.status().map(|s| s.as_u16()).unwrap_or(0),
                message: e.to_string(),
            },
            StripeError::Api { status, message } => AppError::PaymentProvider { status, message },
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeApiError {
    error: StripeApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeApiErrorBody {
    message: Option<String>,
}

/// A field the API returns either as a bare id or as the expanded object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expandable<T> {
    Object(T),
    Id(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub id: String,
    pub status: String,
    pub canceled_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub description: Option<String>,
    pub quantity: Option<i64>,
    pub amount_total: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct List<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub status: Option<String>,
    pub payment_status: String,
    pub customer: Option<Expandable<Customer>>,
    pub customer_details: Option<CustomerDetails>,
    pub subscription: Option<Expandable<Subscription>>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    pub created: i64,
    pub line_items: Option<List<LineItem>>,
}

impl CheckoutSession {
    pub fn customer_ref(&self) -> Option<&str> {
        match self.customer.as_ref()? {
            Expandable::Object(c) => Some(&c.id),
            Expandable::Id(id) => Some(id),
        }
    }

    /// Email from the expanded customer, falling back to checkout details.
    pub fn customer_email(&self) -> Option<&str> {
        if let Some(Expandable::Object(c)) = self.customer.as_ref() {
            if let Some(email) = c.email.as_deref() {
                return Some(email);
            }
        }
        self.customer_details.as_ref()?.email.as_deref()
    }

    pub fn subscription_ref(&self) -> Option<&str> {
        match self.subscription.as_ref()? {
            Expandable::Object(s) => Some(&s.id),
            Expandable::Id(id) => Some(id),
        }
    }
}

/// Parameters for creating a subscription checkout session.
#[derive(Debug, Clone)]
pub struct CreateCheckoutSession {
    pub price_id: String,
    pub plan_name: String,
    pub user_id: String,
    pub user_email: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Self {
        Self {
            client: Client::builder()
                .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            secret_key,
        }
    }

    /// Creates a subscription-mode checkout session carrying the user and
    /// plan in metadata (both on the session and on the subscription, so
    /// webhook events can be attributed either way).
    pub async fn create_checkout_session(
        &self,
        params: &CreateCheckoutSession,
    ) -> Result<CheckoutSession, StripeError> {
        let form: Vec<(&str, &str)> = vec![
            ("mode", "subscription"),
            ("payment_method_types[0]", "card"),
            ("line_items[0][price]", params.price_id.as_str()),
            ("line_items[0][quantity]", "1"),
            ("success_url", params.success_url.as_str()),
            ("cancel_url", params.cancel_url.as_str()),
            ("customer_email", params.user_email.as_str()),
            ("billing_address_collection", "auto"),
            ("metadata[userId]", params.user_id.as_str()),
            ("metadata[planName]", params.plan_name.as_str()),
            ("subscription_data[trial_period_days]", TRIAL_PERIOD_DAYS),
            ("subscription_data[metadata][userId]", params.user_id.as_str()),
            ("subscription_data[metadata][planName]", params.plan_name.as_str()),
        ];

        let response = self
            .client
            .post(format!("{STRIPE_API_URL}/checkout/sessions"))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Retrieves a checkout session with customer, subscription and line
    /// items expanded.
    pub async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<CheckoutSession, StripeError> {
        let response = self
            .client
            .get(format!("{STRIPE_API_URL}/checkout/sessions/{session_id}"))
            .bearer_auth(&self.secret_key)
            .query(&[
                ("expand[]", "customer"),
                ("expand[]", "subscription"),
                ("expand[]", "line_items"),
            ])
            .send()
            .await?;

        Self::parse_response(response).await
    }

    pub async fn cancel_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Subscription, StripeError> {
        let response = self
            .client
            .delete(format!("{STRIPE_API_URL}/subscriptions/{subscription_id}"))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    pub async fn list_active_subscriptions(
        &self,
        customer_ref: &str,
    ) -> Result<Vec<Subscription>, StripeError> {
        let response = self
            .client
            .get(format!("{STRIPE_API_URL}/subscriptions"))
            .bearer_auth(&self.secret_key)
            .query(&[("customer", customer_ref), ("status", "active")])
            .send()
            .await?;

        let list: List<Subscription> = Self::parse_response(response).await?;
        Ok(list.data)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, StripeError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<StripeApiError>(&body)
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or(body);
            return Err(StripeError::Api {
                status: status.as_u16(),
                message,
            });
        }

        debug!("Stripe call succeeded: {status}");
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expandable_deserializes_bare_id() {
        let session: CheckoutSession = serde_json::from_value(serde_json::json!({
            "id": "cs_test_1",
            "payment_status": "paid",
            "customer": "cus_123",
            "subscription": "sub_456",
            "created": 1700000000
        }))
        .unwrap();
        assert_eq!(session.customer_ref(), Some("cus_123"));
        assert_eq!(session.subscription_ref(), Some("sub_456"));
        assert_eq!(session.customer_email(), None);
    }

    #[test]
    fn test_expandable_deserializes_expanded_object() {
        let session: CheckoutSession = serde_json::from_value(serde_json::json!({
            "id": "cs_test_1",
            "payment_status": "paid",
            "customer": { "id": "cus_123", "email": "payer@example.com" },
            "customer_details": { "email": "details@example.com" },
            "subscription": { "id": "sub_456", "status": "trialing", "canceled_at": null },
            "metadata": { "userId": "u1", "planName": "Premium" },
            "created": 1700000000
        }))
        .unwrap();
        assert_eq!(session.customer_ref(), Some("cus_123"));
        assert_eq!(session.customer_email(), Some("payer@example.com"));
        assert_eq!(session.subscription_ref(), Some("sub_456"));
        assert_eq!(session.metadata.get("planName").unwrap(), "Premium");
    }

    #[test]
    fn test_customer_email_falls_back_to_details() {
        let session: CheckoutSession = serde_json::from_value(serde_json::json!({
            "id": "cs_test_1",
            "payment_status": "paid",
            "customer": "cus_123",
            "customer_details": { "email": "details@example.com" },
            "created": 1700000000
        }))
        .unwrap();
        assert_eq!(session.customer_email(), Some("details@example.com"));
    }

    #[test]
    fn test_resource_missing_detection() {
        let err = StripeError::Api {
            status: 404,
            message: "No such subscription".to_string(),
        };
        assert!(err.is_resource_missing());
        let err = StripeError::Api {
            status: 402,
            message: "card declined".to_string(),
        };
        assert!(!err.is_resource_missing());
    }
}
