//! Axum route handlers for checkout and the provider webhook.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::billing::checkout::{self, CancelRequest, CheckoutRequest};
use crate::billing::reconciler;
use crate::errors::AppError;
use crate::routes::success;
use crate::state::AppState;
use crate::stripe::webhook;

/// POST /api/create-checkout-session
pub async fn handle_create_checkout_session(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if request.price_id.trim().is_empty() {
        return Err(AppError::Validation("priceId is required".to_string()));
    }

    let session =
        checkout::create_checkout_session(&state.stripe, &state.config.frontend_url, request)
            .await?;
    Ok((StatusCode::CREATED, success(session)))
}

/// GET /api/checkout-session/:session_id
pub async fn handle_get_checkout_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let session = state.stripe.retrieve_checkout_session(&session_id).await?;
    Ok(success(session))
}

#[derive(Debug, Deserialize)]
pub struct VerifySessionRequest {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

/// POST /api/verify-session
///
/// The synchronous reconciliation trigger: the frontend polls this after
/// checkout redirects back. Safe to race with the webhook — both apply the
/// same overwrite.
pub async fn handle_verify_session(
    State(state): State<AppState>,
    Json(request): Json<VerifySessionRequest>,
) -> Result<Json<Value>, AppError> {
    if request.session_id.trim().is_empty() {
        return Err(AppError::Validation("Session ID is required".to_string()));
    }

    let verified =
        checkout::verify_session(&state.stripe, state.users.as_ref(), &request.session_id)
            .await?;
    Ok(success(verified))
}

/// POST /api/cancel-subscription
pub async fn handle_cancel_subscription(
    State(state): State<AppState>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<Value>, AppError> {
    let outcome =
        checkout::cancel_subscription(&state.stripe, state.users.as_ref(), request).await?;
    Ok(success(outcome))
}

/// POST /api/stripe-webhook
///
/// The asynchronous reconciliation trigger. Signature verification runs
/// against the raw body before the payload is interpreted; a bad
/// signature rejects the whole delivery with no partial processing.
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, AppError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::InvalidSignature)?;

    let event = webhook::construct_event(
        &body,
        signature,
        &state.config.stripe_webhook_secret,
        Utc::now().timestamp(),
    )?;

    reconciler::apply_event(state.users.as_ref(), event).await?;

    Ok(Json(json!({ "received": true })))
}
