//! Axum route handlers for user profiles and subscription management.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::billing::{ledger, reconciler};
use crate::errors::AppError;
use crate::routes::success;
use crate::state::AppState;
use crate::store::{NewUser, UserStore};

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub email: String,
    #[serde(rename = "displayName")]
    pub display_name: Option<String>,
}

/// POST /api/users/create
pub async fn handle_create_user(
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    if request.user_id.trim().is_empty() {
        return Err(AppError::Validation("userId is required".to_string()));
    }
    if !is_valid_email(&request.email) {
        return Err(AppError::Validation(
            "Valid email address is required".to_string(),
        ));
    }

    let user = state
        .users
        .create_user(NewUser {
            external_auth_id: request.user_id,
            email: request.email,
            display_name: request.display_name,
        })
        .await?;

    let body = success(user.into_profile());
    Ok((StatusCode::CREATED, body))
}

/// GET /api/users/profile/:auth_id
pub async fn handle_profile(
    State(state): State<AppState>,
    Path(auth_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let user = state
        .users
        .find_by_auth_id(&auth_id)
        .await?
        .ok_or(AppError::UserNotFound)?;
    Ok(success(user.into_profile()))
}

/// POST /api/users/:auth_id/increment-usage
pub async fn handle_increment_usage(
    State(state): State<AppState>,
    Path(auth_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let stats = ledger::increment_usage(state.users.as_ref(), &auth_id).await?;
    Ok(success(stats))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSubscriptionRequest {
    pub tier: String,
    #[serde(rename = "customerId")]
    pub customer_ref: Option<String>,
    #[serde(rename = "subscriptionId")]
    pub subscription_ref: Option<String>,
}

/// POST /api/users/:auth_id/update-subscription
///
/// Direct tier write: the tier name is user input and is validated
/// strictly — an unknown tier is a 400 with nothing mutated.
pub async fn handle_update_subscription(
    State(state): State<AppState>,
    Path(auth_id): Path<String>,
    Json(request): Json<UpdateSubscriptionRequest>,
) -> Result<Json<Value>, AppError> {
    let user = reconciler::update_subscription(
        state.users.as_ref(),
        &auth_id,
        &request.tier,
        request.customer_ref,
        request.subscription_ref,
    )
    .await?;
    Ok(success(json!({ "user": user.into_profile() })))
}

/// POST /api/users/:auth_id/cancel-subscription
///
/// Local cancellation: requires an existing provider reference, then
/// downgrades to freemium and clears both references.
pub async fn handle_cancel_subscription(
    State(state): State<AppState>,
    Path(auth_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let user = state
        .users
        .find_by_auth_id(&auth_id)
        .await?
        .ok_or(AppError::UserNotFound)?;

    if user.payment_customer_ref.is_none() && user.payment_subscription_ref.is_none() {
        return Err(AppError::Validation(
            "No active subscription found to cancel".to_string(),
        ));
    }

    let user = reconciler::downgrade_to_freemium(state.users.as_ref(), &auth_id).await?;
    Ok(success(json!({
        "message": "Subscription cancelled successfully",
        "user": user.into_profile(),
    })))
}

/// GET /api/users/:auth_id/subscription-status
pub async fn handle_subscription_status(
    State(state): State<AppState>,
    Path(auth_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let user = state
        .users
        .find_by_auth_id(&auth_id)
        .await?
        .ok_or(AppError::UserNotFound)?;

    let has_active_subscription =
        user.subscription_status == "active" && user.tier != "FREEMIUM";
    let remaining_generations = user.remaining_generations();
    let can_generate = user.can_generate();

    Ok(success(json!({
        "tier": user.tier,
        "status": user.subscription_status,
        "hasActiveSubscription": has_active_subscription,
        "generationsUsed": user.usage_used,
        "generationsLimit": user.usage_limit,
        "remainingGenerations": remaining_generations,
        "canGenerate": can_generate,
        "paymentCustomerRef": user.payment_customer_ref,
        "paymentSubscriptionRef": user.payment_subscription_ref,
        "subscriptionStartedAt": user.subscription_started_at,
    })))
}

/// POST /api/users/:auth_id/reset-usage
///
/// Manual reset. There is no automatic monthly trigger; operators call
/// this explicitly.
pub async fn handle_reset_usage(
    State(state): State<AppState>,
    Path(auth_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let stats = ledger::reset_usage(state.users.as_ref(), &auth_id).await?;
    Ok(success(json!({
        "message": "Usage count reset successfully",
        "generationsUsed": stats.generations_used,
        "generationsLimit": stats.generations_limit,
    })))
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.contains(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("a.b+c@sub.domain.io"));
        assert!(!is_valid_email("missing-at.example.com"));
        assert!(!is_valid_email("user@nodot"));
        assert!(!is_valid_email("user@.com"));
        assert!(!is_valid_email("user name@example.com"));
        assert!(!is_valid_email("@example.com"));
    }
}
