use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::billing::catalog::Tier;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
///
/// Business-rule rejections (quota, ownership, invalid tier) are expected
/// conditions and carry structured detail for the caller; store and upstream
/// failures are logged here and surfaced as generic messages.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("User not found")]
    UserNotFound,

    #[error("Document not found")]
    DocumentNotFound,

    #[error("Access denied: document belongs to a different user")]
    AccessDenied,

    #[error("Generation limit exceeded")]
    QuotaExceeded { current_tier: Tier },

    #[error("Invalid tier: {0}")]
    InvalidTier(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Cannot provision user without an email address")]
    CannotProvisionUser,

    #[error("User already exists")]
    DuplicateUser,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payment provider error (status {status}): {message}")]
    PaymentProvider { status: u16, message: String },

    #[error("AI provider error: {0}")]
    Ai(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, mut body) = match &self {
            AppError::UserNotFound => (
                StatusCode::NOT_FOUND,
                json!({
                    "message": "User not found. Please create an account first.",
                    "needsRegistration": true,
                }),
            ),
            AppError::DocumentNotFound => (
                StatusCode::NOT_FOUND,
                json!({ "message": "Document not found" }),
            ),
            AppError::AccessDenied => (
                StatusCode::FORBIDDEN,
                json!({ "message": "You don't have permission to access this document" }),
            ),
            AppError::QuotaExceeded { current_tier } => (
                StatusCode::FORBIDDEN,
                json!({
                    "message": "Generation limit exceeded. Please upgrade your plan.",
                    "needsUpgrade": true,
                    "currentTier": current_tier,
                }),
            ),
            AppError::InvalidTier(tier) => (
                StatusCode::BAD_REQUEST,
                json!({ "message": format!("Invalid tier specified: {tier}") }),
            ),
            AppError::InvalidSignature => (
                StatusCode::BAD_REQUEST,
                json!({ "message": "Webhook signature verification failed" }),
            ),
            AppError::CannotProvisionUser => (
                StatusCode::BAD_REQUEST,
                json!({ "message": "Cannot create user without email address" }),
            ),
            AppError::DuplicateUser => (
                StatusCode::CONFLICT,
                json!({ "message": "User already exists" }),
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, json!({ "message": msg })),
            AppError::PaymentProvider { status, message } => {
                tracing::error!("Payment provider error (status {status}): {message}");
                (
                    StatusCode::BAD_GATEWAY,
                    json!({ "message": "Payment provider request failed" }),
                )
            }
            AppError::Ai(msg) => {
                tracing::error!("AI provider error: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": "An AI processing error occurred" }),
                )
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": "A database error occurred" }),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "message": "An internal server error occurred" }),
                )
            }
        };

        body["status"] = json!(status.as_u16());
        let envelope = Json(json!({
            "success": false,
            "error": body,
        }));

        (status, envelope).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quota_exceeded_is_forbidden() {
        let response = AppError::QuotaExceeded {
            current_tier: Tier::Freemium,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_user_not_found_is_404() {
        let response = AppError::UserNotFound.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_duplicate_user_is_conflict() {
        let response = AppError::DuplicateUser.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
