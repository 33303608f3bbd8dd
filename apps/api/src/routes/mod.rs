pub mod ai;
pub mod billing;
pub mod documents;
pub mod health;
pub mod users;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::state::AppState;

/// Standard success envelope: `{"success": true, "data": ...}`.
pub fn success<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // User API
        .route("/api/users/create", post(users::handle_create_user))
        .route("/api/users/profile/:auth_id", get(users::handle_profile))
        .route(
            "/api/users/:auth_id/increment-usage",
            post(users::handle_increment_usage),
        )
        .route(
            "/api/users/:auth_id/update-subscription",
            post(users::handle_update_subscription),
        )
        .route(
            "/api/users/:auth_id/cancel-subscription",
            post(users::handle_cancel_subscription),
        )
        .route(
            "/api/users/:auth_id/subscription-status",
            get(users::handle_subscription_status),
        )
        .route(
            "/api/users/:auth_id/reset-usage",
            post(users::handle_reset_usage),
        )
        // Document API
        .route("/api/documents/save", post(documents::handle_save))
        .route(
            "/api/documents/recent/:id",
            get(documents::handle_list_recent).delete(documents::handle_delete_recent),
        )
        .route(
            "/api/documents/favorites/:id",
            get(documents::handle_list_favorites).delete(documents::handle_unfavorite),
        )
        .route(
            "/api/documents/:document_id",
            get(documents::handle_get_document),
        )
        .route(
            "/api/documents/:document_id/favorite",
            post(documents::handle_favorite),
        )
        // Billing API
        .route(
            "/api/create-checkout-session",
            post(billing::handle_create_checkout_session),
        )
        .route(
            "/api/checkout-session/:session_id",
            get(billing::handle_get_checkout_session),
        )
        .route("/api/verify-session", post(billing::handle_verify_session))
        .route(
            "/api/cancel-subscription",
            post(billing::handle_cancel_subscription),
        )
        .route("/api/stripe-webhook", post(billing::handle_webhook))
        // AI API
        .route("/api/create-resume", post(ai::handle_create_resume))
        .route(
            "/api/create-cover-letter",
            post(ai::handle_create_cover_letter),
        )
        .route("/api/refine-document", post(ai::handle_refine_document))
        .route(
            "/api/generate-questions",
            post(ai::handle_generate_questions),
        )
        .route(
            "/api/company-insights",
            post(ai::handle_company_insights),
        )
        .with_state(state)
}
