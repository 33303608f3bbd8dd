//! Checkout orchestration — the synchronous half of the dual-trigger
//! design. Verifying a just-completed session funnels into the same
//! reconciliation as the webhook, so whichever fires first (or twice)
//! lands on the same state.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::billing::reconciler::{self, ReconcileInput};
use crate::errors::AppError;
use crate::store::UserStore;
use crate::stripe::{CreateCheckoutSession, StripeClient, Subscription};

/// Caller-facing request for starting a checkout.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    #[serde(rename = "priceId")]
    pub price_id: String,
    #[serde(rename = "planName")]
    pub plan_name: String,
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "userEmail")]
    pub user_email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct NewCheckout {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    pub url: Option<String>,
}

/// Creates a subscription checkout session pointing back at the frontend's
/// success and pricing pages.
pub async fn create_checkout_session(
    stripe: &StripeClient,
    frontend_url: &str,
    request: CheckoutRequest,
) -> Result<NewCheckout, AppError> {
    info!(
        "Creating checkout session for {} - plan: {}",
        request.user_email, request.plan_name
    );

    let session = stripe
        .create_checkout_session(&CreateCheckoutSession {
            price_id: request.price_id,
            plan_name: request.plan_name,
            user_id: request.user_id,
            user_email: request.user_email,
            success_url: format!("{frontend_url}/success?session_id={{CHECKOUT_SESSION_ID}}"),
            cancel_url: format!("{frontend_url}/pricing"),
        })
        .await?;

    info!("Checkout session created: {}", session.id);
    Ok(NewCheckout {
        session_id: session.id,
        url: session.url,
    })
}

/// Session details after a successful verification.
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedSession {
    pub id: String,
    #[serde(rename = "planName")]
    pub plan_name: String,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub status: Option<String>,
    pub payment_status: String,
    pub customer_email: Option<String>,
    pub customer_id: Option<String>,
    #[serde(rename = "userId")]
    pub user_id: String,
    pub created: i64,
    pub subscription_id: Option<String>,
}

/// Retrieves a completed checkout session, checks it is paid, and applies
/// the resulting tier change through the reconciler.
pub async fn verify_session(
    stripe: &StripeClient,
    store: &dyn UserStore,
    session_id: &str,
) -> Result<VerifiedSession, AppError> {
    let session = stripe.retrieve_checkout_session(session_id).await?;

    if session.payment_status != "paid" {
        return Err(AppError::Validation("Payment not completed".to_string()));
    }

    let user_id = session
        .metadata
        .get("userId")
        .cloned()
        .ok_or_else(|| AppError::Validation("No user ID found in session".to_string()))?;
    let plan_name = session
        .metadata
        .get("planName")
        .cloned()
        .unwrap_or_else(|| "Premium".to_string());

    reconciler::reconcile_subscription(
        store,
        ReconcileInput {
            user_id: user_id.clone(),
            plan_name: plan_name.clone(),
            subscription_ref: session.subscription_ref().map(str::to_string),
            customer_ref: session.customer_ref().map(str::to_string),
            customer_email: session.customer_email().map(str::to_string),
        },
    )
    .await?;

    info!("Session verified and tier updated: {session_id} (plan: {plan_name})");

    Ok(VerifiedSession {
        customer_email: session.customer_email().map(str::to_string),
        customer_id: session.customer_ref().map(str::to_string),
        subscription_id: session.subscription_ref().map(str::to_string),
        id: session.id,
        plan_name,
        amount_total: session.amount_total,
        currency: session.currency,
        status: session.status,
        payment_status: session.payment_status,
        user_id,
        created: session.created,
    })
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelRequest {
    #[serde(rename = "userId")]
    pub user_id: Option<String>,
    #[serde(rename = "customerId")]
    pub customer_ref: Option<String>,
    #[serde(rename = "subscriptionId")]
    pub subscription_ref: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelOutcome {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<Subscription>,
}

/// Cancels upstream, then downgrades locally. A subscription that is
/// already gone upstream is treated as success — the local downgrade still
/// happens, so the user is never left on a paid tier with no subscription.
pub async fn cancel_subscription(
    stripe: &StripeClient,
    store: &dyn UserStore,
    request: CancelRequest,
) -> Result<CancelOutcome, AppError> {
    let subscription_ref = match (&request.subscription_ref, &request.customer_ref) {
        (Some(subscription_ref), _) => Some(subscription_ref.clone()),
        (None, Some(customer_ref)) => {
            let active = stripe.list_active_subscriptions(customer_ref).await?;
            active.into_iter().next().map(|s| s.id)
        }
        (None, None) => {
            return Err(AppError::Validation(
                "Either customerId or subscriptionId is required".to_string(),
            ));
        }
    };

    let cancelled = match subscription_ref {
        Some(subscription_ref) => match stripe.cancel_subscription(&subscription_ref).await {
            Ok(subscription) => {
                info!("Cancelled subscription {subscription_ref}");
                Some(subscription)
            }
            Err(e) if e.is_resource_missing() && request.user_id.is_some() => {
                warn!("Subscription {subscription_ref} already gone upstream; downgrading locally");
                None
            }
            Err(e) => return Err(e.into()),
        },
        None if request.user_id.is_some() => {
            warn!("No active subscription upstream; downgrading locally");
            None
        }
        None => {
            return Err(AppError::Validation(
                "No active subscription found to cancel".to_string(),
            ));
        }
    };

    if let Some(user_id) = &request.user_id {
        reconciler::downgrade_to_freemium(store, user_id).await?;
    }

    let message = if cancelled.is_some() {
        "Subscription cancelled successfully".to_string()
    } else {
        "User downgraded to freemium (subscription was already cancelled)".to_string()
    };

    Ok(CancelOutcome {
        message,
        subscription: cancelled,
    })
}
