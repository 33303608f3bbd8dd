//! Subscription reconciler — brings local tier state into agreement with
//! the payment provider's latest reported state.
//!
//! Both the synchronous verify-checkout path and the asynchronous webhook
//! path funnel into `reconcile_subscription`. The write is a full
//! overwrite, never a merge or an increment, so double delivery (webhook
//! racing the verify call) converges on the same end state. Accumulated
//! usage is deliberately never reset here: an upgrade raises the ceiling,
//! not the counter.

use tracing::{debug, info, warn};

use crate::billing::catalog::Tier;
use crate::errors::AppError;
use crate::models::user::{SubscriptionStatus, UserRow};
use crate::store::{NewUser, SubscriptionChange, UserStore};

/// Latest provider-reported state for one user's subscription.
#[derive(Debug, Clone)]
pub struct ReconcileInput {
    pub user_id: String,
    pub plan_name: String,
    pub subscription_ref: Option<String>,
    pub customer_ref: Option<String>,
    /// Provider-side customer email, used to provision a record for a user
    /// who paid before registering.
    pub customer_email: Option<String>,
}

/// Provider-neutral view of a billing lifecycle event, decoded from the
/// signed webhook payload.
#[derive(Debug, Clone)]
pub enum BillingEvent {
    CheckoutCompleted(ReconcileInput),
    InvoicePaid { customer_ref: String },
    SubscriptionDeleted { customer_ref: String },
    InvoicePaymentFailed { customer_ref: String },
    Unhandled { kind: String },
}

/// Applies the provider's reported subscription state to the local record,
/// creating the record if the user paid before any local account existed.
pub async fn reconcile_subscription(
    store: &dyn UserStore,
    input: ReconcileInput,
) -> Result<UserRow, AppError> {
    let tier = Tier::from_plan_name(&input.plan_name);
    let change = SubscriptionChange {
        tier,
        payment_customer_ref: input.customer_ref,
        payment_subscription_ref: input.subscription_ref,
    };

    match store.find_by_auth_id(&input.user_id).await? {
        Some(_) => {
            info!(
                "Reconciling subscription for {}: plan '{}' -> {}",
                input.user_id,
                input.plan_name,
                tier.as_str()
            );
            store.apply_subscription(&input.user_id, &change).await
        }
        None => {
            let email = input.customer_email.ok_or(AppError::CannotProvisionUser)?;
            info!(
                "No local record for paying user {}; provisioning on {}",
                input.user_id,
                tier.as_str()
            );
            store
                .provision_subscriber(
                    NewUser {
                        external_auth_id: input.user_id,
                        email,
                        display_name: None,
                    },
                    &change,
                )
                .await
        }
    }
}

/// Direct tier write from user input. Unlike the provider-metadata path,
/// an unrecognized tier name is rejected outright — nothing is mutated.
pub async fn update_subscription(
    store: &dyn UserStore,
    auth_id: &str,
    tier_name: &str,
    customer_ref: Option<String>,
    subscription_ref: Option<String>,
) -> Result<UserRow, AppError> {
    let tier =
        Tier::parse_strict(tier_name).ok_or_else(|| AppError::InvalidTier(tier_name.to_string()))?;

    store
        .apply_subscription(
            auth_id,
            &SubscriptionChange {
                tier,
                payment_customer_ref: customer_ref,
                payment_subscription_ref: subscription_ref,
            },
        )
        .await
}

/// Cancels locally: FREEMIUM tier and quota, cancelled status, provider
/// refs cleared.
pub async fn downgrade_to_freemium(
    store: &dyn UserStore,
    auth_id: &str,
) -> Result<UserRow, AppError> {
    store.downgrade_to_freemium(auth_id).await
}

/// Applies one decoded webhook event. Events keyed by customer reference
/// are no-ops when no local user maps to the reference — logged and
/// skipped, never a batch failure.
pub async fn apply_event(store: &dyn UserStore, event: BillingEvent) -> Result<(), AppError> {
    match event {
        BillingEvent::CheckoutCompleted(input) => {
            reconcile_subscription(store, input).await?;
        }
        BillingEvent::InvoicePaid { customer_ref } => {
            match store.find_by_customer_ref(&customer_ref).await? {
                Some(user) => {
                    // Recurring renewal: clear any prior past_due mark.
                    store
                        .set_subscription_status(
                            &user.external_auth_id,
                            SubscriptionStatus::Active,
                        )
                        .await?;
                    info!("Renewal recorded for user {}", user.external_auth_id);
                }
                None => warn!("No user found for customer ref {customer_ref}"),
            }
        }
        BillingEvent::SubscriptionDeleted { customer_ref } => {
            match store.find_by_customer_ref(&customer_ref).await? {
                Some(user) => {
                    store.downgrade_to_freemium(&user.external_auth_id).await?;
                }
                None => warn!("No user found for customer ref {customer_ref}"),
            }
        }
        BillingEvent::InvoicePaymentFailed { customer_ref } => {
            match store.find_by_customer_ref(&customer_ref).await? {
                Some(user) => {
                    store
                        .set_subscription_status(
                            &user.external_auth_id,
                            SubscriptionStatus::PastDue,
                        )
                        .await?;
                    warn!("Marked user {} as past due", user.external_auth_id);
                }
                None => warn!("No user found for customer ref {customer_ref}"),
            }
        }
        BillingEvent::Unhandled { kind } => debug!("Unhandled webhook event type: {kind}"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, NewUser};

    fn premium_input(user_id: &str) -> ReconcileInput {
        ReconcileInput {
            user_id: user_id.to_string(),
            plan_name: "Premium".to_string(),
            subscription_ref: Some("sub_123".to_string()),
            customer_ref: Some("cus_123".to_string()),
            customer_email: Some("payer@example.com".to_string()),
        }
    }

    async fn registered_user(store: &MemoryStore, auth_id: &str) {
        store
            .create_user(NewUser {
                external_auth_id: auth_id.to_string(),
                email: format!("{auth_id}@example.com"),
                display_name: None,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reconciliation_is_idempotent() {
        let store = MemoryStore::new();
        registered_user(&store, "u1").await;

        let once = reconcile_subscription(&store, premium_input("u1"))
            .await
            .unwrap();
        let twice = reconcile_subscription(&store, premium_input("u1"))
            .await
            .unwrap();

        assert_eq!(once.tier, twice.tier);
        assert_eq!(once.usage_limit, twice.usage_limit);
        assert_eq!(once.usage_used, twice.usage_used);
        assert_eq!(once.payment_customer_ref, twice.payment_customer_ref);
        assert_eq!(
            once.payment_subscription_ref,
            twice.payment_subscription_ref
        );
        assert_eq!(twice.tier, "PREMIUM");
        assert_eq!(twice.usage_limit, 10);
        assert_eq!(twice.subscription_status, "active");
    }

    #[tokio::test]
    async fn test_reconciliation_preserves_accumulated_usage() {
        let store = MemoryStore::new();
        registered_user(&store, "u1").await;
        store
            .apply_subscription(
                "u1",
                &crate::store::SubscriptionChange {
                    tier: Tier::Basic,
                    payment_customer_ref: Some("cus_123".to_string()),
                    payment_subscription_ref: Some("sub_old".to_string()),
                },
            )
            .await
            .unwrap();
        for _ in 0..4 {
            store.increment_usage("u1").await.unwrap();
        }

        let user = reconcile_subscription(&store, premium_input("u1"))
            .await
            .unwrap();
        assert_eq!(user.usage_used, 4);
        assert_eq!(user.usage_limit, 10);
    }

    #[tokio::test]
    async fn test_reconciliation_provisions_unknown_payer_with_email() {
        let store = MemoryStore::new();
        let user = reconcile_subscription(&store, premium_input("fresh"))
            .await
            .unwrap();
        assert_eq!(user.email, "payer@example.com");
        assert_eq!(user.tier, "PREMIUM");
        assert_eq!(user.usage_used, 0);
    }

    #[tokio::test]
    async fn test_reconciliation_without_email_fails_for_unknown_payer() {
        let store = MemoryStore::new();
        let mut input = premium_input("fresh");
        input.customer_email = None;
        match reconcile_subscription(&store, input).await {
            Err(AppError::CannotProvisionUser) => {}
            other => panic!("expected CannotProvisionUser, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unrecognized_plan_name_maps_to_basic() {
        let store = MemoryStore::new();
        registered_user(&store, "u1").await;
        let mut input = premium_input("u1");
        input.plan_name = "Enterprise".to_string();
        let user = reconcile_subscription(&store, input).await.unwrap();
        assert_eq!(user.tier, "BASIC");
        assert_eq!(user.usage_limit, 5);
    }

    #[tokio::test]
    async fn test_direct_tier_write_rejects_unknown_tier() {
        let store = MemoryStore::new();
        registered_user(&store, "u1").await;

        match update_subscription(&store, "u1", "GOLD", None, None).await {
            Err(AppError::InvalidTier(name)) => assert_eq!(name, "GOLD"),
            other => panic!("expected InvalidTier, got {other:?}"),
        }

        // Nothing mutated.
        let user = store.find_by_auth_id("u1").await.unwrap().unwrap();
        assert_eq!(user.tier, "FREEMIUM");
        assert_eq!(user.usage_limit, 2);
        assert!(user.payment_customer_ref.is_none());
    }

    #[tokio::test]
    async fn test_downgrade_clears_provider_refs() {
        let store = MemoryStore::new();
        registered_user(&store, "u1").await;
        reconcile_subscription(&store, premium_input("u1"))
            .await
            .unwrap();

        let user = downgrade_to_freemium(&store, "u1").await.unwrap();
        assert_eq!(user.tier, "FREEMIUM");
        assert_eq!(user.usage_limit, 2);
        assert_eq!(user.subscription_status, "cancelled");
        assert!(user.payment_customer_ref.is_none());
        assert!(user.payment_subscription_ref.is_none());
    }

    #[tokio::test]
    async fn test_events_for_unknown_customer_are_noops() {
        let store = MemoryStore::new();
        apply_event(
            &store,
            BillingEvent::InvoicePaid {
                customer_ref: "cus_ghost".to_string(),
            },
        )
        .await
        .unwrap();
        apply_event(
            &store,
            BillingEvent::SubscriptionDeleted {
                customer_ref: "cus_ghost".to_string(),
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_payment_failed_marks_past_due_without_tier_change() {
        let store = MemoryStore::new();
        registered_user(&store, "u1").await;
        reconcile_subscription(&store, premium_input("u1"))
            .await
            .unwrap();

        apply_event(
            &store,
            BillingEvent::InvoicePaymentFailed {
                customer_ref: "cus_123".to_string(),
            },
        )
        .await
        .unwrap();

        let user = store.find_by_auth_id("u1").await.unwrap().unwrap();
        assert_eq!(user.subscription_status, "past_due");
        assert_eq!(user.tier, "PREMIUM");
        assert_eq!(user.usage_limit, 10);

        // A later successful renewal flips it back.
        apply_event(
            &store,
            BillingEvent::InvoicePaid {
                customer_ref: "cus_123".to_string(),
            },
        )
        .await
        .unwrap();
        let user = store.find_by_auth_id("u1").await.unwrap().unwrap();
        assert_eq!(user.subscription_status, "active");
    }
}
