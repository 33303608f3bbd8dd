//! Usage ledger — per-user generation counters with compare-and-increment
//! semantics and the unlimited sentinel.
//!
//! The guard lives in the store (one conditional update per increment);
//! this module turns a guard miss into the structured quota error the
//! caller needs to render an upgrade prompt.

use serde::Serialize;
use tracing::info;

use crate::billing::catalog::UNLIMITED;
use crate::errors::AppError;
use crate::models::user::RemainingGenerations;
use crate::store::{UsageIncrement, UserStore};

/// Counters after an increment or reset, shaped for the usage endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct UsageStats {
    #[serde(rename = "generationsUsed")]
    pub generations_used: i32,
    #[serde(rename = "generationsLimit")]
    pub generations_limit: i32,
    #[serde(rename = "remainingGenerations")]
    pub remaining_generations: RemainingGenerations,
}

impl UsageStats {
    fn from_counters(used: i32, limit: i32) -> Self {
        let remaining_generations = if limit == UNLIMITED {
            RemainingGenerations::Unlimited
        } else {
            RemainingGenerations::Count((limit - used).max(0))
        };
        UsageStats {
            generations_used: used,
            generations_limit: limit,
            remaining_generations,
        }
    }
}

/// True iff another billable generation is allowed under these counters.
pub fn can_generate(used: i32, limit: i32) -> bool {
    limit == UNLIMITED || used < limit
}

/// Consumes one generation. Fails with `QuotaExceeded` (carrying the
/// current tier) when the guard misses, with no mutation.
pub async fn increment_usage(
    store: &dyn UserStore,
    auth_id: &str,
) -> Result<UsageStats, AppError> {
    match store.increment_usage(auth_id).await? {
        UsageIncrement::Granted { used, limit } => {
            info!("Usage incremented for {auth_id}: {used}/{limit}");
            Ok(UsageStats::from_counters(used, limit))
        }
        UsageIncrement::Denied { current_tier } => Err(AppError::QuotaExceeded { current_tier }),
    }
}

/// Unconditional reset to zero. Manual operation only — there is no
/// automatic monthly trigger.
pub async fn reset_usage(store: &dyn UserStore, auth_id: &str) -> Result<UsageStats, AppError> {
    let counters = store.reset_usage(auth_id).await?;
    info!("Usage reset for {auth_id}");
    Ok(UsageStats::from_counters(counters.used, counters.limit))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::catalog::Tier;
    use crate::store::{MemoryStore, NewUser, SubscriptionChange};

    async fn freemium_user(store: &MemoryStore, auth_id: &str) {
        store
            .create_user(NewUser {
                external_auth_id: auth_id.to_string(),
                email: format!("{auth_id}@example.com"),
                display_name: None,
            })
            .await
            .unwrap();
    }

    #[test]
    fn test_can_generate_guard() {
        assert!(can_generate(0, 2));
        assert!(can_generate(1, 2));
        assert!(!can_generate(2, 2));
        assert!(can_generate(i32::MAX, UNLIMITED));
    }

    #[tokio::test]
    async fn test_quota_monotonicity_on_freemium() {
        let store = MemoryStore::new();
        freemium_user(&store, "u1").await;

        let first = increment_usage(&store, "u1").await.unwrap();
        assert_eq!(first.generations_used, 1);
        let second = increment_usage(&store, "u1").await.unwrap();
        assert_eq!(second.generations_used, 2);

        let third = increment_usage(&store, "u1").await;
        match third {
            Err(AppError::QuotaExceeded { current_tier }) => {
                assert_eq!(current_tier, Tier::Freemium)
            }
            other => panic!("expected QuotaExceeded, got {other:?}"),
        }

        // The failed attempt mutated nothing.
        let user = store.find_by_auth_id("u1").await.unwrap().unwrap();
        assert_eq!(user.usage_used, 2);
    }

    #[tokio::test]
    async fn test_unlimited_sentinel_never_exhausts() {
        let store = MemoryStore::new();
        freemium_user(&store, "u1").await;
        store
            .apply_subscription(
                "u1",
                &SubscriptionChange {
                    tier: Tier::PremiumPlus,
                    payment_customer_ref: Some("cus_1".to_string()),
                    payment_subscription_ref: Some("sub_1".to_string()),
                },
            )
            .await
            .unwrap();

        for _ in 0..50 {
            increment_usage(&store, "u1").await.unwrap();
        }
        let user = store.find_by_auth_id("u1").await.unwrap().unwrap();
        assert_eq!(user.usage_used, 50);
        assert!(user.can_generate());
    }

    #[tokio::test]
    async fn test_increment_unknown_user_is_not_found() {
        let store = MemoryStore::new();
        match increment_usage(&store, "nobody").await {
            Err(AppError::UserNotFound) => {}
            other => panic!("expected UserNotFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_reset_restores_full_quota() {
        let store = MemoryStore::new();
        freemium_user(&store, "u1").await;
        increment_usage(&store, "u1").await.unwrap();
        increment_usage(&store, "u1").await.unwrap();

        let stats = reset_usage(&store, "u1").await.unwrap();
        assert_eq!(stats.generations_used, 0);
        assert_eq!(
            stats.remaining_generations,
            RemainingGenerations::Count(2)
        );
        increment_usage(&store, "u1").await.unwrap();
    }
}
