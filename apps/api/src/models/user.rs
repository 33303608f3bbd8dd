use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::billing::catalog::{Tier, TierInfo, UNLIMITED};

/// One row per end-user. `tier` and `subscription_status` are stored as
/// text; the closed-enum views live in `billing::catalog` and
/// `SubscriptionStatus`, with lenient fallbacks on read paths only.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub external_auth_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub tier: String,
    pub usage_used: i32,
    pub usage_limit: i32,
    pub subscription_status: String,
    pub payment_customer_ref: Option<String>,
    pub payment_subscription_ref: Option<String>,
    pub subscription_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserRow {
    /// Tier view for display; unrecognized stored values render as FREEMIUM.
    pub fn tier(&self) -> Tier {
        Tier::parse_or_freemium(&self.tier)
    }

    /// True iff the user may perform another billable generation.
    pub fn can_generate(&self) -> bool {
        self.usage_limit == UNLIMITED || self.usage_used < self.usage_limit
    }

    pub fn remaining_generations(&self) -> RemainingGenerations {
        if self.usage_limit == UNLIMITED {
            RemainingGenerations::Unlimited
        } else {
            RemainingGenerations::Count((self.usage_limit - self.usage_used).max(0))
        }
    }

    /// Profile view with the computed fields the frontend renders.
    pub fn into_profile(self) -> UserProfile {
        let can_generate = self.can_generate();
        let remaining_generations = self.remaining_generations();
        let tier_info = TierInfo::from(self.tier());
        UserProfile {
            user: self,
            can_generate,
            remaining_generations,
            tier_info,
        }
    }
}

/// Remaining quota: a count, or the literal string "Unlimited" for the
/// sentinel (the shape the frontend already renders).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemainingGenerations {
    Count(i32),
    Unlimited,
}

impl Serialize for RemainingGenerations {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RemainingGenerations::Count(n) => serializer.serialize_i32(*n),
            RemainingGenerations::Unlimited => serializer.serialize_str("Unlimited"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    PastDue,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

/// User row plus computed properties, as returned by profile endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct UserProfile {
    #[serde(flatten)]
    pub user: UserRow,
    #[serde(rename = "canGenerate")]
    pub can_generate: bool,
    #[serde(rename = "remainingGenerations")]
    pub remaining_generations: RemainingGenerations,
    #[serde(rename = "tierInfo")]
    pub tier_info: TierInfo,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(used: i32, limit: i32) -> UserRow {
        let now = Utc::now();
        UserRow {
            id: Uuid::new_v4(),
            external_auth_id: "auth-1".to_string(),
            email: "user@example.com".to_string(),
            display_name: None,
            tier: "FREEMIUM".to_string(),
            usage_used: used,
            usage_limit: limit,
            subscription_status: "active".to_string(),
            payment_customer_ref: None,
            payment_subscription_ref: None,
            subscription_started_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_can_generate_under_limit() {
        assert!(user(1, 2).can_generate());
        assert!(!user(2, 2).can_generate());
    }

    #[test]
    fn test_unlimited_sentinel_always_generates() {
        assert!(user(1_000_000, UNLIMITED).can_generate());
    }

    #[test]
    fn test_remaining_generations_never_negative() {
        assert_eq!(user(5, 2).remaining_generations(), RemainingGenerations::Count(0));
    }

    #[test]
    fn test_remaining_generations_unlimited_serializes_as_string() {
        let json = serde_json::to_value(RemainingGenerations::Unlimited).unwrap();
        assert_eq!(json, serde_json::json!("Unlimited"));
        let json = serde_json::to_value(RemainingGenerations::Count(3)).unwrap();
        assert_eq!(json, serde_json::json!(3));
    }
}
