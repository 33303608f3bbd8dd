//! Tier catalog — the fixed mapping of subscription tier to monthly quota
//! and price. Not user-configurable.
//!
//! Two lookup policies coexist and both matter:
//! - read/display paths fall back to FREEMIUM for an unrecognized tier;
//! - write paths (direct tier changes) must reject unrecognized tiers
//!   outright, so a typo can never silently grant a default plan.

use serde::{Deserialize, Serialize};

/// Sentinel quota value meaning "unlimited".
pub const UNLIMITED: i32 = -1;

/// Recent-document retention cap per owner.
pub const RECENT_RETENTION_CAP: i64 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Tier {
    Freemium,
    Basic,
    Premium,
    PremiumPlus,
}

impl Tier {
    /// Monthly generation quota; `UNLIMITED` (-1) for Premium+.
    pub fn quota(&self) -> i32 {
        match self {
            Tier::Freemium => 2,
            Tier::Basic => 5,
            Tier::Premium => 10,
            Tier::PremiumPlus => UNLIMITED,
        }
    }

    /// Monthly price in cents.
    pub fn price_cents(&self) -> i32 {
        match self {
            Tier::Freemium => 0,
            Tier::Basic => 500,
            Tier::Premium => 1000,
            Tier::PremiumPlus => 1500,
        }
    }

    /// Human-readable plan name as shown in checkout and on invoices.
    pub fn display_name(&self) -> &'static str {
        match self {
            Tier::Freemium => "Freemium",
            Tier::Basic => "Basic",
            Tier::Premium => "Premium",
            Tier::PremiumPlus => "Premium+",
        }
    }

    /// Storage / API string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Freemium => "FREEMIUM",
            Tier::Basic => "BASIC",
            Tier::Premium => "PREMIUM",
            Tier::PremiumPlus => "PREMIUM_PLUS",
        }
    }

    /// Strict parse for write paths. `None` means the caller must fail with
    /// an invalid-tier error and mutate nothing.
    pub fn parse_strict(s: &str) -> Option<Tier> {
        match s {
            "FREEMIUM" => Some(Tier::Freemium),
            "BASIC" => Some(Tier::Basic),
            "PREMIUM" => Some(Tier::Premium),
            "PREMIUM_PLUS" => Some(Tier::PremiumPlus),
            _ => None,
        }
    }

    /// Lenient parse for read/display paths: unrecognized values render as
    /// the FREEMIUM entry rather than erroring out of a profile fetch.
    pub fn parse_or_freemium(s: &str) -> Tier {
        Tier::parse_strict(s).unwrap_or(Tier::Freemium)
    }

    /// Maps a checkout plan display name to a tier. This path is driven by
    /// trusted provider metadata, so an unrecognized plan name defaults to
    /// BASIC instead of rejecting — distinct from `parse_strict`, which
    /// guards user-supplied input.
    pub fn from_plan_name(plan_name: &str) -> Tier {
        match plan_name {
            "Freemium" => Tier::Freemium,
            "Basic" => Tier::Basic,
            "Premium" => Tier::Premium,
            "Premium+" => Tier::PremiumPlus,
            _ => Tier::Basic,
        }
    }
}

/// Display entry for a tier, shaped for profile and pricing responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TierInfo {
    pub name: String,
    pub limit: i32,
    pub price_cents: i32,
}

impl From<Tier> for TierInfo {
    fn from(tier: Tier) -> Self {
        TierInfo {
            name: tier.display_name().to_string(),
            limit: tier.quota(),
            price_cents: tier.price_cents(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quotas_match_catalog() {
        assert_eq!(Tier::Freemium.quota(), 2);
        assert_eq!(Tier::Basic.quota(), 5);
        assert_eq!(Tier::Premium.quota(), 10);
        assert_eq!(Tier::PremiumPlus.quota(), UNLIMITED);
    }

    #[test]
    fn test_strict_parse_rejects_unknown_tier() {
        assert_eq!(Tier::parse_strict("GOLD"), None);
        assert_eq!(Tier::parse_strict("premium"), None);
        assert_eq!(Tier::parse_strict("PREMIUM"), Some(Tier::Premium));
    }

    #[test]
    fn test_lenient_parse_falls_back_to_freemium() {
        assert_eq!(Tier::parse_or_freemium("GOLD"), Tier::Freemium);
        assert_eq!(Tier::parse_or_freemium("BASIC"), Tier::Basic);
    }

    #[test]
    fn test_plan_name_mapping_defaults_to_basic() {
        assert_eq!(Tier::from_plan_name("Premium+"), Tier::PremiumPlus);
        assert_eq!(Tier::from_plan_name("Premium"), Tier::Premium);
        assert_eq!(Tier::from_plan_name("Basic"), Tier::Basic);
        assert_eq!(Tier::from_plan_name("Freemium"), Tier::Freemium);
        assert_eq!(Tier::from_plan_name("Enterprise"), Tier::Basic);
    }

    #[test]
    fn test_tier_serializes_screaming_snake() {
        let json = serde_json::to_string(&Tier::PremiumPlus).unwrap();
        assert_eq!(json, "\"PREMIUM_PLUS\"");
    }
}
