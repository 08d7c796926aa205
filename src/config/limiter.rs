//! Spend limiter configuration

use crate::store::SubscriptionTier;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Global budget and per-tier ceilings, in ledger cost units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Spend ceiling shared by all callers for one reset window
    pub total_budget: i64,
    /// Length of the reset window
    pub reset_interval_secs: u64,
    pub tier_limits: TierLimits,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            total_budget: 800_000_000_000,
            reset_interval_secs: 86_400,
            tier_limits: TierLimits::default(),
        }
    }
}

impl LimiterConfig {
    pub fn reset_interval(&self) -> Duration {
        Duration::from_secs(self.reset_interval_secs)
    }

    pub fn limit_for(&self, tier: SubscriptionTier) -> i64 {
        self.tier_limits.limit_for(tier)
    }
}

/// Per-plan spend ceiling for each subscription tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierLimits {
    pub basic: i64,
    pub extended: i64,
    pub privileged: i64,
}

impl Default for TierLimits {
    fn default() -> Self {
        Self {
            basic: 1_120_000_000,
            extended: 3_200_000_000,
            privileged: 8_000_000_000,
        }
    }
}

impl TierLimits {
    pub fn limit_for(&self, tier: SubscriptionTier) -> i64 {
        match tier {
            SubscriptionTier::Basic => self.basic,
            SubscriptionTier::Extended => self.extended,
            SubscriptionTier::Privileged => self.privileged,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_config_defaults() {
        let config = LimiterConfig::default();
        assert_eq!(config.total_budget, 800_000_000_000);
        assert_eq!(config.reset_interval(), Duration::from_secs(86_400));
        assert_eq!(config.limit_for(SubscriptionTier::Basic), 1_120_000_000);
        assert_eq!(config.limit_for(SubscriptionTier::Privileged), 8_000_000_000);
    }

    #[test]
    fn test_partial_tier_limits_keep_defaults() {
        let config: LimiterConfig = toml::from_str(
            r#"
            total_budget = 1000
            [tier_limits]
            basic = 100
            "#,
        )
        .unwrap();
        assert_eq!(config.total_budget, 1000);
        assert_eq!(config.tier_limits.basic, 100);
        assert_eq!(config.tier_limits.extended, 3_200_000_000);
    }
}
