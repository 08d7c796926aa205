use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscription tier of a spending plan. Each tier has a fixed spend ceiling
/// per reset window, strictly increasing from `Basic` to `Privileged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionTier {
    Basic,
    Extended,
    Privileged,
}

impl SubscriptionTier {
    pub const ALL: [SubscriptionTier; 3] = [
        SubscriptionTier::Basic,
        SubscriptionTier::Extended,
        SubscriptionTier::Privileged,
    ];

    /// Wire and key form, e.g. `BASIC`.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionTier::Basic => "BASIC",
            SubscriptionTier::Extended => "EXTENDED",
            SubscriptionTier::Privileged => "PRIVILEGED",
        }
    }

    /// Lowercase form used for metric labels and config keys.
    pub fn label(&self) -> &'static str {
        match self {
            SubscriptionTier::Basic => "basic",
            SubscriptionTier::Extended => "extended",
            SubscriptionTier::Privileged => "privileged",
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BASIC" => Ok(SubscriptionTier::Basic),
            "EXTENDED" => Ok(SubscriptionTier::Extended),
            "PRIVILEGED" => Ok(SubscriptionTier::Privileged),
            _ => Err(format!(
                "unknown subscription tier '{}', expected one of BASIC, EXTENDED, PRIVILEGED",
                s
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wire_names_only() {
        assert_eq!("BASIC".parse(), Ok(SubscriptionTier::Basic));
        assert_eq!("PRIVILEGED".parse(), Ok(SubscriptionTier::Privileged));
        assert!("basic".parse::<SubscriptionTier>().is_err());
        assert!("GOLD".parse::<SubscriptionTier>().is_err());
    }

    #[test]
    fn serde_uses_screaming_case() {
        let json = serde_json::to_string(&SubscriptionTier::Extended).unwrap();
        assert_eq!(json, "\"EXTENDED\"");
        let tier: SubscriptionTier = serde_json::from_str("\"BASIC\"").unwrap();
        assert_eq!(tier, SubscriptionTier::Basic);
    }

    #[test]
    fn tiers_are_ordered() {
        assert!(SubscriptionTier::Basic < SubscriptionTier::Extended);
        assert!(SubscriptionTier::Extended < SubscriptionTier::Privileged);
    }
}
