//! Configuration module for Tollgate
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`TOLLGATE_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use tollgate::config::TollgateConfig;
//!
//! let config = TollgateConfig::default();
//! assert_eq!(config.server.port, 7546);
//!
//! let toml = r#"
//! [limiter]
//! total_budget = 1000
//! "#;
//! let config: TollgateConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.limiter.total_budget, 1000);
//! ```

pub mod cache;
pub mod error;
pub mod limiter;
pub mod logging;
pub mod server;
pub mod spending_plans;

pub use cache::CacheConfig;
pub use error::ConfigError;
pub use limiter::{LimiterConfig, TierLimits};
pub use logging::{LogFormat, LoggingConfig};
pub use server::ServerConfig;
pub use spending_plans::SpendingPlansConfig;

use crate::store::SubscriptionTier;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unified configuration for the Tollgate relay core.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TollgateConfig {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Global budget, reset window and tier ceilings
    pub limiter: LimiterConfig,
    /// Shared cache settings
    pub cache: CacheConfig,
    /// Declared spending plans
    pub spending_plans: SpendingPlansConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl TollgateConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supports TOLLGATE_* environment variables for common settings.
    /// Invalid values are silently ignored (defaults are kept).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(port) = std::env::var("TOLLGATE_PORT") {
            if let Ok(p) = port.parse() {
                self.server.port = p;
            }
        }
        if let Ok(host) = std::env::var("TOLLGATE_HOST") {
            self.server.host = host;
        }

        if let Ok(level) = std::env::var("TOLLGATE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("TOLLGATE_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }

        if let Ok(budget) = std::env::var("TOLLGATE_TOTAL_BUDGET") {
            if let Ok(b) = budget.parse() {
                self.limiter.total_budget = b;
            }
        }
        if let Ok(source) = std::env::var("TOLLGATE_SPENDING_PLANS") {
            self.spending_plans.source = Some(source);
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Validation {
                field: "server.port".to_string(),
                message: "port must be non-zero".to_string(),
            });
        }

        if self.limiter.total_budget <= 0 {
            return Err(ConfigError::Validation {
                field: "limiter.total_budget".to_string(),
                message: "total budget must be positive".to_string(),
            });
        }
        if self.limiter.reset_interval_secs == 0 {
            return Err(ConfigError::Validation {
                field: "limiter.reset_interval_secs".to_string(),
                message: "reset interval must be non-zero".to_string(),
            });
        }

        // Ceilings must grow with the tier.
        let mut previous: Option<(SubscriptionTier, i64)> = None;
        for tier in SubscriptionTier::ALL {
            let limit = self.limiter.limit_for(tier);
            if limit <= 0 {
                return Err(ConfigError::Validation {
                    field: format!("limiter.tier_limits.{}", tier.label()),
                    message: "limit must be positive".to_string(),
                });
            }
            if let Some((lower, lower_limit)) = previous {
                if limit <= lower_limit {
                    return Err(ConfigError::Validation {
                        field: format!("limiter.tier_limits.{}", tier.label()),
                        message: format!(
                            "limit must be greater than the {} limit ({})",
                            lower.label(),
                            lower_limit
                        ),
                    });
                }
            }
            previous = Some((tier, limit));
        }

        if self.cache.operation_timeout_ms == 0 {
            return Err(ConfigError::Validation {
                field: "cache.operation_timeout_ms".to_string(),
                message: "timeout must be non-zero".to_string(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_tollgate_config_defaults() {
        let config = TollgateConfig::default();
        assert_eq!(config.server.port, 7546);
        assert_eq!(config.limiter.reset_interval_secs, 86_400);
        assert_eq!(config.cache.operation_timeout_ms, 5000);
        assert_eq!(
            config.spending_plans.source.as_deref(),
            Some("spendingPlansConfig.json")
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_parse_minimal_toml() {
        let toml = r#"
        [server]
        port = 9000
        "#;

        let config: TollgateConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.limiter.total_budget, 800_000_000_000);
    }

    #[test]
    fn test_config_parse_full_toml() {
        let toml = include_str!("../../tollgate.example.toml");
        let config: TollgateConfig = toml::from_str(toml).unwrap();
        assert!(config.server.port > 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_load_from_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "[limiter]\ntotal_budget = 5000").unwrap();

        let config = TollgateConfig::load(Some(temp.path())).unwrap();
        assert_eq!(config.limiter.total_budget, 5000);
    }

    #[test]
    fn test_config_missing_file_error() {
        let result = TollgateConfig::load(Some(Path::new("/nonexistent/tollgate.toml")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_config_invalid_toml_is_parse_error() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "[limiter\n").unwrap();

        let result = TollgateConfig::load(Some(temp.path()));
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_load_none_returns_defaults() {
        let config = TollgateConfig::load(None).unwrap();
        assert_eq!(config.server.port, 7546);
    }

    #[test]
    fn test_config_env_override_host() {
        std::env::set_var("TOLLGATE_HOST", "127.0.0.1");
        let config = TollgateConfig::default().with_env_overrides();
        std::env::remove_var("TOLLGATE_HOST");

        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn test_config_env_override_total_budget() {
        std::env::set_var("TOLLGATE_TOTAL_BUDGET", "1234");
        let config = TollgateConfig::default().with_env_overrides();
        std::env::remove_var("TOLLGATE_TOTAL_BUDGET");

        assert_eq!(config.limiter.total_budget, 1234);
    }

    #[test]
    fn test_config_env_invalid_port_ignored() {
        std::env::set_var("TOLLGATE_PORT", "not-a-number");
        let config = TollgateConfig::default().with_env_overrides();
        std::env::remove_var("TOLLGATE_PORT");

        assert_eq!(config.server.port, 7546);
    }

    #[test]
    fn test_config_env_override_spending_plans() {
        std::env::set_var("TOLLGATE_SPENDING_PLANS", "[]");
        let config = TollgateConfig::default().with_env_overrides();
        std::env::remove_var("TOLLGATE_SPENDING_PLANS");

        assert_eq!(config.spending_plans.source.as_deref(), Some("[]"));
    }

    #[test]
    fn test_config_validation_zero_port() {
        let mut config = TollgateConfig::default();
        config.server.port = 0;

        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::Validation { ref field, .. }) if field == "server.port"
        ));
    }

    #[test]
    fn test_config_validation_non_positive_budget() {
        let mut config = TollgateConfig::default();
        config.limiter.total_budget = 0;

        let result = config.validate();
        assert!(matches!(
            result,
            Err(ConfigError::Validation { ref field, .. }) if field == "limiter.total_budget"
        ));
    }

    #[test]
    fn test_config_validation_zero_reset_interval() {
        let mut config = TollgateConfig::default();
        config.limiter.reset_interval_secs = 0;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { ref field, .. }) if field == "limiter.reset_interval_secs"
        ));
    }

    #[test]
    fn test_config_validation_tier_limits_must_increase() {
        let mut config = TollgateConfig::default();
        config.limiter.tier_limits.extended = config.limiter.tier_limits.basic;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { ref field, .. }) if field == "limiter.tier_limits.extended"
        ));
    }

    #[test]
    fn test_config_validation_zero_cache_timeout() {
        let mut config = TollgateConfig::default();
        config.cache.operation_timeout_ms = 0;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { ref field, .. }) if field == "cache.operation_timeout_ms"
        ));
    }
}
