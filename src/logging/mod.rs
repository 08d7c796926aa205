//! Structured logging helpers
//!
//! Filter construction for the tracing subscriber and request id generation.

use crate::config::LoggingConfig;
use uuid::Uuid;

/// Correlation id for an inbound call that arrived without one.
///
/// ```
/// let id = tollgate::logging::generate_request_id();
/// assert_eq!(id.len(), 36);
/// ```
pub fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Build filter directives string from LoggingConfig
///
/// Constructs a tracing filter string that includes the base log level
/// and any component-specific log levels configured in the LoggingConfig.
///
/// # Examples
///
/// ```
/// use tollgate::config::{LogFormat, LoggingConfig};
/// use tollgate::logging::build_filter_directives;
/// use std::collections::HashMap;
///
/// let mut component_levels = HashMap::new();
/// component_levels.insert("limiter".to_string(), "debug".to_string());
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Pretty,
///     component_levels: Some(component_levels),
/// };
///
/// let filter_str = build_filter_directives(&config);
/// assert_eq!(filter_str, "info,tollgate::limiter=debug");
/// ```
pub fn build_filter_directives(config: &LoggingConfig) -> String {
    let mut filter_str = config.level.clone();

    if let Some(component_levels) = &config.component_levels {
        let mut components: Vec<_> = component_levels.iter().collect();
        components.sort();
        for (component, level) in components {
            filter_str.push_str(&format!(",tollgate::{}={}", component, level));
        }
    }

    filter_str
}
