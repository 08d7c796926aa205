//! Cache configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings for the shared plan cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Deadline for every single cache operation
    pub operation_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: 5000,
        }
    }
}

impl CacheConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}
