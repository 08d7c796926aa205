//! Declared spending plan source

use serde::{Deserialize, Serialize};

/// Where the declared spending plans come from.
///
/// `source` is either a path to a JSON file or the JSON array itself. A path
/// that does not exist means "no declared plans".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpendingPlansConfig {
    pub source: Option<String>,
}

impl Default for SpendingPlansConfig {
    fn default() -> Self {
        Self {
            source: Some("spendingPlansConfig.json".to_string()),
        }
    }
}
