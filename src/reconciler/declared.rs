//! Declared spending plans: parsing, validation and loading.

use super::ReconcileError;
use crate::store::SubscriptionTier;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// One entry of the declared spending plan list, as written by the operator.
///
/// Every field is optional here so that a bad entry can be reported as a
/// whole; [`validate`](Self::validate) turns it into a [`DeclaredPlan`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingPlanConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_addresses: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_addresses: Option<Vec<String>>,
}

/// A validated declared plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredPlan {
    pub id: String,
    pub name: String,
    pub tier: SubscriptionTier,
    pub eth_addresses: Vec<String>,
    pub ip_addresses: Vec<String>,
}

impl SpendingPlanConfig {
    /// Check that the entry has an id, a name, a known tier and at least one
    /// address.
    pub fn validate(&self) -> Result<DeclaredPlan, ReconcileError> {
        let invalid = |reason: &str| ReconcileError::invalid(self.to_json(), reason);

        let id = non_blank(&self.id).ok_or_else(|| invalid("missing id"))?;
        let name = non_blank(&self.name).ok_or_else(|| invalid("missing name"))?;
        let tier = non_blank(&self.subscription_tier)
            .ok_or_else(|| invalid("missing subscriptionTier"))?
            .parse::<SubscriptionTier>()
            .map_err(|e| invalid(e.as_str()))?;

        let eth_addresses = self.eth_addresses.clone().unwrap_or_default();
        let ip_addresses = self.ip_addresses.clone().unwrap_or_default();
        if eth_addresses.is_empty() && ip_addresses.is_empty() {
            return Err(invalid("no ethAddresses or ipAddresses"));
        }
        if eth_addresses
            .iter()
            .chain(ip_addresses.iter())
            .any(|a| a.trim().is_empty())
        {
            return Err(invalid("empty address"));
        }

        Ok(DeclaredPlan {
            id: id.to_string(),
            name: name.to_string(),
            tier,
            eth_addresses,
            ip_addresses,
        })
    }

    fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

/// Validate every entry. The first bad entry fails the whole list, and so
/// does an id declared twice.
pub fn validate_all(configs: &[SpendingPlanConfig]) -> Result<Vec<DeclaredPlan>, ReconcileError> {
    let mut seen = HashSet::new();
    let mut declared = Vec::with_capacity(configs.len());
    for config in configs {
        let plan = config.validate()?;
        if !seen.insert(plan.id.clone()) {
            return Err(ReconcileError::invalid(config.to_json(), "duplicate id"));
        }
        declared.push(plan);
    }
    Ok(declared)
}

/// Where the declared list comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpendingPlansSource {
    /// JSON file on disk. A missing file declares nothing.
    File(PathBuf),
    /// The JSON array itself.
    Inline(String),
}

impl SpendingPlansSource {
    /// Interpret a configured value: a JSON array is used as is, anything
    /// else is a file path.
    pub fn from_setting(raw: &str) -> Self {
        if raw.trim_start().starts_with('[') {
            SpendingPlansSource::Inline(raw.to_string())
        } else {
            SpendingPlansSource::File(PathBuf::from(raw))
        }
    }

    /// Load the declared entries, or `None` if the source is a file that
    /// does not exist.
    pub fn load(&self) -> Result<Option<Vec<SpendingPlanConfig>>, ReconcileError> {
        match self {
            SpendingPlansSource::File(path) => load_file(path),
            SpendingPlansSource::Inline(json) => parse(json).map(Some),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            SpendingPlansSource::File(path) => path.display().to_string(),
            SpendingPlansSource::Inline(_) => "inline configuration".to_string(),
        }
    }
}

fn load_file(path: &Path) -> Result<Option<Vec<SpendingPlanConfig>>, ReconcileError> {
    if !path.exists() {
        tracing::debug!(
            path = %path.display(),
            "Spending plans configuration file not found, nothing to load"
        );
        return Ok(None);
    }
    let content = std::fs::read_to_string(path).map_err(|source| ReconcileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&content).map(Some)
}

fn parse(json: &str) -> Result<Vec<SpendingPlanConfig>, ReconcileError> {
    serde_json::from_str(json).map_err(|e| ReconcileError::invalid(abbreviate(json), e.to_string()))
}

fn abbreviate(raw: &str) -> String {
    const MAX: usize = 120;
    let raw = raw.trim();
    match raw.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &raw[..cut]),
        None => raw.to_string(),
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(json: serde_json::Value) -> SpendingPlanConfig {
        serde_json::from_value(json).unwrap()
    }

    fn reason_of(err: ReconcileError) -> String {
        match err {
            ReconcileError::InvalidConfiguration { reason, .. } => reason,
            other => panic!("expected invalid configuration, got {:?}", other),
        }
    }

    #[test]
    fn valid_entry() {
        let plan = entry(serde_json::json!({
            "id": "p1",
            "name": "Partner",
            "subscriptionTier": "EXTENDED",
            "ethAddresses": ["0xabc"]
        }))
        .validate()
        .unwrap();
        assert_eq!(plan.id, "p1");
        assert_eq!(plan.tier, SubscriptionTier::Extended);
        assert_eq!(plan.eth_addresses, vec!["0xabc"]);
        assert!(plan.ip_addresses.is_empty());
    }

    #[test]
    fn entry_without_id_is_rejected() {
        let err = entry(serde_json::json!({
            "name": "Plan without ID",
            "subscriptionTier": "EXTENDED",
            "ethAddresses": ["0x123"]
        }))
        .validate()
        .unwrap_err();
        assert!(err.to_string().contains("Plan without ID"));
        assert_eq!(reason_of(err), "missing id");
    }

    #[test]
    fn entry_without_name_is_rejected() {
        let err = entry(serde_json::json!({
            "id": "p1",
            "subscriptionTier": "BASIC",
            "ipAddresses": ["127.0.0.1"]
        }))
        .validate()
        .unwrap_err();
        assert_eq!(reason_of(err), "missing name");
    }

    #[test]
    fn entry_without_or_with_unknown_tier_is_rejected() {
        let missing = entry(serde_json::json!({
            "id": "p1", "name": "n", "ethAddresses": ["0x1"]
        }));
        assert_eq!(reason_of(missing.validate().unwrap_err()), "missing subscriptionTier");

        let unknown = entry(serde_json::json!({
            "id": "p1", "name": "n", "subscriptionTier": "GOLD", "ethAddresses": ["0x1"]
        }));
        assert!(reason_of(unknown.validate().unwrap_err()).contains("GOLD"));
    }

    #[test]
    fn entry_without_addresses_is_rejected() {
        let none = entry(serde_json::json!({
            "id": "p1", "name": "n", "subscriptionTier": "PRIVILEGED"
        }));
        let empty = entry(serde_json::json!({
            "id": "p1", "name": "n", "subscriptionTier": "PRIVILEGED",
            "ethAddresses": [], "ipAddresses": []
        }));
        assert_eq!(reason_of(none.validate().unwrap_err()), "no ethAddresses or ipAddresses");
        assert_eq!(reason_of(empty.validate().unwrap_err()), "no ethAddresses or ipAddresses");
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let a = entry(serde_json::json!({
            "id": "p1", "name": "a", "subscriptionTier": "BASIC", "ethAddresses": ["0x1"]
        }));
        let b = entry(serde_json::json!({
            "id": "p1", "name": "b", "subscriptionTier": "BASIC", "ethAddresses": ["0x2"]
        }));
        assert_eq!(reason_of(validate_all(&[a, b]).unwrap_err()), "duplicate id");
    }

    #[test]
    fn source_from_setting() {
        assert_eq!(
            SpendingPlansSource::from_setting("plans.json"),
            SpendingPlansSource::File(PathBuf::from("plans.json"))
        );
        assert!(matches!(
            SpendingPlansSource::from_setting("  [ ]"),
            SpendingPlansSource::Inline(_)
        ));
    }

    #[test]
    fn missing_file_loads_nothing() {
        let source = SpendingPlansSource::File(PathBuf::from("/nonexistent/plans.json"));
        assert_eq!(source.load().unwrap(), None);
    }

    #[test]
    fn unparsable_source_is_invalid_configuration() {
        let source = SpendingPlansSource::Inline("[invalid JSON".to_string());
        assert!(matches!(
            source.load(),
            Err(ReconcileError::InvalidConfiguration { .. })
        ));

        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "invalid JSON").unwrap();
        let source = SpendingPlansSource::File(file.path().to_path_buf());
        assert!(matches!(
            source.load(),
            Err(ReconcileError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn file_source_is_parsed() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"[{"id":"p1","name":"n","subscriptionTier":"BASIC","ipAddresses":["10.0.0.1"]}]"#,
        )
        .unwrap();
        let loaded = SpendingPlansSource::File(file.path().to_path_buf())
            .load()
            .unwrap()
            .unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].ip_addresses.as_deref(), Some(&["10.0.0.1".to_string()][..]));
    }
}
