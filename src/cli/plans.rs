//! Plans command implementation

use crate::cli::output::{format_plans_json, format_plans_table, PlanView};
use crate::cli::PlansValidateArgs;
use crate::config::TollgateConfig;
use crate::reconciler::{validate_all, SpendingPlansSource};
use anyhow::{anyhow, bail};

/// Handle `tollgate plans validate`
///
/// Loads the declaration the way `serve` would and checks every entry.
/// Nothing is written to the cache.
pub fn handle_plans_validate(args: &PlansValidateArgs) -> anyhow::Result<String> {
    let setting = match &args.source {
        Some(source) => source.clone(),
        None => {
            let config = if args.config.exists() {
                TollgateConfig::load(Some(&args.config))?
            } else {
                TollgateConfig::default()
            };
            config
                .spending_plans
                .source
                .ok_or_else(|| anyhow!("No spending plans source configured"))?
        }
    };

    let source = SpendingPlansSource::from_setting(&setting);
    let Some(configs) = source.load()? else {
        bail!("Spending plans file not found: {}", source.describe());
    };
    let declared = validate_all(&configs)?;
    let views: Vec<PlanView> = declared.iter().map(PlanView::from).collect();

    if args.json {
        Ok(format_plans_json(&views))
    } else {
        Ok(format!(
            "{}\n✓ {} spending plan(s) valid in {}",
            format_plans_table(&views),
            views.len(),
            source.describe()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args(source: &str, json: bool) -> PlansValidateArgs {
        PlansValidateArgs {
            source: Some(source.to_string()),
            config: PathBuf::from("nonexistent.toml"),
            json,
        }
    }

    #[test]
    fn test_validate_inline_plans() {
        let output = handle_plans_validate(&args(
            r#"[{"id":"p1","name":"Partner","subscriptionTier":"EXTENDED","ethAddresses":["0x1"]}]"#,
            false,
        ))
        .unwrap();
        assert!(output.contains("p1"));
        assert!(output.contains("1 spending plan(s) valid"));
    }

    #[test]
    fn test_validate_json_output() {
        let output = handle_plans_validate(&args(
            r#"[{"id":"p1","name":"Partner","subscriptionTier":"BASIC","ipAddresses":["10.0.0.1"]}]"#,
            true,
        ))
        .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["plans"][0]["id"], "p1");
    }

    #[test]
    fn test_validate_reports_bad_entry() {
        let err = handle_plans_validate(&args(
            r#"[{"name":"Plan without ID","subscriptionTier":"EXTENDED","ethAddresses":["0x1"]}]"#,
            false,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("missing id"));
    }

    #[test]
    fn test_validate_missing_file() {
        let err = handle_plans_validate(&args("/nonexistent/plans.json", false)).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_validate_source_from_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let plans = dir.path().join("plans.json");
        std::fs::write(
            &plans,
            r#"[{"id":"from-config","name":"n","subscriptionTier":"PRIVILEGED","ethAddresses":["0x9"]}]"#,
        )
        .unwrap();
        let config = dir.path().join("tollgate.toml");
        std::fs::write(
            &config,
            format!("[spending_plans]\nsource = {:?}\n", plans.display().to_string()),
        )
        .unwrap();

        let output = handle_plans_validate(&PlansValidateArgs {
            source: None,
            config,
            json: true,
        })
        .unwrap();
        assert!(output.contains("from-config"));
    }
}
