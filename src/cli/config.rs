//! Config command handlers

use crate::cli::ConfigInitArgs;
use anyhow::{bail, Context};
use std::fs;

const EXAMPLE_CONFIG: &str = include_str!("../../tollgate.example.toml");

/// Handle `tollgate config init`
pub fn handle_config_init(args: &ConfigInitArgs) -> anyhow::Result<()> {
    if args.output.exists() && !args.force {
        bail!(
            "File already exists: {}. Use --force to overwrite.",
            args.output.display()
        );
    }

    fs::write(&args.output, EXAMPLE_CONFIG)
        .with_context(|| format!("failed to write {}", args.output.display()))?;

    println!("✓ Configuration file created: {}", args.output.display());
    println!("  Edit the [limiter] section to set the budget and tier ceilings.");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TollgateConfig;

    #[test]
    fn test_config_init_writes_loadable_config() {
        let temp_dir = tempfile::tempdir().unwrap();
        let output_path = temp_dir.path().join("tollgate.toml");

        handle_config_init(&ConfigInitArgs {
            output: output_path.clone(),
            force: false,
        })
        .unwrap();

        let config = TollgateConfig::load(Some(&output_path)).unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.port, 7546);
    }

    #[test]
    fn test_config_init_keeps_existing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let output_path = temp_dir.path().join("tollgate.toml");
        fs::write(&output_path, "existing").unwrap();

        let result = handle_config_init(&ConfigInitArgs {
            output: output_path.clone(),
            force: false,
        });

        assert!(result.unwrap_err().to_string().contains("--force"));
        assert_eq!(fs::read_to_string(&output_path).unwrap(), "existing");
    }

    #[test]
    fn test_config_init_force_overwrites() {
        let temp_dir = tempfile::tempdir().unwrap();
        let output_path = temp_dir.path().join("tollgate.toml");
        fs::write(&output_path, "old content").unwrap();

        handle_config_init(&ConfigInitArgs {
            output: output_path.clone(),
            force: true,
        })
        .unwrap();

        assert!(fs::read_to_string(&output_path)
            .unwrap()
            .contains("[limiter]"));
    }
}
