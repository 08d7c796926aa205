//! CLI module for Tollgate
//!
//! Command-line interface definitions and handlers.
//!
//! # Commands
//!
//! - `serve` - Start the limiter service
//! - `plans validate` - Check a spending plans declaration without applying it
//! - `config init` - Write a starter configuration file
//!
//! # Example
//!
//! ```bash
//! # Start with the default config file
//! tollgate serve
//!
//! # Check the declared plans before a deploy
//! tollgate plans validate --source spendingPlansConfig.json
//! ```

pub mod config;
pub mod output;
pub mod plans;
pub mod serve;

pub use config::handle_config_init;
pub use plans::handle_plans_validate;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Tollgate - spend limiter for a JSON-RPC relay
#[derive(Parser, Debug)]
#[command(
    name = "tollgate",
    version,
    about = "Spend limiting and spending plan reconciliation for a JSON-RPC relay"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the limiter service
    Serve(ServeArgs),
    /// Spending plan utilities
    #[command(subcommand)]
    Plans(PlansCommands),
    /// Configuration utilities
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "tollgate.toml")]
    pub config: PathBuf,

    /// Override server port
    #[arg(short, long, env = "TOLLGATE_PORT")]
    pub port: Option<u16>,

    /// Override server host
    #[arg(short = 'H', long, env = "TOLLGATE_HOST")]
    pub host: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "TOLLGATE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Override the spending plans source (file path or JSON array)
    #[arg(long)]
    pub spending_plans: Option<String>,

    /// Skip reconciling declared spending plans at startup
    #[arg(long)]
    pub no_reconcile: bool,
}

#[derive(Subcommand, Debug)]
pub enum PlansCommands {
    /// Validate a spending plans declaration
    Validate(PlansValidateArgs),
}

#[derive(Args, Debug)]
pub struct PlansValidateArgs {
    /// Spending plans source; defaults to the one in the config file
    #[arg(short, long)]
    pub source: Option<String>,

    /// Path to configuration file
    #[arg(short, long, default_value = "tollgate.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Initialize a new configuration file
    Init(ConfigInitArgs),
}

#[derive(Args, Debug)]
pub struct ConfigInitArgs {
    /// Output file path
    #[arg(short, long, default_value = "tollgate.toml")]
    pub output: PathBuf,

    /// Overwrite existing file
    #[arg(short, long)]
    pub force: bool,
}
