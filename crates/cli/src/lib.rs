//! # tierkeep
//!
//! Tiered backup retention for local storage pools.
//!
//! ## Commands
//!
//! - `tierkeep run` - clean every pool and create due snapshots / archives
//! - `tierkeep report` - show the last stored outcome per pool
//! - `tierkeep check-config` - validate the config and print the policy table
//!
//! ## Exit codes
//!
//! `0` everything succeeded, `1` a non-fatal problem (failed deletion or
//! creation, busy lock, failed measurement), `2` a pool was unavailable or
//! the configuration is invalid.

pub mod commands;
pub mod output;
pub mod settings;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Exit code for configuration and startup failures.
pub const EXIT_CONFIG_ERROR: u8 = 2;

/// Tiered backup retention engine.
#[derive(Debug, Parser)]
#[command(name = "tierkeep")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Pool configuration file (JSON).
    #[arg(long, global = true, env = "TIERKEEP_CONFIG", default_value = "tierkeep.json")]
    pub config: PathBuf,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run cleanup and creation across pools.
    Run(commands::run::RunArgs),
    /// Show the last stored outcome for every pool.
    Report,
    /// Validate the configuration and print the effective retention table.
    CheckConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// JSON.
    Json,
}

/// Dispatch a parsed command line. Returns the process exit code.
pub async fn execute(cli: Cli) -> anyhow::Result<u8> {
    match cli.command {
        Commands::Run(args) => commands::run::execute(args, &cli.config, cli.format).await,
        Commands::Report => commands::report::execute(&cli.config, cli.format).await,
        Commands::CheckConfig => commands::check_config::execute(&cli.config, cli.format),
    }
}
