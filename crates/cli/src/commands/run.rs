//! `tierkeep run`

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use tierkeep_core::tier::CleanupTier;
use tierkeep_engine::{EngineOptions, Orchestrator, Services};
use tierkeep_store::StateDir;
use tokio_util::sync::CancellationToken;

use crate::output;
use crate::settings::{load_config, Settings};
use crate::OutputFormat;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Force at least this tier for every pool. Never deletes the newest unit.
    #[arg(long)]
    pub tier: Option<CleanupTier>,

    /// Only process these pools (repeatable).
    #[arg(long = "pool", value_name = "ID")]
    pub pools: Vec<String>,

    /// Report what would be deleted or created without changing anything.
    #[arg(long)]
    pub dry_run: bool,
}

pub async fn execute(args: RunArgs, config_path: &Path, format: OutputFormat) -> Result<u8> {
    let settings = Settings::from_env()?;
    let config = load_config(config_path)?;
    let state = StateDir::open(&settings.state_dir).with_context(|| {
        format!("Cannot open state directory {}", settings.state_dir.display())
    })?;

    let options = EngineOptions {
        dry_run: args.dry_run,
        tier_override: args.tier,
        pools: args.pools,
        max_parallel_pools: settings.max_parallel_pools,
        lock_timeout: settings.lock_timeout,
    };
    let services = Services::system(state, settings.timeouts);
    let orchestrator = Orchestrator::new(config, services, options)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; finishing pools already in progress");
            on_signal.cancel();
        }
    });

    let report = orchestrator.run(cancel).await;
    println!("{}", output::render_health(&report, format)?);

    Ok(u8::try_from(report.exit_code()).unwrap_or(crate::EXIT_CONFIG_ERROR))
}
