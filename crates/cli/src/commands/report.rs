//! `tierkeep report`

use std::path::Path;

use anyhow::{Context, Result};
use tierkeep_core::report::Severity;
use tierkeep_engine::load_last_reports;
use tierkeep_store::StateDir;

use crate::output;
use crate::settings::{load_config, Settings};
use crate::OutputFormat;

/// Print the last stored outcome per configured pool. The exit code
/// reflects the worst of those outcomes.
pub async fn execute(config_path: &Path, format: OutputFormat) -> Result<u8> {
    let settings = Settings::from_env()?;
    let config = load_config(config_path)?;
    let state = StateDir::open(&settings.state_dir)
        .with_context(|| {
            format!("Cannot open state directory {}", settings.state_dir.display())
        })?
        .with_timeout(settings.timeouts.state);

    let reports = load_last_reports(&state, &config.pools).await?;
    println!("{}", output::render_last_reports(&reports, format)?);

    let worst = reports
        .iter()
        .filter_map(|(_, outcome)| outcome.as_ref().map(|o| o.severity()))
        .max()
        .unwrap_or(Severity::Ok);
    Ok(u8::try_from(worst.exit_code()).unwrap_or(crate::EXIT_CONFIG_ERROR))
}
