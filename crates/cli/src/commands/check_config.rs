//! `tierkeep check-config`

use std::path::Path;

use anyhow::Result;

use crate::output;
use crate::settings::load_config;
use crate::OutputFormat;

pub fn execute(config_path: &Path, format: OutputFormat) -> Result<u8> {
    let config = load_config(config_path)?;
    println!("{}", output::render_config(&config, format)?);
    Ok(0)
}
