//! Process settings from the environment, and loading the pool config file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tierkeep_core::config::{EngineConfig, ResolvedConfig};
use tierkeep_core::error::CoreError;
use tierkeep_engine::orchestrator::DEFAULT_LOCK_TIMEOUT;
use tierkeep_engine::services::Timeouts;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be {expected}, got '{value}'")]
    InvalidVar {
        name: &'static str,
        expected: &'static str,
        value: String,
    },

    #[error("Cannot read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {}: {source}", path.display())]
    Invalid {
        path: PathBuf,
        #[source]
        source: CoreError,
    },

    #[error("No state directory: set TIERKEEP_STATE_DIR or HOME")]
    NoStateDir,
}

/// Settings loaded from environment variables.
///
/// | Env Var                      | Default                             |
/// |------------------------------|-------------------------------------|
/// | `TIERKEEP_STATE_DIR`         | `$XDG_STATE_HOME/tierkeep`          |
/// | `TIERKEEP_IO_TIMEOUT_SECS`   | `600`                               |
/// | `TIERKEEP_STATE_TIMEOUT_SECS`| `30`                                |
/// | `TIERKEEP_LOCK_TIMEOUT_SECS` | `30`                                |
/// | `TIERKEEP_MAX_PARALLEL_POOLS`| `1`                                 |
///
/// Without `XDG_STATE_HOME` the state directory is
/// `$HOME/.local/state/tierkeep`. The config file path comes from
/// `--config` / `TIERKEEP_CONFIG`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub state_dir: PathBuf,
    pub timeouts: Timeouts,
    pub lock_timeout: Duration,
    pub max_parallel_pools: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Settings::from_env`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let state_dir = match lookup("TIERKEEP_STATE_DIR") {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => default_state_dir(&lookup)?,
        };

        let defaults = Timeouts::default();
        let io_secs = parse_var(&lookup, "TIERKEEP_IO_TIMEOUT_SECS", defaults.io.as_secs())?;
        let state_secs = parse_var(
            &lookup,
            "TIERKEEP_STATE_TIMEOUT_SECS",
            defaults.state.as_secs(),
        )?;
        let lock_secs = parse_var(
            &lookup,
            "TIERKEEP_LOCK_TIMEOUT_SECS",
            DEFAULT_LOCK_TIMEOUT.as_secs(),
        )?;
        let max_parallel_pools: usize = parse_var(&lookup, "TIERKEEP_MAX_PARALLEL_POOLS", 1)?;
        if max_parallel_pools == 0 {
            return Err(ConfigError::InvalidVar {
                name: "TIERKEEP_MAX_PARALLEL_POOLS",
                expected: "at least 1",
                value: "0".into(),
            });
        }

        Ok(Self {
            state_dir,
            timeouts: Timeouts {
                io: Duration::from_secs(io_secs),
                state: Duration::from_secs(state_secs),
                ..defaults
            },
            lock_timeout: Duration::from_secs(lock_secs),
            max_parallel_pools,
        })
    }
}

fn default_state_dir(lookup: &impl Fn(&str) -> Option<String>) -> Result<PathBuf, ConfigError> {
    if let Some(xdg) = lookup("XDG_STATE_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(xdg).join("tierkeep"));
    }
    match lookup("HOME").filter(|v| !v.is_empty()) {
        Some(home) => Ok(PathBuf::from(home).join(".local/state/tierkeep")),
        None => Err(ConfigError::NoStateDir),
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidVar {
            name,
            expected: "a non-negative integer",
            value,
        }),
    }
}

/// Read, parse and validate the pool config file.
pub fn load_config(path: &Path) -> Result<ResolvedConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let invalid = |source| ConfigError::Invalid {
        path: path.to_path_buf(),
        source,
    };
    EngineConfig::from_json(&text)
        .map_err(invalid)?
        .resolve()
        .map_err(invalid)
}
