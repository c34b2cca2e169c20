//! Engine configuration file model and its validation.
//!
//! The file is JSON. Sizes accept raw byte counts or strings like `"50G"`,
//! durations accept `"1h"`, `"30d"`. Retention entries override the
//! built-in table per (kind, tier); anything not overridden keeps its
//! default.
//!
//! ```json
//! {
//!   "pools": [
//!     {
//!       "id": "snapshots",
//!       "kind": "snapshot",
//!       "root": "/Volumes/Backup/snapshots",
//!       "warning_threshold": "50G",
//!       "critical_threshold": "10G",
//!       "require_mount": true,
//!       "creation": { "type": "snapshot", "source": "/home/me/research", "min_interval": "1h" }
//!     }
//!   ],
//!   "retention": { "snapshot": { "normal": "48h" } }
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::archive::{Period, DEFAULT_MONTHLY_WINDOW_DAYS};
use crate::error::CoreError;
use crate::policy::{parse_duration, RetentionPolicy, RetentionWindow};
use crate::pool::{CreationPolicy, PoolKind, SourceSpec, StoragePool};
use crate::size::SizeValue;
use crate::snapshot::DEFAULT_MIN_INTERVAL_SECS;
use crate::tier::CleanupTier;

// ---------------------------------------------------------------------------
// File model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    pub pools: Vec<PoolConfig>,
    /// `kind name → tier name → window`.
    #[serde(default)]
    pub retention: BTreeMap<String, BTreeMap<String, String>>,
    /// Working copies whose pending changes are counted in the health report.
    #[serde(default)]
    pub repositories: Vec<PathBuf>,
    #[serde(default = "default_monthly_window_days")]
    pub monthly_window_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PoolConfig {
    pub id: String,
    pub kind: PoolKind,
    pub root: PathBuf,
    pub warning_threshold: SizeValue,
    pub critical_threshold: SizeValue,
    #[serde(default)]
    pub require_mount: bool,
    #[serde(default)]
    pub cloud_mirror: bool,
    #[serde(default)]
    pub creation: Option<CreationConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CreationConfig {
    Snapshot {
        source: PathBuf,
        #[serde(default)]
        exclude: Vec<String>,
        #[serde(default)]
        min_interval: Option<String>,
    },
    Archive {
        source: PathBuf,
        #[serde(default)]
        exclude: Vec<String>,
        period: Period,
    },
}

fn default_monthly_window_days() -> u32 {
    DEFAULT_MONTHLY_WINDOW_DAYS
}

// ---------------------------------------------------------------------------
// Resolved config
// ---------------------------------------------------------------------------

/// Validated, runtime form of [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub pools: Vec<StoragePool>,
    pub policy: RetentionPolicy,
    pub repositories: Vec<PathBuf>,
    pub monthly_window_days: u32,
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Validate everything and build runtime types. Any error here is fatal
    /// at startup.
    pub fn resolve(&self) -> Result<ResolvedConfig, CoreError> {
        if self.pools.is_empty() {
            return Err(CoreError::Validation("No pools configured".into()));
        }
        if !(1..=28).contains(&self.monthly_window_days) {
            return Err(CoreError::PolicyMisconfigured(format!(
                "monthly_window_days must be between 1 and 28, got {}",
                self.monthly_window_days
            )));
        }

        let mut seen = HashSet::new();
        let mut pools = Vec::with_capacity(self.pools.len());
        for cfg in &self.pools {
            if !seen.insert(cfg.id.as_str()) {
                return Err(CoreError::Validation(format!("Duplicate pool id '{}'", cfg.id)));
            }
            let pool = cfg.resolve()?;
            pool.validate()?;
            pools.push(pool);
        }

        let policy = self.resolve_policy()?;
        policy.validate(pools.iter().map(|p| p.kind))?;

        Ok(ResolvedConfig {
            pools,
            policy,
            repositories: self.repositories.clone(),
            monthly_window_days: self.monthly_window_days,
        })
    }

    fn resolve_policy(&self) -> Result<RetentionPolicy, CoreError> {
        let mut policy = RetentionPolicy::default();
        for (kind_name, tiers) in &self.retention {
            let kind = PoolKind::from_name(kind_name).map_err(|_| {
                CoreError::PolicyMisconfigured(format!(
                    "retention: unknown pool kind '{kind_name}'"
                ))
            })?;
            for (tier_name, window) in tiers {
                let tier = CleanupTier::from_name(tier_name).map_err(|_| {
                    CoreError::PolicyMisconfigured(format!(
                        "retention.{kind_name}: unknown tier '{tier_name}'"
                    ))
                })?;
                let window: RetentionWindow = window.parse().map_err(|e| {
                    CoreError::PolicyMisconfigured(format!(
                        "retention.{kind_name}.{tier_name}: {e}"
                    ))
                })?;
                policy.set(kind, tier, window);
            }
        }
        Ok(policy)
    }
}

impl PoolConfig {
    fn resolve(&self) -> Result<StoragePool, CoreError> {
        let context = |e: CoreError| CoreError::Validation(format!("Pool '{}': {e}", self.id));

        let creation = match &self.creation {
            None => None,
            Some(CreationConfig::Snapshot {
                source,
                exclude,
                min_interval,
            }) => {
                let min_interval = match min_interval {
                    Some(text) => parse_duration(text).map_err(context)?,
                    None => chrono::Duration::seconds(DEFAULT_MIN_INTERVAL_SECS),
                };
                Some(CreationPolicy::Snapshot {
                    source: SourceSpec {
                        path: source.clone(),
                        excludes: exclude.clone(),
                    },
                    min_interval,
                })
            }
            Some(CreationConfig::Archive {
                source,
                exclude,
                period,
            }) => Some(CreationPolicy::Archive {
                source: SourceSpec {
                    path: source.clone(),
                    excludes: exclude.clone(),
                },
                period: *period,
            }),
        };

        Ok(StoragePool {
            id: self.id.clone(),
            kind: self.kind,
            root: self.root.clone(),
            warning_threshold: self.warning_threshold.to_bytes().map_err(context)?,
            critical_threshold: self.critical_threshold.to_bytes().map_err(context)?,
            require_mount: self.require_mount,
            cloud_mirror: self.cloud_mirror,
            creation,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
