//! Storage pools: kinds, runtime definitions and creation policies.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::archive::Period;
use crate::error::CoreError;
use crate::types::PoolId;

// ---------------------------------------------------------------------------
// Pool kind
// ---------------------------------------------------------------------------

/// The role of a pool. Every unit in a pool shares the pool's kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PoolKind {
    Snapshot,
    WeeklyArchive,
    MonthlyArchive,
    Mirror,
    SystemBackup,
}

impl PoolKind {
    pub const ALL: [PoolKind; 5] = [
        PoolKind::Snapshot,
        PoolKind::WeeklyArchive,
        PoolKind::MonthlyArchive,
        PoolKind::Mirror,
        PoolKind::SystemBackup,
    ];

    /// Parse from the config name (`snapshot`, `weekly-archive`, ...).
    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == name)
            .ok_or_else(|| CoreError::Validation(format!("Unknown pool kind '{name}'")))
    }

    /// Config / serialized name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::WeeklyArchive => "weekly-archive",
            Self::MonthlyArchive => "monthly-archive",
            Self::Mirror => "mirror",
            Self::SystemBackup => "system-backup",
        }
    }

    /// Prefix of unit names in pools of this kind.
    pub fn unit_prefix(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::WeeklyArchive => "weekly",
            Self::MonthlyArchive => "monthly",
            Self::Mirror => "mirror",
            Self::SystemBackup => "system",
        }
    }

    /// Suffix of unit names (archives are single compressed files).
    pub fn unit_suffix(self) -> &'static str {
        match self {
            Self::WeeklyArchive | Self::MonthlyArchive => ".tar.gz",
            Self::Snapshot | Self::Mirror | Self::SystemBackup => "",
        }
    }
}

impl std::fmt::Display for PoolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Creation policy
// ---------------------------------------------------------------------------

/// What the engine backs up into a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSpec {
    pub path: PathBuf,
    pub excludes: Vec<String>,
}

/// How new units come into existence in a pool. Pools without a creation
/// policy are filled by something else and only cleaned here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum CreationPolicy {
    Snapshot {
        source: SourceSpec,
        #[serde(with = "duration_secs")]
        min_interval: chrono::Duration,
    },
    Archive {
        source: SourceSpec,
        period: Period,
    },
}

mod duration_secs {
    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &chrono::Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(d.num_seconds())
    }
}

// ---------------------------------------------------------------------------
// Storage pool
// ---------------------------------------------------------------------------

/// A named capacity domain. Capacity is never stored here; it is measured
/// fresh on every run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoragePool {
    pub id: PoolId,
    pub kind: PoolKind,
    pub root: PathBuf,
    /// Available bytes below which cleanup escalates to `Moderate`.
    pub warning_threshold: u64,
    /// Available bytes below which cleanup escalates to `Critical`.
    pub critical_threshold: u64,
    /// Root must be a mount point (removable media); otherwise the pool is
    /// reported unavailable.
    pub require_mount: bool,
    /// The pool is the local side of a cloud-synced folder.
    pub cloud_mirror: bool,
    pub creation: Option<CreationPolicy>,
}

impl StoragePool {
    /// Check identifier, thresholds and that the creation policy fits the kind.
    pub fn validate(&self) -> Result<(), CoreError> {
        validate_pool_id(&self.id)?;

        if self.warning_threshold <= self.critical_threshold {
            return Err(CoreError::PolicyMisconfigured(format!(
                "Pool '{}': warning threshold ({}) must be greater than critical threshold ({})",
                self.id, self.warning_threshold, self.critical_threshold
            )));
        }

        match (&self.creation, self.kind) {
            (None, _) => Ok(()),
            (Some(CreationPolicy::Snapshot { min_interval, .. }), PoolKind::Snapshot) => {
                if *min_interval < chrono::Duration::zero() {
                    Err(CoreError::PolicyMisconfigured(format!(
                        "Pool '{}': snapshot min_interval must not be negative",
                        self.id
                    )))
                } else {
                    Ok(())
                }
            }
            (Some(CreationPolicy::Archive { period, .. }), kind) if period.pool_kind() == kind => {
                Ok(())
            }
            (Some(_), kind) => Err(CoreError::PolicyMisconfigured(format!(
                "Pool '{}': creation policy does not apply to pools of kind '{kind}'",
                self.id
            ))),
        }
    }
}

/// Pool identifiers end up in file names, so keep them to a safe alphabet.
pub fn validate_pool_id(id: &str) -> Result<(), CoreError> {
    let valid = !id.is_empty()
        && id.len() <= 64
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if valid {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid pool id '{id}'. Use 1-64 characters from [A-Za-z0-9._-]"
        )))
    }
}

// ---------------------------------------------------------------------------
// Space usage
// ---------------------------------------------------------------------------

/// Capacity of a pool at one instant, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpaceUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub available_bytes: u64,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
