//! Per-pool retention reports and the aggregate health report.
//!
//! Reports are plain serializable data. Every per-unit and per-pool error
//! is folded in here instead of propagating, and the worst severity across
//! pools becomes the process exit code.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::archive::PeriodKey;
use crate::pool::PoolKind;
use crate::tier::CleanupTier;
use crate::types::{PoolId, Timestamp};

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Worst-case outcome classes, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Ok,
    /// Something non-fatal went wrong (failed deletion/creation, lock busy).
    Degraded,
    /// A pool could not be reached at all.
    Unavailable,
}

impl Severity {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Ok => 0,
            Self::Degraded => 1,
            Self::Unavailable => 2,
        }
    }
}

// ---------------------------------------------------------------------------
// Cleanup results
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletedUnit {
    pub unit_id: String,
    pub created_at: Timestamp,
    pub reclaimed_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDeletion {
    pub unit_id: String,
    pub error: String,
}

/// What the creation step did for a pool with a creation policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CreationOutcome {
    Created {
        unit_id: String,
        base: Option<String>,
        size_bytes: u64,
    },
    /// Dry runs report what would have been created.
    WouldCreate {
        unit_id: String,
        base: Option<String>,
    },
    NotDue {
        head: String,
        next_due: Timestamp,
    },
    AlreadySatisfied {
        period_key: PeriodKey,
        unit_id: Option<String>,
    },
    OutsideWindow {
        period_key: PeriodKey,
    },
    /// `UnitCreationFailed`: the pool's protection is degraded until the
    /// next successful creation.
    Failed {
        unit_id: Option<String>,
        error: String,
    },
}

impl CreationOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Result of one cleanup pass (plus creation step) over one pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionReport {
    pub pool_id: PoolId,
    pub kind: PoolKind,
    /// Tier chosen from available space alone.
    pub selected_tier: CleanupTier,
    /// Tier actually applied after any operator override.
    pub tier: CleanupTier,
    pub dry_run: bool,
    pub units_considered: usize,
    /// In a dry run, the units that would have been deleted.
    pub deleted: Vec<DeletedUnit>,
    pub preserved: Vec<String>,
    pub failures: Vec<FailedDeletion>,
    /// Deletion stopped because available space recovered.
    pub stopped_early: bool,
    /// Listing the pool failed; nothing was deleted.
    pub catalog_error: Option<String>,
    pub available_before: u64,
    pub final_available: u64,
    pub total_bytes: u64,
    pub cloud_mirror: bool,
    pub creation: Option<CreationOutcome>,
}

impl RetentionReport {
    pub fn reclaimed_bytes(&self) -> u64 {
        self.deleted.iter().map(|d| d.reclaimed_bytes).sum()
    }

    pub fn severity(&self) -> Severity {
        let creation_failed = self.creation.as_ref().is_some_and(CreationOutcome::is_failure);
        if !self.failures.is_empty() || self.catalog_error.is_some() || creation_failed {
            Severity::Degraded
        } else {
            Severity::Ok
        }
    }
}

// ---------------------------------------------------------------------------
// Pool outcome
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    PoolUnavailable,
    MeasurementFailed,
    LockTimeout,
    Cancelled,
    /// The pool task ended without producing an outcome.
    TaskFailed,
}

impl SkipReason {
    /// The pool was never looked at: another run held it, or this run was
    /// cancelled first. Such a skip says nothing about the pool itself.
    pub fn is_deferral(self) -> bool {
        matches!(self, Self::LockTimeout | Self::Cancelled)
    }

    pub fn severity(self) -> Severity {
        match self {
            Self::PoolUnavailable => Severity::Unavailable,
            Self::MeasurementFailed | Self::LockTimeout | Self::Cancelled | Self::TaskFailed => {
                Severity::Degraded
            }
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::PoolUnavailable => "PoolUnavailable",
            Self::MeasurementFailed => "MeasurementFailed",
            Self::LockTimeout => "LockTimeout",
            Self::Cancelled => "Cancelled",
            Self::TaskFailed => "TaskFailed",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PoolOutcome {
    Completed(RetentionReport),
    Skipped {
        pool_id: PoolId,
        reason: SkipReason,
        detail: String,
    },
}

impl PoolOutcome {
    pub fn pool_id(&self) -> &str {
        match self {
            Self::Completed(report) => &report.pool_id,
            Self::Skipped { pool_id, .. } => pool_id,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Self::Completed(report) => report.severity(),
            Self::Skipped { reason, .. } => reason.severity(),
        }
    }

    /// Whether this outcome should replace the pool's stored last report.
    /// Deferrals leave the previous report in place.
    pub fn replaces_last_report(&self) -> bool {
        match self {
            Self::Completed(_) => true,
            Self::Skipped { reason, .. } => !reason.is_deferral(),
        }
    }
}

// ---------------------------------------------------------------------------
// Health report
// ---------------------------------------------------------------------------

/// Aggregate of one run, assembled after every pool task has finished.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub run_id: Uuid,
    pub started_at: Timestamp,
    pub finished_at: Timestamp,
    pub dry_run: bool,
    pub pools: Vec<PoolOutcome>,
    /// Repositories with uncommitted or unpushed changes, when probed.
    pub pending_repositories: Option<usize>,
}

impl HealthReport {
    pub fn severity(&self) -> Severity {
        self.pools
            .iter()
            .map(PoolOutcome::severity)
            .max()
            .unwrap_or(Severity::Ok)
    }

    pub fn exit_code(&self) -> i32 {
        self.severity().exit_code()
    }

    pub fn total_reclaimed_bytes(&self) -> u64 {
        self.pools
            .iter()
            .filter_map(|p| match p {
                PoolOutcome::Completed(r) if !r.dry_run => Some(r.reclaimed_bytes()),
                _ => None,
            })
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
