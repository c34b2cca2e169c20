//! Snapshot due-decision.
//!
//! A snapshot is due when the pool is empty or its head is at least
//! `min_interval` old. Incremental snapshots link against the head so that
//! unchanged files are not duplicated on disk.

use serde::Serialize;

use crate::pool::PoolKind;
use crate::types::Timestamp;
use crate::unit::{head, unit_name, BackupUnit};

/// Default minimum spacing between snapshots.
pub const DEFAULT_MIN_INTERVAL_SECS: i64 = 3600;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum SnapshotDecision {
    /// The head is recent enough; nothing to do.
    NotDue { head: String, next_due: Timestamp },
    /// Empty pool: copy everything.
    Full { name: String },
    /// Copy against `base`, hard-linking unchanged files.
    Incremental { name: String, base: String },
}

/// Decide whether a new snapshot is needed at `now`.
pub fn snapshot_decision(
    units: &[BackupUnit],
    min_interval: chrono::Duration,
    now: Timestamp,
) -> SnapshotDecision {
    let name = unit_name(PoolKind::Snapshot, now);

    let Some(head) = head(units) else {
        return SnapshotDecision::Full { name };
    };

    // Same-second re-invocation maps to the same name even with a zero interval.
    if head.age(now) < min_interval || head.id == name || head.created_at > now {
        return SnapshotDecision::NotDue {
            head: head.id.clone(),
            next_due: head.created_at + min_interval,
        };
    }

    SnapshotDecision::Incremental {
        name,
        base: head.id.clone(),
    }
}
