//! Backup units and the naming scheme that carries their creation time.
//!
//! A unit's age is always derived from its name, never from filesystem
//! mtime: copying or restoring a pool rewrites mtimes but keeps names.
//!
//! Names look like `snapshot-20261017T143000Z` or
//! `weekly-20261012T020000Z.tar.gz`.

use chrono::{NaiveDateTime, TimeZone, Utc};
use serde::Serialize;

use crate::pool::PoolKind;
use crate::types::{PoolId, Timestamp};

/// `chrono` format of the timestamp embedded in unit names.
pub const NAME_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Length of a formatted name timestamp (`20261017T143000Z`).
const NAME_TIMESTAMP_LEN: usize = 16;

/// One immutable backup artifact: a snapshot directory or an archive file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupUnit {
    pub pool_id: PoolId,
    /// On-disk name, unique within the pool.
    pub id: String,
    pub created_at: Timestamp,
    /// Bytes freed by deleting this unit. Listing leaves it unset; the
    /// catalog sizes a unit only when asked.
    pub size_bytes: Option<u64>,
    /// Unit this one was hard-linked against, for incremental snapshots.
    pub base: Option<String>,
    pub kind: PoolKind,
}

impl BackupUnit {
    /// Age relative to `now`. Negative if the unit claims a future timestamp.
    pub fn age(&self, now: Timestamp) -> chrono::Duration {
        now.signed_duration_since(self.created_at)
    }
}

/// Build the on-disk name for a unit of `kind` created at `created_at`.
pub fn unit_name(kind: PoolKind, created_at: Timestamp) -> String {
    format!(
        "{}-{}{}",
        kind.unit_prefix(),
        created_at.format(NAME_TIMESTAMP_FORMAT),
        kind.unit_suffix()
    )
}

/// Recover the creation timestamp from a unit name.
///
/// Returns `None` for anything that is not a unit of `kind` (sidecars,
/// partial downloads, foreign files).
pub fn parse_unit_name(kind: PoolKind, name: &str) -> Option<Timestamp> {
    let rest = name
        .strip_prefix(kind.unit_prefix())?
        .strip_prefix('-')?
        .strip_suffix(kind.unit_suffix())?;
    if rest.len() != NAME_TIMESTAMP_LEN {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(rest, NAME_TIMESTAMP_FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Sort units newest first. Ties cannot occur within a pool because names
/// embed the timestamp, but the id breaks them deterministically anyway.
pub fn sort_newest_first(units: &mut [BackupUnit]) {
    units.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
}

/// The head: the most recently created unit.
pub fn head(units: &[BackupUnit]) -> Option<&BackupUnit> {
    units
        .iter()
        .max_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))
}
