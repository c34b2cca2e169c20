//! Periodic archive scheduling.
//!
//! Archives are bucketed by period key (ISO week or calendar month). An
//! archive is due when nothing in the pool and nothing in the pool's marker
//! file already covers the current key. Existence is checked by key, never
//! by exact timestamp, so a second run within the same period is a no-op.

use std::fmt;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

use crate::pool::PoolKind;
use crate::types::Timestamp;
use crate::unit::{unit_name, BackupUnit};

/// Default number of days at the start of a month in which the monthly
/// archive may be produced.
pub const DEFAULT_MONTHLY_WINDOW_DAYS: u32 = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Weekly,
    Monthly,
}

impl Period {
    /// Pool kind holding archives of this period.
    pub fn pool_kind(self) -> PoolKind {
        match self {
            Self::Weekly => PoolKind::WeeklyArchive,
            Self::Monthly => PoolKind::MonthlyArchive,
        }
    }

    /// Calendar bucket containing `at`: `2026-W42` or `2026-10`.
    pub fn key_for(self, at: Timestamp) -> PeriodKey {
        match self {
            Self::Weekly => {
                let week = at.iso_week();
                PeriodKey(format!("{}-W{:02}", week.year(), week.week()))
            }
            Self::Monthly => PeriodKey(format!("{:04}-{:02}", at.year(), at.month())),
        }
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        })
    }
}

/// Identifier of a calendar bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeriodKey(pub String);

impl PeriodKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ArchiveDecision {
    Due {
        key: PeriodKey,
        name: String,
    },
    /// An archive for this period already exists. `unit` is `None` when
    /// only the marker file records it (e.g. the unit was since cleaned up).
    AlreadySatisfied {
        key: PeriodKey,
        unit: Option<String>,
    },
    /// Monthly archives are only produced early in the month.
    OutsideWindow {
        key: PeriodKey,
    },
}

/// Decide whether the archive for the current period still has to be made.
pub fn archive_decision(
    period: Period,
    units: &[BackupUnit],
    last_marker: Option<&PeriodKey>,
    now: Timestamp,
    monthly_window_days: u32,
) -> ArchiveDecision {
    let key = period.key_for(now);

    if let Some(existing) = units.iter().find(|u| period.key_for(u.created_at) == key) {
        return ArchiveDecision::AlreadySatisfied {
            key,
            unit: Some(existing.id.clone()),
        };
    }
    if last_marker == Some(&key) {
        return ArchiveDecision::AlreadySatisfied { key, unit: None };
    }
    if period == Period::Monthly && now.day() > monthly_window_days {
        return ArchiveDecision::OutsideWindow { key };
    }

    ArchiveDecision::Due {
        key,
        name: unit_name(period.pool_kind(), now),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
