//! Deletion planning for a single pool.
//!
//! The plan is pure: it splits a catalog listing into the head, the units
//! that survive, and the deletion candidates in the order they should be
//! removed. The engine executes it and decides when to stop early.

use serde::Serialize;

use crate::policy::RetentionWindow;
use crate::types::Timestamp;
use crate::unit::{sort_newest_first, BackupUnit};

#[derive(Debug, Clone, Serialize)]
pub struct CleanupPlan {
    pub window: RetentionWindow,
    /// Most recent unit; never a candidate.
    pub head: Option<BackupUnit>,
    /// Units past the window, oldest first.
    pub candidates: Vec<BackupUnit>,
    /// Units within the window (head included), newest first.
    pub retained: Vec<BackupUnit>,
}

impl CleanupPlan {
    pub fn units_considered(&self) -> usize {
        self.candidates.len() + self.retained.len()
    }
}

/// Split `units` (any order) into candidates and survivors under `window`.
///
/// The head is always retained, even when it is itself past the window.
pub fn plan_cleanup(units: &[BackupUnit], window: RetentionWindow, now: Timestamp) -> CleanupPlan {
    let mut ordered = units.to_vec();
    sort_newest_first(&mut ordered);

    let mut iter = ordered.into_iter();
    let head = iter.next();

    let mut retained: Vec<BackupUnit> = head.iter().cloned().collect();
    let mut candidates = Vec::new();
    for unit in iter {
        if window.is_expired(unit.age(now)) {
            candidates.push(unit);
        } else {
            retained.push(unit);
        }
    }
    candidates.reverse();

    CleanupPlan {
        window,
        head,
        candidates,
        retained,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
