//! Retention policy: a lookup table from (pool kind, tier) to the oldest a
//! unit may get before it becomes a deletion candidate.
//!
//! The table is configuration. Missing entries are caught by
//! [`RetentionPolicy::validate`] at startup, never discovered mid-run.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Serialize, Serializer};

use crate::error::CoreError;
use crate::pool::PoolKind;
use crate::tier::CleanupTier;

// ---------------------------------------------------------------------------
// Retention window
// ---------------------------------------------------------------------------

/// How long a non-head unit may survive under a given tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionWindow {
    MaxAge(Duration),
    /// Only the head survives.
    HeadOnly,
}

impl RetentionWindow {
    /// Whether a (non-head) unit of the given age has outlived the window.
    pub fn is_expired(&self, age: Duration) -> bool {
        match self {
            Self::MaxAge(max) => age > *max,
            Self::HeadOnly => true,
        }
    }

    /// Effective maximum age; `HeadOnly` counts as zero.
    pub fn max_age(&self) -> Duration {
        match self {
            Self::MaxAge(max) => *max,
            Self::HeadOnly => Duration::zero(),
        }
    }
}

impl fmt::Display for RetentionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HeadOnly => f.write_str("head"),
            Self::MaxAge(d) => f.write_str(&format_duration(*d)),
        }
    }
}

impl FromStr for RetentionWindow {
    type Err = CoreError;

    /// `"head"` (or `"0"`) for head-only, otherwise a duration like `"12h"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("head") || s == "0" {
            return Ok(Self::HeadOnly);
        }
        let d = parse_duration(s)?;
        if d.is_zero() {
            Ok(Self::HeadOnly)
        } else {
            Ok(Self::MaxAge(d))
        }
    }
}

impl Serialize for RetentionWindow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

/// Parse `"90s"`, `"45m"`, `"12h"`, `"30d"`, `"2w"`.
pub fn parse_duration(input: &str) -> Result<Duration, CoreError> {
    let s = input.trim();
    let invalid = || {
        CoreError::Validation(format!(
            "Invalid duration '{input}'. Use a number followed by s, m, h, d or w"
        ))
    };
    let unit = s.chars().last().ok_or_else(invalid)?;
    let value: i64 = s[..s.len() - unit.len_utf8()].parse().map_err(|_| invalid())?;
    if value < 0 {
        return Err(invalid());
    }
    let duration = match unit {
        's' => Duration::try_seconds(value),
        'm' => Duration::try_minutes(value),
        'h' => Duration::try_hours(value),
        'd' => Duration::try_days(value),
        'w' => Duration::try_weeks(value),
        _ => None,
    };
    duration.ok_or_else(invalid)
}

/// Render a duration in the largest unit that divides it exactly.
pub fn format_duration(d: Duration) -> String {
    let secs = d.num_seconds();
    if secs != 0 && secs % (7 * 86_400) == 0 {
        format!("{}w", secs / (7 * 86_400))
    } else if secs != 0 && secs % 86_400 == 0 {
        format!("{}d", secs / 86_400)
    } else if secs != 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs != 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{secs}s")
    }
}

// ---------------------------------------------------------------------------
// Policy table
// ---------------------------------------------------------------------------

/// Explicit (kind, tier) → window table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    windows: BTreeMap<(PoolKind, CleanupTier), RetentionWindow>,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        use CleanupTier::*;
        use RetentionWindow::*;

        let h = Duration::hours;
        let d = Duration::days;

        // Columns: normal, moderate, aggressive, critical.
        let rows: [(PoolKind, [RetentionWindow; 4]); 5] = [
            (
                PoolKind::Snapshot,
                [MaxAge(h(24)), MaxAge(h(12)), MaxAge(h(6)), HeadOnly],
            ),
            (
                PoolKind::WeeklyArchive,
                [MaxAge(d(28)), MaxAge(d(21)), MaxAge(d(14)), MaxAge(d(7))],
            ),
            (
                PoolKind::MonthlyArchive,
                [MaxAge(d(180)), MaxAge(d(120)), MaxAge(d(90)), MaxAge(d(30))],
            ),
            (
                PoolKind::Mirror,
                [MaxAge(d(7)), MaxAge(d(3)), MaxAge(d(1)), HeadOnly],
            ),
            (
                PoolKind::SystemBackup,
                [MaxAge(d(30)), MaxAge(d(14)), MaxAge(d(7)), HeadOnly],
            ),
        ];

        let tiers = [Normal, Moderate, Aggressive, Critical];
        let mut policy = Self::empty();
        for (kind, windows) in rows {
            for (tier, window) in tiers.into_iter().zip(windows) {
                policy.set(kind, tier, window);
            }
        }
        policy
    }
}

impl RetentionPolicy {
    /// A table with no entries. Only useful as a starting point for `set`.
    pub fn empty() -> Self {
        Self {
            windows: BTreeMap::new(),
        }
    }

    pub fn set(&mut self, kind: PoolKind, tier: CleanupTier, window: RetentionWindow) {
        self.windows.insert((kind, tier), window);
    }

    /// Look up the window for a pool kind under a tier.
    pub fn window_for(
        &self,
        kind: PoolKind,
        tier: CleanupTier,
    ) -> Result<RetentionWindow, CoreError> {
        self.windows.get(&(kind, tier)).copied().ok_or_else(|| {
            CoreError::PolicyMisconfigured(format!("No retention window for {kind} at tier {tier}"))
        })
    }

    /// Every configured kind must have all four tiers, and windows must not
    /// grow as the tier rises.
    pub fn validate(&self, kinds: impl IntoIterator<Item = PoolKind>) -> Result<(), CoreError> {
        for kind in kinds {
            let mut previous: Option<(CleanupTier, RetentionWindow)> = None;
            for tier in CleanupTier::ALL {
                let window = self.window_for(kind, tier)?;
                if let Some((prev_tier, prev_window)) = previous {
                    if window.max_age() > prev_window.max_age() {
                        return Err(CoreError::PolicyMisconfigured(format!(
                            "{kind}: window at {tier} ({window}) is longer than at {prev_tier} ({prev_window})"
                        )));
                    }
                }
                previous = Some((tier, window));
            }
        }
        Ok(())
    }

    /// Rows of the table, for `check-config` output.
    pub fn rows(&self) -> impl Iterator<Item = (PoolKind, CleanupTier, RetentionWindow)> + '_ {
        self.windows.iter().map(|(&(kind, tier), &window)| (kind, tier, window))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
