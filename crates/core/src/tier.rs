//! Cleanup tiers and the tier selector.
//!
//! Automatic selection is a strict escalation on available space:
//! below critical is `Critical`, below warning is `Moderate`, otherwise
//! `Normal`. `Aggressive` is the operator's emergency tier and is only
//! reached through an explicit override.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Severity of a cleanup pass. Each tier is at least as permissive of
/// deletion as the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CleanupTier {
    Normal,
    Moderate,
    Aggressive,
    Critical,
}

impl CleanupTier {
    pub const ALL: [CleanupTier; 4] = [
        CleanupTier::Normal,
        CleanupTier::Moderate,
        CleanupTier::Aggressive,
        CleanupTier::Critical,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Moderate => "moderate",
            Self::Aggressive => "aggressive",
            Self::Critical => "critical",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|tier| tier.name() == name.to_ascii_lowercase())
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Unknown cleanup tier '{name}'. Must be one of: normal, moderate, aggressive, critical"
                ))
            })
    }
}

impl std::fmt::Display for CleanupTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for CleanupTier {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s)
    }
}

/// Map available space onto a tier using the pool's thresholds.
pub fn select_tier(available: u64, warning_threshold: u64, critical_threshold: u64) -> CleanupTier {
    if available < critical_threshold {
        CleanupTier::Critical
    } else if available < warning_threshold {
        CleanupTier::Moderate
    } else {
        CleanupTier::Normal
    }
}

/// Combine the selected tier with an operator override. The override can
/// only escalate; it never relaxes what space pressure already demands.
pub fn effective_tier(selected: CleanupTier, override_tier: Option<CleanupTier>) -> CleanupTier {
    override_tier.map_or(selected, |forced| forced.max(selected))
}

/// Available space at which a pressure-driven pass may stop deleting.
///
/// `Normal` has no relief threshold: it purges every expired unit.
pub fn relief_threshold(
    tier: CleanupTier,
    warning_threshold: u64,
    critical_threshold: u64,
) -> Option<u64> {
    match tier {
        CleanupTier::Normal => None,
        CleanupTier::Moderate | CleanupTier::Aggressive => Some(warning_threshold),
        CleanupTier::Critical => Some(critical_threshold),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const WARN: u64 = 100;
    const CRIT: u64 = 20;

    #[test]
    fn plenty_of_space_is_normal() {
        assert_eq!(select_tier(500, WARN, CRIT), CleanupTier::Normal);
        assert_eq!(select_tier(WARN, WARN, CRIT), CleanupTier::Normal);
    }

    #[test]
    fn below_warning_is_moderate() {
        assert_eq!(select_tier(WARN - 1, WARN, CRIT), CleanupTier::Moderate);
        assert_eq!(select_tier(CRIT, WARN, CRIT), CleanupTier::Moderate);
    }

    #[test]
    fn below_critical_is_critical() {
        assert_eq!(select_tier(CRIT - 1, WARN, CRIT), CleanupTier::Critical);
        assert_eq!(select_tier(0, WARN, CRIT), CleanupTier::Critical);
    }

    #[test]
    fn tiers_are_ordered() {
        assert!(CleanupTier::Normal < CleanupTier::Moderate);
        assert!(CleanupTier::Moderate < CleanupTier::Aggressive);
        assert!(CleanupTier::Aggressive < CleanupTier::Critical);
    }

    #[test]
    fn override_only_escalates() {
        use CleanupTier::*;
        assert_eq!(effective_tier(Normal, None), Normal);
        assert_eq!(effective_tier(Normal, Some(Aggressive)), Aggressive);
        assert_eq!(effective_tier(Critical, Some(Aggressive)), Critical);
        assert_eq!(effective_tier(Moderate, Some(Normal)), Moderate);
    }

    #[test]
    fn relief_thresholds() {
        assert_eq!(relief_threshold(CleanupTier::Normal, WARN, CRIT), None);
        assert_eq!(relief_threshold(CleanupTier::Moderate, WARN, CRIT), Some(WARN));
        assert_eq!(relief_threshold(CleanupTier::Aggressive, WARN, CRIT), Some(WARN));
        assert_eq!(relief_threshold(CleanupTier::Critical, WARN, CRIT), Some(CRIT));
    }

    #[test]
    fn tier_names_parse() {
        assert_eq!("aggressive".parse::<CleanupTier>().unwrap(), CleanupTier::Aggressive);
        assert_eq!("CRITICAL".parse::<CleanupTier>().unwrap(), CleanupTier::Critical);
        assert!("extreme".parse::<CleanupTier>().is_err());
    }

    proptest! {
        #[test]
        fn selection_is_monotone_in_scarcity(
            critical in 0u64..1_000_000,
            gap in 1u64..1_000_000,
            a in 0u64..3_000_000,
            b in 0u64..3_000_000,
        ) {
            let warning = critical + gap;
            let (less, more) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(
                select_tier(less, warning, critical) >= select_tier(more, warning, critical)
            );
        }
    }
}
