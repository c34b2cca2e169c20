//! Per-pool pass state machine.
//!
//! `Idle → Measuring → Cleaning → Creating → Reporting → Idle`. A pool that
//! cannot be measured goes straight from `Measuring` to `Reporting`; a pool
//! without a creation policy goes from `Cleaning` to `Reporting`.

use serde::Serialize;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PassPhase {
    Idle,
    Measuring,
    Cleaning,
    Creating,
    Reporting,
}

impl PassPhase {
    /// Phases reachable from `self`.
    pub fn valid_transitions(self) -> &'static [PassPhase] {
        use PassPhase::*;
        match self {
            Idle => &[Measuring],
            Measuring => &[Cleaning, Reporting],
            Cleaning => &[Creating, Reporting],
            Creating => &[Reporting],
            Reporting => &[Idle],
        }
    }

    pub fn can_transition(self, to: PassPhase) -> bool {
        self.valid_transitions().contains(&to)
    }

    /// Validate a transition, returning an error for invalid ones.
    pub fn validate_transition(self, to: PassPhase) -> Result<(), CoreError> {
        if self.can_transition(to) {
            Ok(())
        } else {
            Err(CoreError::Validation(format!(
                "Invalid pass transition: {self:?} -> {to:?}"
            )))
        }
    }
}
