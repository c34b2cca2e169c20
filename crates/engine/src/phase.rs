//! Tracks one pool's progress through a pass.

use tierkeep_core::phase::PassPhase;

#[derive(Debug)]
pub struct PhaseTracker {
    pool_id: String,
    phase: PassPhase,
}

impl PhaseTracker {
    pub fn new(pool_id: &str) -> Self {
        Self {
            pool_id: pool_id.to_string(),
            phase: PassPhase::Idle,
        }
    }

    pub fn phase(&self) -> PassPhase {
        self.phase
    }

    /// Move to `to`. An invalid transition is a bug in the pass; it is
    /// logged and the tracker follows anyway.
    pub fn advance(&mut self, to: PassPhase) {
        if let Err(e) = self.phase.validate_transition(to) {
            tracing::error!(pool = %self.pool_id, error = %e, "Pass phase out of order");
        }
        tracing::debug!(pool = %self.pool_id, from = ?self.phase, to = ?to, "Pass phase");
        self.phase = to;
    }
}
