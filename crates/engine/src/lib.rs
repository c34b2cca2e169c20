//! `tierkeep-engine`: the per-pool retention pass and the run
//! orchestrator.
//!
//! A run measures every pool, picks a cleanup tier from available space,
//! purges expired units (never the newest), then creates a snapshot or
//! periodic archive where the pool has a creation policy. Pools are
//! independent; one failing never stops the others.

pub mod archive;
pub mod cleanup;
pub mod orchestrator;
pub mod phase;
pub mod services;
pub mod snapshot;

pub use archive::ArchiveScheduler;
pub use cleanup::CleanupExecutor;
pub use orchestrator::{load_last_reports, EngineOptions, Orchestrator};
pub use services::Services;
pub use snapshot::SnapshotCreator;

/// Events recorded while processing one pool, written out by the
/// orchestrator after every pool task has finished.
pub type Journal = Vec<tierkeep_store::EventRecord>;

pub(crate) fn event(
    at: tierkeep_core::types::Timestamp,
    pool_id: &str,
    unit_id: &str,
    action: tierkeep_store::EventAction,
    outcome: Result<u64, String>,
) -> tierkeep_store::EventRecord {
    let (success, bytes, detail) = match outcome {
        Ok(bytes) => (true, bytes, None),
        Err(detail) => (false, 0, Some(detail)),
    };
    tierkeep_store::EventRecord {
        at,
        pool_id: pool_id.to_string(),
        unit_id: unit_id.to_string(),
        action,
        success,
        bytes,
        detail,
    }
}
