//! Snapshot creator: a new point-in-time copy when the head is old enough.

use chrono::Duration;
use tierkeep_core::pool::{SourceSpec, StoragePool};
use tierkeep_core::report::CreationOutcome;
use tierkeep_core::snapshot::{snapshot_decision, SnapshotDecision};
use tierkeep_core::types::Timestamp;
use tierkeep_store::{CopyRequest, CopyResult, EventAction};

use crate::services::Services;
use crate::{event, Journal};

pub struct SnapshotCreator<'a> {
    services: &'a Services,
    dry_run: bool,
}

impl<'a> SnapshotCreator<'a> {
    pub fn new(services: &'a Services, dry_run: bool) -> Self {
        Self { services, dry_run }
    }

    /// Create a full or incremental snapshot if one is due.
    ///
    /// Calling this again within `min_interval` is a no-op. When the copy
    /// fails the partially written unit is removed so it can never become a
    /// base.
    pub async fn maybe_create_snapshot(
        &self,
        pool: &StoragePool,
        source: &SourceSpec,
        min_interval: Duration,
        now: Timestamp,
        journal: &mut Journal,
    ) -> CreationOutcome {
        let units = match self.services.units.list(pool).await {
            Ok(units) => units,
            Err(e) => {
                tracing::error!(pool = %pool.id, error = %e, "Cannot list units before snapshot");
                return CreationOutcome::Failed {
                    unit_id: None,
                    error: e.to_string(),
                };
            }
        };

        let (name, base) = match snapshot_decision(&units, min_interval, now) {
            SnapshotDecision::NotDue { head, next_due } => {
                tracing::debug!(pool = %pool.id, head = %head, %next_due, "Snapshot not due");
                return CreationOutcome::NotDue { head, next_due };
            }
            SnapshotDecision::Full { name } => (name, None),
            SnapshotDecision::Incremental { name, base } => (name, Some(base)),
        };

        if self.dry_run {
            tracing::info!(pool = %pool.id, unit = %name, base = ?base, "Would create snapshot");
            return CreationOutcome::WouldCreate { unit_id: name, base };
        }

        let copied = match self.copy(pool, source, &name, base.as_deref()).await {
            Ok(copied) => copied,
            Err(error) => {
                tracing::error!(pool = %pool.id, unit = %name, error = %error, "Snapshot failed");
                if let Err(e) = self.services.units.remove(pool, &name).await {
                    tracing::warn!(
                        pool = %pool.id,
                        unit = %name,
                        error = %e,
                        "Failed to remove partial snapshot"
                    );
                }
                journal.push(event(now, &pool.id, &name, EventAction::Create, Err(error.clone())));
                return CreationOutcome::Failed {
                    unit_id: Some(name),
                    error,
                };
            }
        };

        let size_bytes = self.finish(pool, &name, base.as_deref(), &copied).await;
        tracing::info!(pool = %pool.id, unit = %name, base = ?base, size_bytes, "Created snapshot");
        journal.push(event(now, &pool.id, &name, EventAction::Create, Ok(size_bytes)));
        CreationOutcome::Created {
            unit_id: name,
            base,
            size_bytes,
        }
    }

    async fn copy(
        &self,
        pool: &StoragePool,
        source: &SourceSpec,
        name: &str,
        base: Option<&str>,
    ) -> Result<CopyResult, String> {
        let units = &self.services.units;
        let dest = units.unit_path(pool, name).map_err(|e| e.to_string())?;
        let link_dest = base
            .map(|b| units.unit_path(pool, b))
            .transpose()
            .map_err(|e| e.to_string())?;

        let request = CopyRequest {
            source: source.path.clone(),
            dest,
            link_dest,
            excludes: source.excludes.clone(),
        };
        let copied = self.services.copier.copy(&request).await.map_err(|e| e.to_string())?;
        tracing::debug!(
            pool = %pool.id,
            unit = %name,
            bytes_transferred = ?copied.bytes_transferred,
            duration_ms = copied.duration_ms,
            "Copy finished"
        );
        Ok(copied)
    }

    /// Record the base and size of a finished copy. The snapshot is complete
    /// at this point, so a failure here is logged and never undoes it.
    async fn finish(
        &self,
        pool: &StoragePool,
        name: &str,
        base: Option<&str>,
        copied: &CopyResult,
    ) -> u64 {
        let units = &self.services.units;
        if let Some(base) = base {
            if let Err(e) = units.record_base(pool, name, base).await {
                tracing::warn!(
                    pool = %pool.id,
                    unit = %name,
                    base = %base,
                    error = %e,
                    "Failed to record snapshot base"
                );
            }
        }
        match units.unit_size(pool, name).await {
            Ok(size) => size,
            Err(e) => {
                tracing::warn!(
                    pool = %pool.id,
                    unit = %name,
                    error = %e,
                    "Could not size new snapshot"
                );
                copied.bytes_transferred.unwrap_or(0)
            }
        }
    }
}
