//! Archive scheduler: at most one compressed archive per calendar period.

use tierkeep_core::archive::{archive_decision, ArchiveDecision, Period};
use tierkeep_core::pool::{SourceSpec, StoragePool};
use tierkeep_core::report::CreationOutcome;
use tierkeep_core::types::Timestamp;
use tierkeep_store::{ArchiveRequest, EventAction};

use crate::services::Services;
use crate::{event, Journal};

pub struct ArchiveScheduler<'a> {
    services: &'a Services,
    monthly_window_days: u32,
    dry_run: bool,
}

impl<'a> ArchiveScheduler<'a> {
    pub fn new(services: &'a Services, monthly_window_days: u32, dry_run: bool) -> Self {
        Self {
            services,
            monthly_window_days,
            dry_run,
        }
    }

    /// Create this period's archive unless a unit or the pool's marker
    /// already covers it.
    pub async fn maybe_create_archive(
        &self,
        pool: &StoragePool,
        source: &SourceSpec,
        period: Period,
        now: Timestamp,
        journal: &mut Journal,
    ) -> CreationOutcome {
        let units = match self.services.units.list(pool).await {
            Ok(units) => units,
            Err(e) => {
                tracing::error!(pool = %pool.id, error = %e, "Cannot list units before archive");
                return CreationOutcome::Failed {
                    unit_id: None,
                    error: e.to_string(),
                };
            }
        };

        let marker = match self.services.state.read_marker(&pool.id).await {
            Ok(marker) => marker,
            Err(e) => {
                tracing::warn!(
                    pool = %pool.id,
                    error = %e,
                    "Unreadable period marker; ignoring it"
                );
                None
            }
        };

        let (key, name) = match archive_decision(
            period,
            &units,
            marker.as_ref(),
            now,
            self.monthly_window_days,
        ) {
            ArchiveDecision::AlreadySatisfied { key, unit } => {
                tracing::debug!(
                    pool = %pool.id,
                    period = %key,
                    unit = ?unit,
                    "Archive already exists for period"
                );
                return CreationOutcome::AlreadySatisfied {
                    period_key: key,
                    unit_id: unit,
                };
            }
            ArchiveDecision::OutsideWindow { key } => {
                tracing::debug!(pool = %pool.id, period = %key, "Outside monthly archive window");
                return CreationOutcome::OutsideWindow { period_key: key };
            }
            ArchiveDecision::Due { key, name } => (key, name),
        };

        if self.dry_run {
            tracing::info!(pool = %pool.id, period = %key, unit = %name, "Would create archive");
            return CreationOutcome::WouldCreate {
                unit_id: name,
                base: None,
            };
        }

        let dest = match self.services.units.unit_path(pool, &name) {
            Ok(dest) => dest,
            Err(e) => {
                return CreationOutcome::Failed {
                    unit_id: Some(name),
                    error: e.to_string(),
                }
            }
        };
        let request = ArchiveRequest {
            source: source.path.clone(),
            dest,
            excludes: source.excludes.clone(),
        };

        match self.services.archiver.create(&request).await {
            Ok(result) => {
                tracing::info!(
                    pool = %pool.id,
                    period = %key,
                    unit = %name,
                    size_bytes = result.size_bytes,
                    entries = result.entries,
                    "Created archive"
                );
                if let Err(e) = self.services.state.write_marker(&pool.id, &key).await {
                    tracing::warn!(
                        pool = %pool.id,
                        period = %key,
                        error = %e,
                        "Failed to write period marker"
                    );
                }
                journal.push(event(
                    now,
                    &pool.id,
                    &name,
                    EventAction::Create,
                    Ok(result.size_bytes),
                ));
                CreationOutcome::Created {
                    unit_id: name,
                    base: None,
                    size_bytes: result.size_bytes,
                }
            }
            Err(e) => {
                tracing::error!(
                    pool = %pool.id,
                    period = %key,
                    unit = %name,
                    error = %e,
                    "Archive failed"
                );
                journal.push(event(now, &pool.id, &name, EventAction::Create, Err(e.to_string())));
                CreationOutcome::Failed {
                    unit_id: Some(name),
                    error: e.to_string(),
                }
            }
        }
    }
}
