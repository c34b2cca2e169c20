//! Cleanup executor: applies one tier's retention window to one pool.

use tierkeep_core::cleanup::plan_cleanup;
use tierkeep_core::policy::RetentionPolicy;
use tierkeep_core::pool::{SpaceUsage, StoragePool};
use tierkeep_core::report::{DeletedUnit, FailedDeletion, RetentionReport};
use tierkeep_core::tier::{relief_threshold, CleanupTier};
use tierkeep_core::types::Timestamp;
use tierkeep_store::EventAction;

use crate::services::Services;
use crate::{event, Journal};

pub struct CleanupExecutor<'a> {
    services: &'a Services,
    policy: &'a RetentionPolicy,
    dry_run: bool,
}

impl<'a> CleanupExecutor<'a> {
    pub fn new(services: &'a Services, policy: &'a RetentionPolicy, dry_run: bool) -> Self {
        Self {
            services,
            policy,
            dry_run,
        }
    }

    /// Delete expired units oldest first, never the head.
    ///
    /// Each candidate is sized right before it goes, so the reclaimed bytes
    /// reflect what it alone holds once earlier deletions have released
    /// their hard links. Retained units are never walked.
    ///
    /// Above `Normal`, space is re-measured after every deletion and the
    /// pass stops once the tier's relief threshold is reached. When space
    /// was already above that threshold (an operator-forced tier), every
    /// expired unit is purged. Deletion failures are recorded and skipped.
    pub async fn clean(
        &self,
        pool: &StoragePool,
        tier: CleanupTier,
        usage: SpaceUsage,
        now: Timestamp,
        journal: &mut Journal,
    ) -> RetentionReport {
        let mut report = RetentionReport {
            pool_id: pool.id.clone(),
            kind: pool.kind,
            selected_tier: tier,
            tier,
            dry_run: self.dry_run,
            units_considered: 0,
            deleted: Vec::new(),
            preserved: Vec::new(),
            failures: Vec::new(),
            stopped_early: false,
            catalog_error: None,
            available_before: usage.available_bytes,
            final_available: usage.available_bytes,
            total_bytes: usage.total_bytes,
            cloud_mirror: pool.cloud_mirror,
            creation: None,
        };

        let window = match self.policy.window_for(pool.kind, tier) {
            Ok(window) => window,
            Err(e) => {
                tracing::error!(pool = %pool.id, tier = %tier, error = %e, "No retention window");
                report.catalog_error = Some(e.to_string());
                return report;
            }
        };

        let units = match self.services.units.list(pool).await {
            Ok(units) => units,
            Err(e) => {
                tracing::error!(
                    pool = %pool.id,
                    error = %e,
                    "Failed to list units; nothing deleted"
                );
                report.catalog_error = Some(e.to_string());
                return report;
            }
        };

        let plan = plan_cleanup(&units, window, now);
        report.units_considered = plan.units_considered();
        report.preserved = plan.retained.iter().map(|u| u.id.clone()).collect();

        tracing::info!(
            pool = %pool.id,
            tier = %tier,
            window = %window,
            units = report.units_considered,
            candidates = plan.candidates.len(),
            dry_run = self.dry_run,
            "Cleaning pool"
        );

        let relief = relief_threshold(tier, pool.warning_threshold, pool.critical_threshold)
            .filter(|threshold| usage.available_bytes < *threshold);

        let mut candidates = plan.candidates.into_iter();
        while let Some(unit) = candidates.next() {
            let reclaimed_bytes = self.reclaimable_bytes(pool, &unit.id).await;
            let deleted = DeletedUnit {
                unit_id: unit.id.clone(),
                created_at: unit.created_at,
                reclaimed_bytes,
            };

            if self.dry_run {
                tracing::info!(
                    pool = %pool.id,
                    unit = %unit.id,
                    reclaimed_bytes,
                    "Would delete unit"
                );
                report.deleted.push(deleted);
                continue;
            }

            match self.services.units.remove(pool, &unit.id).await {
                Ok(()) => {
                    tracing::info!(
                        pool = %pool.id,
                        unit = %unit.id,
                        reclaimed_bytes,
                        "Deleted unit"
                    );
                    journal.push(event(
                        now,
                        &pool.id,
                        &unit.id,
                        EventAction::Delete,
                        Ok(reclaimed_bytes),
                    ));
                    report.deleted.push(deleted);
                }
                Err(e) => {
                    tracing::warn!(
                        pool = %pool.id,
                        unit = %unit.id,
                        error = %e,
                        "Failed to delete unit"
                    );
                    journal.push(event(
                        now,
                        &pool.id,
                        &unit.id,
                        EventAction::Delete,
                        Err(e.to_string()),
                    ));
                    report.failures.push(FailedDeletion {
                        unit_id: unit.id.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            }

            let Some(threshold) = relief else {
                continue;
            };
            match self.services.space.measure(pool).await {
                Ok(current) => {
                    report.final_available = current.available_bytes;
                    if current.available_bytes >= threshold {
                        report.stopped_early = true;
                        report.preserved.extend(candidates.by_ref().map(|u| u.id));
                        tracing::info!(
                            pool = %pool.id,
                            available_bytes = current.available_bytes,
                            threshold,
                            "Space recovered; stopping early"
                        );
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(pool = %pool.id, error = %e, "Re-measure failed; continuing");
                }
            }
        }

        if !self.dry_run && !report.deleted.is_empty() && !report.stopped_early {
            match self.services.space.measure(pool).await {
                Ok(current) => report.final_available = current.available_bytes,
                Err(e) => {
                    tracing::warn!(pool = %pool.id, error = %e, "Final measurement failed");
                    report.final_available = report
                        .available_before
                        .saturating_add(report.reclaimed_bytes());
                }
            }
        }

        report
    }

    /// What deleting `unit_id` frees. A unit that cannot be sized is still
    /// deleted and counted as zero.
    async fn reclaimable_bytes(&self, pool: &StoragePool, unit_id: &str) -> u64 {
        match self.services.units.unit_size(pool, unit_id).await {
            Ok(size) => size,
            Err(e) => {
                tracing::warn!(pool = %pool.id, unit = %unit_id, error = %e, "Could not size unit");
                0
            }
        }
    }
}
