//! Run orchestrator: fans out one pass per pool, then assembles the health
//! report.
//!
//! Each pool runs as its own task under the per-pool lock. At most
//! `max_parallel_pools` passes are in flight. Cancellation is honoured
//! between pools only; a pass that has started runs to completion. After
//! every task has finished, this module alone persists last reports and
//! appends the collected events, so pool tasks share no mutable state. A
//! pool skipped for a busy lock or cancellation keeps its previous stored
//! report.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tierkeep_core::config::ResolvedConfig;
use tierkeep_core::error::CoreError;
use tierkeep_core::phase::PassPhase;
use tierkeep_core::pool::{CreationPolicy, StoragePool};
use tierkeep_core::report::{HealthReport, PoolOutcome, SkipReason};
use tierkeep_core::tier::{effective_tier, select_tier, CleanupTier};
use tierkeep_store::{count_pending, StateDir, StoreError};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::archive::ArchiveScheduler;
use crate::cleanup::CleanupExecutor;
use crate::phase::PhaseTracker;
use crate::services::Services;
use crate::snapshot::SnapshotCreator;
use crate::Journal;

/// How long to wait for another run to release a pool.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Plan and report without deleting or creating anything.
    pub dry_run: bool,
    /// Operator-forced tier; only ever escalates.
    pub tier_override: Option<CleanupTier>,
    /// Restrict the run to these pool ids. Empty means every pool.
    pub pools: Vec<String>,
    pub max_parallel_pools: usize,
    pub lock_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            tier_override: None,
            pools: Vec::new(),
            max_parallel_pools: 1,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

#[derive(Clone)]
pub struct Orchestrator {
    config: Arc<ResolvedConfig>,
    services: Services,
    options: EngineOptions,
}

impl Orchestrator {
    /// Fails when the pool filter names a pool that is not configured.
    pub fn new(
        config: ResolvedConfig,
        services: Services,
        options: EngineOptions,
    ) -> Result<Self, CoreError> {
        let known: HashSet<&str> = config.pools.iter().map(|p| p.id.as_str()).collect();
        if let Some(unknown) = options.pools.iter().find(|id| !known.contains(id.as_str())) {
            return Err(CoreError::Validation(format!("Unknown pool '{unknown}'")));
        }
        Ok(Self {
            config: Arc::new(config),
            services,
            options,
        })
    }

    /// Pools this run will process, in configured order.
    pub fn selected_pools(&self) -> Vec<StoragePool> {
        self.config
            .pools
            .iter()
            .filter(|p| self.options.pools.is_empty() || self.options.pools.contains(&p.id))
            .cloned()
            .collect()
    }

    pub async fn run(&self, cancel: CancellationToken) -> HealthReport {
        let run_id = Uuid::now_v7();
        let started_at = self.services.clock.now();
        let pools = self.selected_pools();

        tracing::info!(
            %run_id,
            pools = pools.len(),
            dry_run = self.options.dry_run,
            tier_override = ?self.options.tier_override,
            max_parallel_pools = self.options.max_parallel_pools,
            "Starting retention run"
        );

        let semaphore = Arc::new(Semaphore::new(self.options.max_parallel_pools.max(1)));
        let mut tasks = JoinSet::new();
        for (index, pool) in pools.iter().cloned().enumerate() {
            let this = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let mut journal = Journal::new();
                let outcome = if cancel.is_cancelled() {
                    tracing::info!(pool = %pool.id, "Run cancelled; skipping pool");
                    skipped(&pool, SkipReason::Cancelled, "run cancelled before pool started")
                } else {
                    this.run_pool(&pool, &mut journal).await
                };
                (index, outcome, journal)
            });
        }

        let mut outcomes: Vec<Option<PoolOutcome>> = vec![None; pools.len()];
        let mut journals: Vec<Journal> = vec![Journal::new(); pools.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, outcome, journal)) => {
                    outcomes[index] = Some(outcome);
                    journals[index] = journal;
                }
                Err(e) => tracing::error!(error = %e, "Pool task failed"),
            }
        }

        let outcomes: Vec<PoolOutcome> = outcomes
            .into_iter()
            .zip(&pools)
            .map(|(outcome, pool)| {
                outcome.unwrap_or_else(|| {
                    skipped(pool, SkipReason::TaskFailed, "pool task ended without an outcome")
                })
            })
            .collect();

        if !self.options.dry_run {
            self.persist(&outcomes, journals).await;
        }

        let pending_repositories = if self.config.repositories.is_empty() {
            None
        } else {
            Some(count_pending(self.services.probe.as_ref(), &self.config.repositories).await)
        };

        let report = HealthReport {
            run_id,
            started_at,
            finished_at: self.services.clock.now(),
            dry_run: self.options.dry_run,
            pools: outcomes,
            pending_repositories,
        };

        tracing::info!(
            %run_id,
            severity = ?report.severity(),
            reclaimed_bytes = report.total_reclaimed_bytes(),
            "Retention run finished"
        );
        report
    }

    /// One pool's pass: lock, measure, clean, create.
    async fn run_pool(&self, pool: &StoragePool, journal: &mut Journal) -> PoolOutcome {
        let mut phase = PhaseTracker::new(&pool.id);

        let _lock = match self
            .services
            .state
            .lock_pool(&pool.id, self.options.lock_timeout)
            .await
        {
            Ok(lock) => lock,
            Err(e) => {
                let reason = match e {
                    StoreError::LockTimeout { .. } => SkipReason::LockTimeout,
                    _ => SkipReason::TaskFailed,
                };
                tracing::warn!(pool = %pool.id, error = %e, "Could not lock pool; skipping");
                return skipped(pool, reason, e);
            }
        };

        phase.advance(PassPhase::Measuring);
        let usage = match self.services.space.measure(pool).await {
            Ok(usage) => usage,
            Err(e) => {
                let reason = match e {
                    StoreError::PoolUnavailable { .. } => SkipReason::PoolUnavailable,
                    _ => SkipReason::MeasurementFailed,
                };
                tracing::warn!(pool = %pool.id, error = %e, "Skipping pool");
                phase.advance(PassPhase::Reporting);
                phase.advance(PassPhase::Idle);
                return skipped(pool, reason, e);
            }
        };

        let selected = select_tier(
            usage.available_bytes,
            pool.warning_threshold,
            pool.critical_threshold,
        );
        let tier = effective_tier(selected, self.options.tier_override);

        phase.advance(PassPhase::Cleaning);
        let now = self.services.clock.now();
        let executor =
            CleanupExecutor::new(&self.services, &self.config.policy, self.options.dry_run);
        let mut report = executor.clean(pool, tier, usage, now, journal).await;
        report.selected_tier = selected;

        if let Some(creation) = &pool.creation {
            phase.advance(PassPhase::Creating);
            let now = self.services.clock.now();
            let outcome = match creation {
                CreationPolicy::Snapshot {
                    source,
                    min_interval,
                } => {
                    SnapshotCreator::new(&self.services, self.options.dry_run)
                        .maybe_create_snapshot(pool, source, *min_interval, now, journal)
                        .await
                }
                CreationPolicy::Archive { source, period } => {
                    ArchiveScheduler::new(
                        &self.services,
                        self.config.monthly_window_days,
                        self.options.dry_run,
                    )
                    .maybe_create_archive(pool, source, *period, now, journal)
                    .await
                }
            };
            report.creation = Some(outcome);
        }

        phase.advance(PassPhase::Reporting);
        tracing::info!(
            pool = %pool.id,
            tier = %report.tier,
            deleted = report.deleted.len(),
            failures = report.failures.len(),
            reclaimed_bytes = report.reclaimed_bytes(),
            final_available = report.final_available,
            stopped_early = report.stopped_early,
            "Pool pass complete"
        );
        phase.advance(PassPhase::Idle);

        PoolOutcome::Completed(report)
    }

    async fn persist(&self, outcomes: &[PoolOutcome], journals: Vec<Journal>) {
        let state = &self.services.state;
        for outcome in outcomes.iter().filter(|o| o.replaces_last_report()) {
            if let Err(e) = state.write_report(outcome).await {
                tracing::warn!(
                    pool = %outcome.pool_id(),
                    error = %e,
                    "Failed to store last report"
                );
            }
        }
        for record in journals.iter().flatten() {
            if let Err(e) = state.events().append(record).await {
                tracing::warn!(
                    pool = %record.pool_id,
                    unit = %record.unit_id,
                    error = %e,
                    "Failed to append event"
                );
            }
        }
    }
}

/// Last stored outcome for each pool, in the given order. `None` for pools
/// that have never been processed.
pub async fn load_last_reports(
    state: &StateDir,
    pools: &[StoragePool],
) -> Result<Vec<(String, Option<PoolOutcome>)>, StoreError> {
    let mut reports = Vec::with_capacity(pools.len());
    for pool in pools {
        reports.push((pool.id.clone(), state.read_report(&pool.id).await?));
    }
    Ok(reports)
}

fn skipped(pool: &StoragePool, reason: SkipReason, detail: impl ToString) -> PoolOutcome {
    PoolOutcome::Skipped {
        pool_id: pool.id.clone(),
        reason,
        detail: detail.to_string(),
    }
}
