mod common;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use chrono::Duration as Age;
use tierkeep_core::pool::{PoolKind, StoragePool};
use tierkeep_core::report::{HealthReport, PoolOutcome, RetentionReport, SkipReason};
use tierkeep_core::tier::CleanupTier;
use tierkeep_engine::{load_last_reports, EngineOptions, Orchestrator};
use tierkeep_store::EventAction;
use tokio_util::sync::CancellationToken;

use common::*;

fn completed(outcome: &PoolOutcome) -> &RetentionReport {
    match outcome {
        PoolOutcome::Completed(report) => report,
        other => panic!("expected a completed pass, got {other:?}"),
    }
}

/// Add one unit per age (in hours), each `GB` in size; returns ids in the
/// same order.
fn seed(h: &Harness, pool: &StoragePool, ages_hours: &[i64]) -> Vec<String> {
    ages_hours
        .iter()
        .map(|hours| h.storage.add_unit(pool, now() - Age::hours(*hours), GB))
        .collect()
}

async fn run(h: &Harness, pools: Vec<StoragePool>, options: EngineOptions) -> HealthReport {
    Orchestrator::new(config(pools), h.services.clone(), options)
        .expect("valid options")
        .run(CancellationToken::new())
        .await
}

// ---------------------------------------------------------------------------
// Cleanup scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn normal_tier_purges_units_older_than_a_day() {
    let h = Harness::new();
    let p = pool("snapshots", PoolKind::Snapshot, None);
    h.storage.add_pool(&p, 500 * GB, 100 * GB);
    let ids = seed(&h, &p, &[1, 5, 13, 25, 30]);

    let report = run(&h, vec![p], EngineOptions::default()).await;

    assert_eq!(report.exit_code(), 0);
    let pass = completed(&report.pools[0]);
    assert_eq!(pass.tier, CleanupTier::Normal);
    assert_eq!(pass.units_considered, 5);
    let deleted: Vec<_> = pass.deleted.iter().map(|d| d.unit_id.clone()).collect();
    assert_eq!(deleted, [ids[4].clone(), ids[3].clone()]);
    assert_eq!(pass.preserved, ids[..3].to_vec());
    assert!(!pass.stopped_early);
    assert_eq!(pass.reclaimed_bytes(), 2 * GB);
    assert_eq!(pass.final_available, 102 * GB);
    assert_eq!(h.storage.unit_ids("snapshots"), ids[..3].to_vec());
}

#[tokio::test]
async fn only_deletion_candidates_are_sized() {
    let h = Harness::new();
    let p = pool("snapshots", PoolKind::Snapshot, None);
    h.storage.add_pool(&p, 500 * GB, 100 * GB);
    let ids = seed(&h, &p, &[1, 5, 13, 25, 30]);

    run(&h, vec![p], EngineOptions::default()).await;

    assert_eq!(h.storage.sized_units(), [ids[4].clone(), ids[3].clone()]);
}

#[tokio::test]
async fn nothing_expired_means_nothing_is_sized() {
    let h = Harness::new();
    let p = pool("snapshots", PoolKind::Snapshot, None);
    h.storage.add_pool(&p, 500 * GB, 100 * GB);
    seed(&h, &p, &[1, 2, 3]);

    let report = run(&h, vec![p], EngineOptions::default()).await;

    assert!(completed(&report.pools[0]).deleted.is_empty());
    assert!(h.storage.sized_units().is_empty());
}

#[tokio::test]
async fn critical_tier_with_only_the_head_deletes_nothing() {
    let h = Harness::new();
    let p = pool("snapshots", PoolKind::Snapshot, None);
    h.storage.add_pool(&p, 500 * GB, 5 * GB);
    let ids = seed(&h, &p, &[48]);

    let report = run(&h, vec![p], EngineOptions::default()).await;

    let pass = completed(&report.pools[0]);
    assert_eq!(pass.tier, CleanupTier::Critical);
    assert!(pass.deleted.is_empty());
    assert_eq!(pass.preserved, ids);
    assert_eq!(h.storage.unit_ids("snapshots"), ids);
}

#[tokio::test]
async fn critical_tier_stops_once_space_recovers() {
    let h = Harness::new();
    let p = pool("snapshots", PoolKind::Snapshot, None);
    h.storage.add_pool(&p, 500 * GB, 9 * GB + GB / 2);
    let ids = seed(&h, &p, &[1, 2, 3, 4]);

    let report = run(&h, vec![p], EngineOptions::default()).await;

    let pass = completed(&report.pools[0]);
    assert_eq!(pass.tier, CleanupTier::Critical);
    assert!(pass.stopped_early);
    assert_eq!(pass.deleted.len(), 1);
    assert_eq!(pass.deleted[0].unit_id, ids[3]);
    assert_eq!(pass.final_available, 10 * GB + GB / 2);
    for kept in &ids[..3] {
        assert!(pass.preserved.contains(kept));
    }
    assert_eq!(h.storage.unit_ids("snapshots").len(), 3);
}

#[tokio::test]
async fn moderate_tier_stops_at_the_warning_threshold() {
    let h = Harness::new();
    let p = pool("snapshots", PoolKind::Snapshot, None);
    h.storage.add_pool(&p, 500 * GB, 49 * GB);
    let ids = seed(&h, &p, &[1, 13, 20, 30]);

    let report = run(&h, vec![p], EngineOptions::default()).await;

    let pass = completed(&report.pools[0]);
    assert_eq!(pass.tier, CleanupTier::Moderate);
    assert!(pass.stopped_early);
    assert_eq!(pass.deleted.len(), 1);
    assert_eq!(pass.deleted[0].unit_id, ids[3]);
    assert_eq!(h.storage.unit_ids("snapshots"), ids[..3].to_vec());
}

#[tokio::test]
async fn override_escalates_but_never_takes_the_head() {
    let h = Harness::new();
    let p = pool("snapshots", PoolKind::Snapshot, None);
    h.storage.add_pool(&p, 500 * GB, 100 * GB);
    let ids = seed(&h, &p, &[30, 40, 50]);

    let options = EngineOptions {
        tier_override: Some(CleanupTier::Critical),
        ..EngineOptions::default()
    };
    let report = run(&h, vec![p], options).await;

    let pass = completed(&report.pools[0]);
    assert_eq!(pass.selected_tier, CleanupTier::Normal);
    assert_eq!(pass.tier, CleanupTier::Critical);
    assert!(!pass.stopped_early);
    assert_eq!(pass.deleted.len(), 2);
    assert_eq!(h.storage.unit_ids("snapshots"), vec![ids[0].clone()]);
}

#[tokio::test]
async fn failed_deletion_is_recorded_and_the_pass_continues() {
    let h = Harness::new();
    let p = pool("snapshots", PoolKind::Snapshot, None);
    h.storage.add_pool(&p, 500 * GB, 100 * GB);
    let ids = seed(&h, &p, &[1, 25, 30]);
    h.storage.fail_delete("snapshots", &ids[2]);

    let report = run(&h, vec![p], EngineOptions::default()).await;

    assert_eq!(report.exit_code(), 1);
    let pass = completed(&report.pools[0]);
    assert_eq!(pass.failures.len(), 1);
    assert_eq!(pass.failures[0].unit_id, ids[2]);
    assert_eq!(pass.deleted.len(), 1);
    assert_eq!(pass.deleted[0].unit_id, ids[1]);
}

#[tokio::test]
async fn catalog_failure_deletes_nothing() {
    let h = Harness::new();
    let p = pool("snapshots", PoolKind::Snapshot, None);
    h.storage.add_pool(&p, 500 * GB, 100 * GB);
    seed(&h, &p, &[1, 25, 30]);
    h.storage.fail_listing("snapshots");

    let report = run(&h, vec![p], EngineOptions::default()).await;

    assert_eq!(report.exit_code(), 1);
    let pass = completed(&report.pools[0]);
    assert!(pass.catalog_error.is_some());
    assert!(pass.deleted.is_empty());
    assert_eq!(h.storage.unit_ids("snapshots").len(), 3);
}

#[tokio::test]
async fn dry_run_plans_without_touching_anything() {
    let h = Harness::new();
    let p = pool("snapshots", PoolKind::Snapshot, None);
    h.storage.add_pool(&p, 500 * GB, 100 * GB);
    seed(&h, &p, &[1, 5, 13, 25, 30]);

    let options = EngineOptions {
        dry_run: true,
        ..EngineOptions::default()
    };
    let report = run(&h, vec![p], options).await;

    assert!(report.dry_run);
    let pass = completed(&report.pools[0]);
    assert!(pass.dry_run);
    assert_eq!(pass.deleted.len(), 2);
    assert_eq!(report.total_reclaimed_bytes(), 0);
    assert_eq!(h.storage.unit_ids("snapshots").len(), 5);
    assert_eq!(h.storage.available("snapshots"), 100 * GB);
    assert!(h.services.state.read_report("snapshots").await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Run-level behaviour
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unavailable_pool_is_skipped_while_others_complete() {
    let h = Harness::new();
    let usb = pool("usb", PoolKind::Mirror, None);
    let local = pool("snapshots", PoolKind::Snapshot, None);
    h.storage.add_pool(&usb, 500 * GB, 100 * GB);
    h.storage.add_pool(&local, 500 * GB, 100 * GB);
    seed(&h, &local, &[1, 30]);
    h.storage.set_unavailable("usb");

    let report = run(&h, vec![usb, local], EngineOptions::default()).await;

    assert_eq!(report.pools.len(), 2);
    assert_matches!(
        &report.pools[0],
        PoolOutcome::Skipped { pool_id, reason: SkipReason::PoolUnavailable, .. }
            if pool_id == "usb"
    );
    assert_eq!(completed(&report.pools[1]).deleted.len(), 1);
    assert_eq!(report.exit_code(), 2);
}

#[tokio::test]
async fn busy_pool_lock_skips_the_pool() {
    let h = Harness::new();
    let p = pool("snapshots", PoolKind::Snapshot, None);
    h.storage.add_pool(&p, 500 * GB, 100 * GB);
    seed(&h, &p, &[1, 30]);
    let _held = h
        .services
        .state
        .lock_pool("snapshots", Duration::from_millis(10))
        .await
        .expect("lock");

    let options = EngineOptions {
        lock_timeout: Duration::from_millis(50),
        ..EngineOptions::default()
    };
    let report = run(&h, vec![p], options).await;

    assert_matches!(
        &report.pools[0],
        PoolOutcome::Skipped { reason: SkipReason::LockTimeout, .. }
    );
    assert_eq!(report.exit_code(), 1);
    assert_eq!(h.storage.unit_ids("snapshots").len(), 2);
}

#[tokio::test]
async fn busy_pool_keeps_its_last_stored_report() {
    let h = Harness::new();
    let p = pool("snapshots", PoolKind::Snapshot, None);
    h.storage.add_pool(&p, 500 * GB, 100 * GB);
    seed(&h, &p, &[1, 30]);

    run(&h, vec![p.clone()], EngineOptions::default()).await;
    let _held = h
        .services
        .state
        .lock_pool("snapshots", Duration::from_millis(10))
        .await
        .expect("lock");
    let options = EngineOptions {
        lock_timeout: Duration::from_millis(20),
        ..EngineOptions::default()
    };
    let second = run(&h, vec![p.clone()], options).await;

    assert_matches!(
        &second.pools[0],
        PoolOutcome::Skipped { reason: SkipReason::LockTimeout, .. }
    );
    let last = load_last_reports(&h.services.state, &[p]).await.unwrap();
    assert_matches!(
        &last[0],
        (_, Some(PoolOutcome::Completed(r))) if r.deleted.len() == 1
    );
}

#[tokio::test]
async fn unavailable_pool_replaces_its_last_stored_report() {
    let h = Harness::new();
    let p = pool("usb", PoolKind::Mirror, None);
    h.storage.add_pool(&p, 500 * GB, 100 * GB);

    run(&h, vec![p.clone()], EngineOptions::default()).await;
    h.storage.set_unavailable("usb");
    run(&h, vec![p.clone()], EngineOptions::default()).await;

    let last = load_last_reports(&h.services.state, &[p]).await.unwrap();
    assert_matches!(
        &last[0],
        (_, Some(PoolOutcome::Skipped { reason: SkipReason::PoolUnavailable, .. }))
    );
}

#[tokio::test]
async fn cancelled_run_skips_every_pool() {
    let h = Harness::new();
    let a = pool("a", PoolKind::Snapshot, None);
    let b = pool("b", PoolKind::Mirror, None);
    h.storage.add_pool(&a, 500 * GB, 100 * GB);
    h.storage.add_pool(&b, 500 * GB, 100 * GB);

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = Orchestrator::new(config(vec![a, b]), h.services.clone(), EngineOptions::default())
        .unwrap()
        .run(cancel)
        .await;

    assert!(report
        .pools
        .iter()
        .all(|p| matches!(p, PoolOutcome::Skipped { reason: SkipReason::Cancelled, .. })));
    assert_eq!(report.exit_code(), 1);
}

#[tokio::test]
async fn parallel_pools_report_in_configured_order() {
    let h = Harness::new();
    let pools: Vec<_> = ["a", "b", "c"]
        .iter()
        .map(|id| pool(id, PoolKind::Snapshot, None))
        .collect();
    for p in &pools {
        h.storage.add_pool(p, 500 * GB, 100 * GB);
        seed(&h, p, &[1, 30]);
    }

    let options = EngineOptions {
        max_parallel_pools: 4,
        ..EngineOptions::default()
    };
    let report = run(&h, pools, options).await;

    let ids: Vec<_> = report.pools.iter().map(PoolOutcome::pool_id).collect();
    assert_eq!(ids, ["a", "b", "c"]);
    assert!(report.pools.iter().all(|p| completed(p).deleted.len() == 1));
}

#[tokio::test]
async fn pool_filter_limits_the_run() {
    let h = Harness::new();
    let a = pool("a", PoolKind::Snapshot, None);
    let b = pool("b", PoolKind::Mirror, None);
    h.storage.add_pool(&a, 500 * GB, 100 * GB);
    h.storage.add_pool(&b, 500 * GB, 100 * GB);

    let options = EngineOptions {
        pools: vec!["b".into()],
        ..EngineOptions::default()
    };
    let report = run(&h, vec![a.clone(), b.clone()], options).await;
    assert_eq!(report.pools.len(), 1);
    assert_eq!(report.pools[0].pool_id(), "b");

    let unknown = EngineOptions {
        pools: vec!["nope".into()],
        ..EngineOptions::default()
    };
    assert!(Orchestrator::new(config(vec![a, b]), h.services.clone(), unknown).is_err());
}

#[tokio::test]
async fn outcomes_and_events_are_persisted() {
    let h = Harness::new();
    let p = pool("snapshots", PoolKind::Snapshot, None);
    h.storage.add_pool(&p, 500 * GB, 100 * GB);
    seed(&h, &p, &[1, 25, 30]);

    run(&h, vec![p.clone()], EngineOptions::default()).await;

    let events = h.services.state.events().read_all().await.unwrap();
    assert_eq!(events.len(), 2);
    assert!(events
        .iter()
        .all(|e| e.action == EventAction::Delete && e.success && e.pool_id == "snapshots"));

    let last = load_last_reports(&h.services.state, &[p]).await.unwrap();
    assert_eq!(last.len(), 1);
    assert_matches!(
        &last[0],
        (id, Some(PoolOutcome::Completed(r))) if id == "snapshots" && r.deleted.len() == 2
    );
}

#[tokio::test]
async fn pending_repositories_are_counted() {
    let mut h = Harness::new();
    h.services.probe = Arc::new(StaticProbe(true));
    let p = pool("snapshots", PoolKind::Snapshot, None);
    h.storage.add_pool(&p, 500 * GB, 100 * GB);

    let mut cfg = config(vec![p]);
    cfg.repositories = vec![PathBuf::from("/home/me/thesis"), PathBuf::from("/home/me/code")];
    let report = Orchestrator::new(cfg, h.services.clone(), EngineOptions::default())
        .unwrap()
        .run(CancellationToken::new())
        .await;

    assert_eq!(report.pending_repositories, Some(2));

    let snapshots = pool("snapshots", PoolKind::Snapshot, None);
    let quiet = run(&h, vec![snapshots], EngineOptions::default()).await;
    assert_eq!(quiet.pending_repositories, None);
}
