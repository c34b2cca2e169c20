//! Text and JSON rendering of reports and the effective config.

use std::fmt::Write;

use serde::Serialize;
use tierkeep_core::config::ResolvedConfig;
use tierkeep_core::policy::RetentionWindow;
use tierkeep_core::pool::{CreationPolicy, PoolKind, StoragePool};
use tierkeep_core::report::{CreationOutcome, HealthReport, PoolOutcome, RetentionReport};
use tierkeep_core::size::format_bytes;
use tierkeep_core::tier::CleanupTier;

use crate::OutputFormat;

// ---------------------------------------------------------------------------
// Health report
// ---------------------------------------------------------------------------

pub fn render_health(report: &HealthReport, format: OutputFormat) -> serde_json::Result<String> {
    match format {
        OutputFormat::Json => serde_json::to_string_pretty(report),
        OutputFormat::Text => Ok(health_text(report)),
    }
}

fn health_text(report: &HealthReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Run {}{} -- {:?}, exit {}",
        report.run_id,
        if report.dry_run { " (dry run)" } else { "" },
        report.severity(),
        report.exit_code()
    );
    for outcome in &report.pools {
        out.push_str(&outcome_text(outcome));
    }
    let verb = if report.dry_run { "Would reclaim" } else { "Reclaimed" };
    let planned: u64 = report
        .pools
        .iter()
        .filter_map(|p| match p {
            PoolOutcome::Completed(r) => Some(r.reclaimed_bytes()),
            PoolOutcome::Skipped { .. } => None,
        })
        .sum();
    let _ = writeln!(out, "{verb} {}", format_bytes(planned));
    if let Some(pending) = report.pending_repositories {
        let _ = writeln!(out, "Repositories with pending changes: {pending}");
    }
    out.trim_end().to_string()
}

fn outcome_text(outcome: &PoolOutcome) -> String {
    match outcome {
        PoolOutcome::Skipped {
            pool_id,
            reason,
            detail,
        } => format!("{pool_id}: SKIPPED {reason}: {detail}\n"),
        PoolOutcome::Completed(report) => pass_text(report),
    }
}

fn pass_text(r: &RetentionReport) -> String {
    let mut out = String::new();
    let tier = if r.tier == r.selected_tier {
        r.tier.to_string()
    } else {
        format!("{} (forced, space says {})", r.tier, r.selected_tier)
    };
    let _ = writeln!(
        out,
        "{} [{}] tier {}: {} deleted ({}), {} kept, {} of {} free{}{}",
        r.pool_id,
        r.kind,
        tier,
        r.deleted.len(),
        format_bytes(r.reclaimed_bytes()),
        r.preserved.len(),
        format_bytes(r.final_available),
        format_bytes(r.total_bytes),
        if r.stopped_early { ", stopped early" } else { "" },
        if r.cloud_mirror { ", cloud mirror" } else { "" },
    );
    for deleted in &r.deleted {
        let verb = if r.dry_run { "would delete" } else { "deleted" };
        let _ = writeln!(
            out,
            "  {verb} {} ({})",
            deleted.unit_id,
            format_bytes(deleted.reclaimed_bytes)
        );
    }
    for failure in &r.failures {
        let _ = writeln!(out, "  FAILED to delete {}: {}", failure.unit_id, failure.error);
    }
    if let Some(error) = &r.catalog_error {
        let _ = writeln!(out, "  FAILED to list units: {error}");
    }
    if let Some(creation) = &r.creation {
        let _ = writeln!(out, "  {}", creation_text(creation));
    }
    out
}

fn creation_text(outcome: &CreationOutcome) -> String {
    match outcome {
        CreationOutcome::Created {
            unit_id,
            base: Some(base),
            size_bytes,
        } => format!("created {unit_id} ({}) linked against {base}", format_bytes(*size_bytes)),
        CreationOutcome::Created {
            unit_id,
            base: None,
            size_bytes,
        } => format!("created {unit_id} ({})", format_bytes(*size_bytes)),
        CreationOutcome::WouldCreate { unit_id, .. } => format!("would create {unit_id}"),
        CreationOutcome::NotDue { head, next_due } => {
            format!("not due (head {head}, next at {})", next_due.format("%Y-%m-%d %H:%M UTC"))
        }
        CreationOutcome::AlreadySatisfied { period_key, .. } => {
            format!("archive for {period_key} already exists")
        }
        CreationOutcome::OutsideWindow { period_key } => {
            format!("outside the archive window for {period_key}")
        }
        CreationOutcome::Failed {
            unit_id: Some(unit_id),
            error,
        } => format!("FAILED to create {unit_id}: {error}"),
        CreationOutcome::Failed {
            unit_id: None,
            error,
        } => format!("FAILED to create unit: {error}"),
    }
}

// ---------------------------------------------------------------------------
// Last reports
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct LastReport<'a> {
    pool_id: &'a str,
    last: Option<&'a PoolOutcome>,
}

pub fn render_last_reports(
    reports: &[(String, Option<PoolOutcome>)],
    format: OutputFormat,
) -> serde_json::Result<String> {
    match format {
        OutputFormat::Json => {
            let rows: Vec<LastReport<'_>> = reports
                .iter()
                .map(|(pool_id, last)| LastReport {
                    pool_id,
                    last: last.as_ref(),
                })
                .collect();
            serde_json::to_string_pretty(&rows)
        }
        OutputFormat::Text => {
            let mut out = String::new();
            for (pool_id, last) in reports {
                match last {
                    Some(outcome) => out.push_str(&outcome_text(outcome)),
                    None => {
                        let _ = writeln!(out, "{pool_id}: never run");
                    }
                }
            }
            Ok(out.trim_end().to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Effective config
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct PolicyRow {
    kind: PoolKind,
    tier: CleanupTier,
    window: RetentionWindow,
}

#[derive(Serialize)]
struct EffectiveConfig<'a> {
    pools: &'a [StoragePool],
    retention: Vec<PolicyRow>,
    repositories: &'a [std::path::PathBuf],
    monthly_window_days: u32,
}

pub fn render_config(config: &ResolvedConfig, format: OutputFormat) -> serde_json::Result<String> {
    let kinds: Vec<PoolKind> = config.pools.iter().map(|p| p.kind).collect();
    let rows: Vec<PolicyRow> = config
        .policy
        .rows()
        .filter(|(kind, _, _)| kinds.contains(kind))
        .map(|(kind, tier, window)| PolicyRow { kind, tier, window })
        .collect();

    match format {
        OutputFormat::Json => serde_json::to_string_pretty(&EffectiveConfig {
            pools: &config.pools,
            retention: rows,
            repositories: &config.repositories,
            monthly_window_days: config.monthly_window_days,
        }),
        OutputFormat::Text => {
            let mut out = String::from("Configuration OK\n\nPools:\n");
            for pool in &config.pools {
                let _ = writeln!(
                    out,
                    "  {} [{}] {} (warning below {}, critical below {}){}",
                    pool.id,
                    pool.kind,
                    pool.root.display(),
                    format_bytes(pool.warning_threshold),
                    format_bytes(pool.critical_threshold),
                    creation_summary(pool.creation.as_ref()),
                );
            }
            out.push_str("\nRetention windows:\n");
            let _ = writeln!(
                out,
                "  {:<16} {:>10} {:>10} {:>10} {:>10}",
                "kind", "normal", "moderate", "aggressive", "critical"
            );
            let mut seen: Vec<PoolKind> = Vec::new();
            for kind in kinds {
                if seen.contains(&kind) {
                    continue;
                }
                seen.push(kind);
                let cells: Vec<String> = CleanupTier::ALL
                    .iter()
                    .map(|tier| {
                        config
                            .policy
                            .window_for(kind, *tier)
                            .map(|w| w.to_string())
                            .unwrap_or_else(|_| "-".into())
                    })
                    .collect();
                let _ = writeln!(
                    out,
                    "  {:<16} {:>10} {:>10} {:>10} {:>10}",
                    kind.name(),
                    cells[0],
                    cells[1],
                    cells[2],
                    cells[3]
                );
            }
            Ok(out.trim_end().to_string())
        }
    }
}

fn creation_summary(creation: Option<&CreationPolicy>) -> String {
    match creation {
        None => String::new(),
        Some(CreationPolicy::Snapshot {
            source,
            min_interval,
        }) => format!(
            ", snapshots of {} every {}",
            source.path.display(),
            tierkeep_core::policy::format_duration(*min_interval)
        ),
        Some(CreationPolicy::Archive { source, period }) => {
            format!(", {period} archives of {}", source.path.display())
        }
    }
}
