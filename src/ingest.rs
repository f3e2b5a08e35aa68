//! Snapshot ingestion.
//!
//! A pass scans the ingest directory, keeps the snapshot files newer than
//! the store's high-water mark, and commits each one (oldest first) as a
//! single transaction. A pass that commits nothing is a no-op, reported to
//! the alert notifier as "no new snapshots".
//!
//! A failing file aborts the pass. Files committed before it stay
//! committed, and the next pass resumes after them because the high-water
//! mark has advanced.
//!
//! With `full`, the high-water mark is ignored and every file whose
//! timestamp is not yet in the ledger is ingested, which picks up files
//! that arrived out of order.

use anyhow::{Context, Result};
use outage_tracker_core::error::Error;
use outage_tracker_core::geometry::validate_polygon;
use outage_tracker_core::store::GeometryStore;
use std::time::Duration;

use crate::alert::{create_notifier, notify_best_effort, Alert};
use crate::config::{Config, IngestConfig};
use crate::db;
use crate::display::format_timestamp;
use crate::snapshot::{read_snapshot, scan_snapshots, SnapshotFile};
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Copy, Default)]
pub struct PassOptions {
    pub full: bool,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default)]
pub struct PassReport {
    /// Files matching the include globs.
    pub seen: usize,
    /// Matching files with no timestamp in their name.
    pub unparseable: usize,
    /// Files already covered by the store.
    pub skipped: usize,
    /// Files committed (or, for a dry run, that would be).
    pub ingested: Vec<SnapshotFile>,
    pub records_written: usize,
    pub high_water_before: Option<i64>,
    pub high_water_after: Option<i64>,
}

#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Ingested(PassReport),
    NoOp(PassReport),
    DryRun(PassReport),
}

impl IngestOutcome {
    pub fn report(&self) -> &PassReport {
        match self {
            IngestOutcome::Ingested(r) | IngestOutcome::NoOp(r) | IngestOutcome::DryRun(r) => r,
        }
    }
}

/// Run one ingestion pass against `store`.
pub async fn run_pass(
    store: &SqliteStore,
    ingest: &IngestConfig,
    options: PassOptions,
) -> Result<IngestOutcome> {
    let high_water = store.latest_timestamp().await?;
    let scan = scan_snapshots(ingest)?;

    for name in &scan.unparseable {
        tracing::warn!(file = %name, "skipping snapshot file without a timestamp in its name");
    }

    let mut report = PassReport {
        seen: scan.files.len() + scan.unparseable.len(),
        unparseable: scan.unparseable.len(),
        high_water_before: high_water,
        high_water_after: high_water,
        ..PassReport::default()
    };

    let mut pending: Vec<SnapshotFile> = Vec::new();
    for file in scan.files {
        let covered = if options.full {
            store.has_timestamp(file.timestamp).await?
        } else {
            high_water.is_some_and(|hwm| file.timestamp <= hwm)
        };
        let repeated = pending.last().is_some_and(|p| p.timestamp == file.timestamp);
        if repeated {
            tracing::warn!(file = %file.name, timestamp = file.timestamp, "skipping second file for the same timestamp");
        }
        if covered || repeated {
            report.skipped += 1;
        } else {
            pending.push(file);
        }
    }

    if options.dry_run {
        report.ingested = pending;
        return Ok(IngestOutcome::DryRun(report));
    }

    for file in pending {
        let written = ingest_file(store, &file)
            .await
            .with_context(|| {
                format!(
                    "ingest pass aborted at {} after {} file(s)",
                    file.name,
                    report.ingested.len()
                )
            })?;
        tracing::info!(file = %file.name, timestamp = file.timestamp, records = written, "snapshot committed");
        report.records_written += written;
        report.high_water_after = report.high_water_after.max(Some(file.timestamp));
        report.ingested.push(file);
    }

    if report.ingested.is_empty() {
        Ok(IngestOutcome::NoOp(report))
    } else {
        Ok(IngestOutcome::Ingested(report))
    }
}

async fn ingest_file(store: &SqliteStore, file: &SnapshotFile) -> Result<usize, Error> {
    let polygons = read_snapshot(&file.path, &file.name)?;
    for (i, polygon) in polygons.iter().enumerate() {
        validate_polygon(polygon)
            .map_err(|e| Error::decode(&file.name, format!("polygon {}: {}", i, e)))?;
    }
    store
        .append_snapshot(file.timestamp, Some(&file.name), &polygons)
        .await
}

/// `otrack ingest`: one pass, summary on stdout.
pub async fn run_ingest(config: &Config, full: bool, dry_run: bool) -> Result<()> {
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);

    let result = run_pass(&store, &config.ingest, PassOptions { full, dry_run }).await;
    store.close().await;
    let outcome = result?;
    let report = outcome.report();
    let offset = config.display.utc_offset_hours;

    match &outcome {
        IngestOutcome::DryRun(_) => {
            println!("ingest (dry-run)");
            for file in &report.ingested {
                println!("  would ingest: {} ({})", file.name, format_timestamp(file.timestamp, offset));
            }
        }
        _ => println!("ingest"),
    }
    println!("  files seen: {}", report.seen);
    if report.unparseable > 0 {
        println!("  unparseable names: {}", report.unparseable);
    }
    println!("  skipped: {}", report.skipped);
    println!("  ingested: {}", report.ingested.len());
    if !matches!(outcome, IngestOutcome::DryRun(_)) {
        println!("  records written: {}", report.records_written);
    }
    println!(
        "  high-water mark: {} -> {}",
        display_mark(report.high_water_before),
        display_mark(report.high_water_after)
    );
    match outcome {
        IngestOutcome::NoOp(_) => println!("no new snapshots"),
        _ => println!("ok"),
    }
    Ok(())
}

fn display_mark(mark: Option<i64>) -> String {
    mark.map(|m| m.to_string()).unwrap_or_else(|| "none".to_string())
}

/// `otrack watch`: pass, sleep, repeat until Ctrl-C.
pub async fn run_watch(config: &Config, once: bool) -> Result<()> {
    let notifier = create_notifier(&config.alerts)?;
    let pool = db::connect(config).await?;
    let store = SqliteStore::new(pool);
    let interval = Duration::from_secs(config.ingest.interval_secs);

    tracing::info!(
        directory = %config.ingest.directory.display(),
        interval_secs = config.ingest.interval_secs,
        alerts = notifier.name(),
        "watching for snapshots"
    );

    loop {
        match run_pass(&store, &config.ingest, PassOptions::default()).await {
            Ok(IngestOutcome::Ingested(report)) => tracing::info!(
                files = report.ingested.len(),
                records = report.records_written,
                high_water = ?report.high_water_after,
                "ingest pass complete"
            ),
            Ok(IngestOutcome::NoOp(report)) => {
                tracing::info!(seen = report.seen, high_water = ?report.high_water_after, "no new snapshots");
                let alert = Alert::no_new_snapshots(config.ingest.interval_secs);
                notify_best_effort(notifier.as_ref(), &alert).await;
            }
            Ok(IngestOutcome::DryRun(_)) => {}
            Err(e) => {
                let message = format!("{:#}", e);
                tracing::error!(error = %message, "ingest pass failed");
                let alert = Alert::failure(message);
                notify_best_effort(notifier.as_ref(), &alert).await;
            }
        }

        if once {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted, stopping watch");
                break;
            }
        }
    }

    store.close().await;
    Ok(())
}
