//! Database statistics and health overview.
//!
//! A quick summary of what has been ingested: committed snapshots, stored
//! outage polygons, and the covered time range. Used by `otrack stats` to
//! confirm the watch loop is keeping up.

use anyhow::Result;
use outage_tracker_core::store::GeometryStore;

use crate::config::Config;
use crate::db;
use crate::display::format_timestamp;
use crate::sqlite_store::SqliteStore;

pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let result = store.stats().await;
    store.close().await;
    let stats = result?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);
    let offset = config.display.utc_offset_hours;
    let show = |ts: Option<i64>| match ts {
        Some(ts) => format!("{} ({})", format_timestamp(ts, offset), format_ts_relative(ts)),
        None => "never".to_string(),
    };

    println!("Outage Tracker — Database Stats");
    println!("===============================");
    println!();
    println!("  Database:   {}", config.db.path.display());
    println!("  Size:       {}", format_bytes(db_size));
    println!();
    println!("  Snapshots:  {}", stats.snapshots);
    println!("  Polygons:   {}", stats.records);
    println!("  First:      {}", show(stats.first_timestamp));
    println!("  Latest:     {}", show(stats.last_timestamp));
    println!();

    Ok(())
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let delta = chrono::Utc::now().timestamp() - ts;
    if delta < 0 {
        return "in the future".to_string();
    }
    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    }
}
