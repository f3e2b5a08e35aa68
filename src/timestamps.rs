//! Snapshot history: the capture timestamps in the store, and the outage
//! polygons recorded at one of them.
//!
//! Used by the `otrack timestamps` / `otrack snapshot` CLI commands and by
//! `GET /timestamps` / `GET /snapshots/{timestamp}`.

use anyhow::{anyhow, Result};
use geo::Area;
use outage_tracker_core::feature::{snapshot_collection, FeatureCollection, OutageProperties};
use outage_tracker_core::geometry::BBox;
use outage_tracker_core::store::GeometryStore;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::db;
use crate::display::format_timestamp;
use crate::sqlite_store::SqliteStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampsResponse {
    /// Timestamps with at least one outage polygon, ascending.
    pub timestamps: Vec<i64>,
}

pub async fn list_timestamps<S: GeometryStore + ?Sized>(store: &S) -> Result<TimestampsResponse> {
    Ok(TimestampsResponse {
        timestamps: store.distinct_timestamps().await?,
    })
}

/// Outage polygons at `timestamp`, or `None` when no snapshot was
/// committed at that time. A committed snapshot without outages yields an
/// empty collection.
pub async fn snapshot_at<S: GeometryStore + ?Sized>(
    store: &S,
    timestamp: i64,
) -> Result<Option<FeatureCollection<OutageProperties>>> {
    if !store.has_timestamp(timestamp).await? {
        return Ok(None);
    }
    let records = store.geometries_at(timestamp).await?;
    Ok(Some(snapshot_collection(&records)))
}

pub async fn run_timestamps(config: &Config) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let result = list_timestamps(&store).await;
    store.close().await;
    let response = result?;

    let offset = config.display.utc_offset_hours;
    for ts in &response.timestamps {
        println!("{}  {}", ts, format_timestamp(*ts, offset));
    }
    println!("{} timestamps", response.timestamps.len());
    Ok(())
}

pub async fn run_snapshot(config: &Config, timestamp: i64, json: bool) -> Result<()> {
    let store = SqliteStore::new(db::connect(config).await?);
    let result = snapshot_at(&store, timestamp).await;
    store.close().await;
    let collection = result?.ok_or_else(|| anyhow!("snapshot not found: {}", timestamp))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&collection)?);
        return Ok(());
    }

    let polygons = collection
        .features
        .iter()
        .map(|f| f.geometry.to_polygon())
        .collect::<Result<Vec<_>, _>>()?;
    let area: f64 = polygons.iter().map(|p| p.unsigned_area()).sum();

    println!(
        "snapshot {} ({})",
        timestamp,
        format_timestamp(timestamp, config.display.utc_offset_hours)
    );
    println!("  polygons: {}", polygons.len());
    println!("  area:     {:.6} sq deg", area);
    if let Some(b) = BBox::covering(&polygons) {
        println!(
            "  extent:   {:.6}, {:.6} .. {:.6}, {:.6}",
            b.min_y, b.min_x, b.max_y, b.max_x
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;
    use outage_tracker_core::store::memory::InMemoryStore;

    #[tokio::test]
    async fn test_snapshot_at_distinguishes_missing_from_empty() {
        let store = InMemoryStore::new();
        let outage = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ];
        store.append_geometries(100, &[outage]).await.unwrap();
        store.append_geometries(200, &[]).await.unwrap();

        let found = snapshot_at(&store, 100).await.unwrap().unwrap();
        assert_eq!(found.features.len(), 1);
        let empty = snapshot_at(&store, 200).await.unwrap().unwrap();
        assert!(empty.features.is_empty());
        assert!(snapshot_at(&store, 300).await.unwrap().is_none());

        let listed = list_timestamps(&store).await.unwrap();
        assert_eq!(listed.timestamps, vec![100]);
    }
}
