//! Storage abstraction for the outage geometry series.
//!
//! The [`GeometryStore`] trait defines every operation the ingestion
//! pipeline and the read-side aggregations need, so the grid and episode
//! algorithms run unchanged against SQLite or the in-memory backend.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.
//!
//! # Invariants
//!
//! - A snapshot timestamp is committed at most once. Appending a timestamp
//!   that already exists fails with [`Error::StoreWrite`](crate::error::Error::StoreWrite)
//!   and writes nothing.
//! - A batch is atomic: readers see all of a snapshot's records or none.
//! - Records are never updated or deleted.

pub mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;
use geo::{Intersects, Point, Polygon};

use crate::error::Result;
use crate::geometry::BBox;
use crate::models::{AreaSample, GeometryRecord, JoinMode, StoreStats};

/// Abstract storage backend for outage geometries.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`append_geometries`](GeometryStore::append_geometries) | Commit one snapshot's polygons |
/// | [`latest_timestamp`](GeometryStore::latest_timestamp) | High-water mark |
/// | [`has_timestamp`](GeometryStore::has_timestamp) | Ledger lookup |
/// | [`distinct_timestamps`](GeometryStore::distinct_timestamps) | Ordered record timestamps |
/// | [`total_area_series`](GeometryStore::total_area_series) | Impacted area per timestamp |
/// | [`timestamps_covering`](GeometryStore::timestamps_covering) | Timestamps with an outage over a point |
/// | [`cell_outage_counts`](GeometryStore::cell_outage_counts) | Distinct outage timestamps per grid cell |
/// | [`geometries_at`](GeometryStore::geometries_at) | Decoded polygons for one timestamp |
/// | [`stats`](GeometryStore::stats) | Summary counts |
#[async_trait]
pub trait GeometryStore: Send + Sync {
    /// Insert one record per polygon, all sharing `timestamp`, in a single
    /// transaction. Returns the number of records written.
    async fn append_geometries(&self, timestamp: i64, polygons: &[Polygon<f64>]) -> Result<usize>;

    /// Latest committed snapshot timestamp, or `None` for an empty store.
    async fn latest_timestamp(&self) -> Result<Option<i64>>;

    /// Whether a snapshot with this timestamp has been committed.
    async fn has_timestamp(&self, timestamp: i64) -> Result<bool>;

    /// Every record timestamp, ascending and deduplicated.
    async fn distinct_timestamps(&self) -> Result<Vec<i64>>;

    /// Sum of polygon areas for each distinct record timestamp, ascending.
    async fn total_area_series(&self) -> Result<Vec<AreaSample>>;

    /// Timestamps at which at least one polygon intersects `point`
    /// (`x` = longitude, `y` = latitude), ascending and deduplicated.
    async fn timestamps_covering(&self, point: Point<f64>) -> Result<Vec<i64>>;

    /// For each cell, in input order, the number of distinct timestamps with
    /// at least one polygon related to the cell under `mode`.
    async fn cell_outage_counts(&self, cells: &[Polygon<f64>], mode: JoinMode) -> Result<Vec<u64>>;

    /// Decoded records captured at `timestamp`, in insertion order.
    async fn geometries_at(&self, timestamp: i64) -> Result<Vec<GeometryRecord>>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// A stored record narrowed by a bounding-box prefilter, waiting to be
/// joined against grid cells. `polygon` is only decoded for
/// [`JoinMode::Intersects`].
#[derive(Debug, Clone)]
pub struct JoinCandidate {
    pub timestamp: i64,
    pub bbox: BBox,
    pub polygon: Option<Polygon<f64>>,
}

/// Count, per cell, the distinct timestamps of `candidates` that relate to
/// the cell under `mode`. Shared by the backends.
pub fn count_distinct_per_cell(
    cells: &[Polygon<f64>],
    candidates: &[JoinCandidate],
    mode: JoinMode,
) -> Vec<u64> {
    cells
        .iter()
        .map(|cell| {
            let Some(cell_box) = BBox::from_polygon(cell) else {
                return 0;
            };
            let hits: BTreeSet<i64> = candidates
                .iter()
                .filter(|c| c.bbox.intersects(&cell_box))
                .filter(|c| match mode {
                    JoinMode::BoundingBox => true,
                    JoinMode::Intersects => c.polygon.as_ref().is_some_and(|p| p.intersects(cell)),
                })
                .map(|c| c.timestamp)
                .collect();
            hits.len() as u64
        })
        .collect()
}
