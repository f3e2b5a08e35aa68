//! Core data models shared by the store backends and the read-side
//! aggregations.
//!
//! Timestamps are unix seconds (UTC) everywhere in the core; formatting for
//! display happens at the application edge.

use geo::Polygon;
use serde::{Deserialize, Serialize};

/// One row of the system-wide impacted-area series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AreaSample {
    pub timestamp: i64,
    /// Sum of polygon areas at `timestamp`, in square degrees.
    pub area: f64,
}

/// A stored polygon decoded back to full coordinates.
#[derive(Debug, Clone)]
pub struct GeometryRecord {
    pub id: i64,
    pub timestamp: i64,
    pub polygon: Polygon<f64>,
}

/// Spatial relationship used when joining grid cells against stored
/// outage polygons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinMode {
    /// Bounding boxes overlap (cheap, over-counts near cell edges).
    BoundingBox,
    /// Geometries truly intersect.
    Intersects,
}

impl JoinMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinMode::BoundingBox => "bounding_box",
            JoinMode::Intersects => "intersects",
        }
    }
}

/// Summary counts for a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreStats {
    pub snapshots: i64,
    pub records: i64,
    pub first_timestamp: Option<i64>,
    pub last_timestamp: Option<i64>,
}
