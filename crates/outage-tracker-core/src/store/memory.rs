//! In-memory [`GeometryStore`] implementation for tests and embedding.
//!
//! Records are kept in their encoded TWKB form and decoded on every read,
//! so precision loss and bounding-box prefiltering behave exactly as they
//! do in the SQLite backend.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use geo::{Area, Intersects, Point, Polygon};

use crate::error::{Error, Result};
use crate::geometry::{decode_polygon, BBox, EncodedPolygon};
use crate::models::{AreaSample, GeometryRecord, JoinMode, StoreStats};

use super::{count_distinct_per_cell, GeometryStore, JoinCandidate};

struct StoredRecord {
    id: i64,
    timestamp: i64,
    twkb: Vec<u8>,
    bbox: BBox,
}

impl StoredRecord {
    fn decode(&self) -> Result<Polygon<f64>> {
        decode_polygon(&self.twkb)
            .map_err(|e| Error::StoreQuery(format!("record {}: {}", self.id, e)))
    }
}

#[derive(Default)]
struct Inner {
    records: Vec<StoredRecord>,
    /// Committed snapshot timestamps, empty snapshots included.
    ledger: BTreeSet<i64>,
}

/// In-memory store.
#[derive(Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>> {
        self.inner
            .read()
            .map_err(|_| Error::StoreQuery("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>> {
        self.inner
            .write()
            .map_err(|_| Error::StoreWrite("store lock poisoned".to_string()))
    }
}

#[async_trait]
impl GeometryStore for InMemoryStore {
    async fn append_geometries(&self, timestamp: i64, polygons: &[Polygon<f64>]) -> Result<usize> {
        // Encode everything first so a bad polygon leaves the store untouched.
        let encoded = polygons
            .iter()
            .map(EncodedPolygon::encode)
            .collect::<Result<Vec<_>>>()
            .map_err(|e| Error::StoreWrite(format!("timestamp {}: {}", timestamp, e)))?;

        let mut inner = self.write()?;
        if inner.ledger.contains(&timestamp) {
            return Err(Error::StoreWrite(format!(
                "snapshot {} already committed",
                timestamp
            )));
        }

        let mut next_id = inner.records.last().map(|r| r.id + 1).unwrap_or(1);
        for e in encoded {
            inner.records.push(StoredRecord {
                id: next_id,
                timestamp,
                twkb: e.twkb,
                bbox: e.bbox,
            });
            next_id += 1;
        }
        inner.ledger.insert(timestamp);
        Ok(polygons.len())
    }

    async fn latest_timestamp(&self) -> Result<Option<i64>> {
        Ok(self.read()?.ledger.last().copied())
    }

    async fn has_timestamp(&self, timestamp: i64) -> Result<bool> {
        Ok(self.read()?.ledger.contains(&timestamp))
    }

    async fn distinct_timestamps(&self) -> Result<Vec<i64>> {
        let inner = self.read()?;
        let set: BTreeSet<i64> = inner.records.iter().map(|r| r.timestamp).collect();
        Ok(set.into_iter().collect())
    }

    async fn total_area_series(&self) -> Result<Vec<AreaSample>> {
        let inner = self.read()?;
        let mut sums: BTreeMap<i64, f64> = BTreeMap::new();
        for r in &inner.records {
            *sums.entry(r.timestamp).or_insert(0.0) += r.decode()?.unsigned_area();
        }
        Ok(sums
            .into_iter()
            .map(|(timestamp, area)| AreaSample { timestamp, area })
            .collect())
    }

    async fn timestamps_covering(&self, point: Point<f64>) -> Result<Vec<i64>> {
        let inner = self.read()?;
        let mut hits = BTreeSet::new();
        for r in inner
            .records
            .iter()
            .filter(|r| r.bbox.contains_point(point.x(), point.y()))
        {
            if r.decode()?.intersects(&point) {
                hits.insert(r.timestamp);
            }
        }
        Ok(hits.into_iter().collect())
    }

    async fn cell_outage_counts(&self, cells: &[Polygon<f64>], mode: JoinMode) -> Result<Vec<u64>> {
        let Some(region) = BBox::covering(cells) else {
            return Ok(vec![0; cells.len()]);
        };
        let inner = self.read()?;
        let candidates = inner
            .records
            .iter()
            .filter(|r| r.bbox.intersects(&region))
            .map(|r| {
                let polygon = match mode {
                    JoinMode::BoundingBox => None,
                    JoinMode::Intersects => Some(r.decode()?),
                };
                Ok(JoinCandidate {
                    timestamp: r.timestamp,
                    bbox: r.bbox,
                    polygon,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(count_distinct_per_cell(cells, &candidates, mode))
    }

    async fn geometries_at(&self, timestamp: i64) -> Result<Vec<GeometryRecord>> {
        let inner = self.read()?;
        inner
            .records
            .iter()
            .filter(|r| r.timestamp == timestamp)
            .map(|r| {
                Ok(GeometryRecord {
                    id: r.id,
                    timestamp: r.timestamp,
                    polygon: r.decode()?,
                })
            })
            .collect()
    }

    async fn stats(&self) -> Result<StoreStats> {
        let inner = self.read()?;
        Ok(StoreStats {
            snapshots: inner.ledger.len() as i64,
            records: inner.records.len() as i64,
            first_timestamp: inner.ledger.first().copied(),
            last_timestamp: inner.ledger.last().copied(),
        })
    }
}
