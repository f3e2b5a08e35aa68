//! SQLite-backed [`GeometryStore`].
//!
//! Each polygon is stored as a TWKB blob alongside its bounding box. SQLite
//! has no spatial predicates, so reads narrow candidates with an indexed
//! bounding-box filter in SQL and finish the exact test in Rust.
//!
//! The `snapshots` table is the commit ledger: its primary key enforces
//! one commit per timestamp, and it records empty snapshots so the
//! high-water mark advances past them.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use geo::{Area, Intersects, Point, Polygon};
use outage_tracker_core::error::{Error, Result};
use outage_tracker_core::geometry::{decode_polygon, BBox, EncodedPolygon};
use outage_tracker_core::models::{AreaSample, GeometryRecord, JoinMode, StoreStats};
use outage_tracker_core::store::{count_distinct_per_cell, GeometryStore, JoinCandidate};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

pub struct SqliteStore {
    pool: SqlitePool,
}

fn query_err(e: sqlx::Error) -> Error {
    Error::StoreQuery(e.to_string())
}

fn write_err(e: sqlx::Error) -> Error {
    Error::StoreWrite(e.to_string())
}

fn decode_row(row: &SqliteRow) -> Result<Polygon<f64>> {
    let id: i64 = row.try_get("id").map_err(query_err)?;
    let twkb: Vec<u8> = row.try_get("twkb").map_err(query_err)?;
    decode_polygon(&twkb).map_err(|e| Error::StoreQuery(format!("record {}: {}", id, e)))
}

fn bbox_row(row: &SqliteRow) -> Result<BBox> {
    Ok(BBox::new(
        row.try_get("min_x").map_err(query_err)?,
        row.try_get("min_y").map_err(query_err)?,
        row.try_get("max_x").map_err(query_err)?,
        row.try_get("max_y").map_err(query_err)?,
    ))
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    /// Commit one snapshot, recording the file it came from in the ledger.
    pub async fn append_snapshot(
        &self,
        timestamp: i64,
        source_name: Option<&str>,
        polygons: &[Polygon<f64>],
    ) -> Result<usize> {
        let encoded = polygons
            .iter()
            .map(EncodedPolygon::encode)
            .collect::<Result<Vec<_>>>()
            .map_err(|e| Error::StoreWrite(format!("timestamp {}: {}", timestamp, e)))?;

        let mut tx = self.pool.begin().await.map_err(write_err)?;

        let ledger = sqlx::query(
            "INSERT INTO snapshots (timestamp, record_count, source_name, ingested_at) VALUES (?, ?, ?, ?)",
        )
        .bind(timestamp)
        .bind(encoded.len() as i64)
        .bind(source_name)
        .bind(chrono::Utc::now().timestamp())
        .execute(&mut *tx)
        .await;
        if let Err(e) = ledger {
            let duplicate = e
                .as_database_error()
                .is_some_and(|d| d.is_unique_violation());
            return Err(if duplicate {
                Error::StoreWrite(format!("snapshot {} already committed", timestamp))
            } else {
                write_err(e)
            });
        }

        for e in &encoded {
            sqlx::query(
                "INSERT INTO outage_records (timestamp, twkb, min_x, min_y, max_x, max_y) VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(timestamp)
            .bind(&e.twkb)
            .bind(e.bbox.min_x)
            .bind(e.bbox.min_y)
            .bind(e.bbox.max_x)
            .bind(e.bbox.max_y)
            .execute(&mut *tx)
            .await
            .map_err(write_err)?;
        }

        tx.commit().await.map_err(write_err)?;
        Ok(encoded.len())
    }
}

#[async_trait]
impl GeometryStore for SqliteStore {
    async fn append_geometries(&self, timestamp: i64, polygons: &[Polygon<f64>]) -> Result<usize> {
        self.append_snapshot(timestamp, None, polygons).await
    }

    async fn latest_timestamp(&self) -> Result<Option<i64>> {
        sqlx::query_scalar("SELECT MAX(timestamp) FROM snapshots")
            .fetch_one(&self.pool)
            .await
            .map_err(query_err)
    }

    async fn has_timestamp(&self, timestamp: i64) -> Result<bool> {
        sqlx::query_scalar("SELECT COUNT(*) > 0 FROM snapshots WHERE timestamp = ?")
            .bind(timestamp)
            .fetch_one(&self.pool)
            .await
            .map_err(query_err)
    }

    async fn distinct_timestamps(&self) -> Result<Vec<i64>> {
        sqlx::query_scalar("SELECT DISTINCT timestamp FROM outage_records ORDER BY timestamp")
            .fetch_all(&self.pool)
            .await
            .map_err(query_err)
    }

    async fn total_area_series(&self) -> Result<Vec<AreaSample>> {
        let rows = sqlx::query("SELECT id, timestamp, twkb FROM outage_records")
            .fetch_all(&self.pool)
            .await
            .map_err(query_err)?;

        let mut sums: BTreeMap<i64, f64> = BTreeMap::new();
        for row in &rows {
            let timestamp: i64 = row.try_get("timestamp").map_err(query_err)?;
            *sums.entry(timestamp).or_insert(0.0) += decode_row(row)?.unsigned_area();
        }
        Ok(sums
            .into_iter()
            .map(|(timestamp, area)| AreaSample { timestamp, area })
            .collect())
    }

    async fn timestamps_covering(&self, point: Point<f64>) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            r#"
            SELECT id, timestamp, twkb FROM outage_records
            WHERE min_x <= ? AND max_x >= ? AND min_y <= ? AND max_y >= ?
            "#,
        )
        .bind(point.x())
        .bind(point.x())
        .bind(point.y())
        .bind(point.y())
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)?;

        let mut hits = BTreeSet::new();
        for row in &rows {
            let timestamp: i64 = row.try_get("timestamp").map_err(query_err)?;
            if hits.contains(&timestamp) {
                continue;
            }
            if decode_row(row)?.intersects(&point) {
                hits.insert(timestamp);
            }
        }
        Ok(hits.into_iter().collect())
    }

    async fn cell_outage_counts(&self, cells: &[Polygon<f64>], mode: JoinMode) -> Result<Vec<u64>> {
        let Some(region) = BBox::covering(cells) else {
            return Ok(vec![0; cells.len()]);
        };

        let rows = sqlx::query(
            r#"
            SELECT id, timestamp, twkb, min_x, min_y, max_x, max_y FROM outage_records
            WHERE min_x <= ? AND max_x >= ? AND min_y <= ? AND max_y >= ?
            "#,
        )
        .bind(region.max_x)
        .bind(region.min_x)
        .bind(region.max_y)
        .bind(region.min_y)
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)?;

        let candidates = rows
            .iter()
            .map(|row| {
                let polygon = match mode {
                    JoinMode::BoundingBox => None,
                    JoinMode::Intersects => Some(decode_row(row)?),
                };
                Ok(JoinCandidate {
                    timestamp: row.try_get("timestamp").map_err(query_err)?,
                    bbox: bbox_row(row)?,
                    polygon,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(count_distinct_per_cell(cells, &candidates, mode))
    }

    async fn geometries_at(&self, timestamp: i64) -> Result<Vec<GeometryRecord>> {
        let rows = sqlx::query(
            "SELECT id, timestamp, twkb FROM outage_records WHERE timestamp = ? ORDER BY id",
        )
        .bind(timestamp)
        .fetch_all(&self.pool)
        .await
        .map_err(query_err)?;

        rows.iter()
            .map(|row| {
                Ok(GeometryRecord {
                    id: row.try_get("id").map_err(query_err)?,
                    timestamp,
                    polygon: decode_row(row)?,
                })
            })
            .collect()
    }

    async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM snapshots) AS snapshots,
                (SELECT COUNT(*) FROM outage_records) AS records,
                (SELECT MIN(timestamp) FROM snapshots) AS first_timestamp,
                (SELECT MAX(timestamp) FROM snapshots) AS last_timestamp
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(query_err)?;

        Ok(StoreStats {
            snapshots: row.try_get("snapshots").map_err(query_err)?,
            records: row.try_get("records").map_err(query_err)?,
            first_timestamp: row.try_get("first_timestamp").map_err(query_err)?,
            last_timestamp: row.try_get("last_timestamp").map_err(query_err)?,
        })
    }
}
