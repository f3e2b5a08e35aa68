//! Zoom-adaptive hexagonal outage-density grid.
//!
//! A grid request names a center and a map zoom level. The zoom decides
//! three things:
//!
//! | Quantity | Formula |
//! |----------|---------|
//! | meters per pixel | `9.555 × 2^(14 − zoom)` |
//! | buffer radius (m) | `meters_per_pixel × 120` |
//! | hexagon edge (deg) | `(0.001 / 9.555) × meters_per_pixel` |
//!
//! Zoom levels are clamped to 9..=22. The circular buffer is built
//! geodesically, then covered by a flat-topped hexagonal tiling anchored
//! at the coordinate origin, so the same cell always has the same shape
//! regardless of the center. Cells touching the buffer are kept.
//!
//! Buffer longitudes are unwrapped around the center, so a grid near the
//! antimeridian stays local and may extend past ±180. A buffer whose
//! bounding box would need more than [`MAX_GRID_CANDIDATES`] hexagons
//! (around the poles) is rejected with [`Error::Geometry`].
//!
//! Coarse zooms (< 12) cover large regions, so polygons are joined to
//! cells by bounding-box overlap; finer zooms use exact intersection.

use geo::{Destination, Geodesic, Intersects, LineString, Point, Polygon};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::feature::{CellProperties, Feature, FeatureCollection};
use crate::geometry::BBox;
use crate::models::JoinMode;
use crate::store::GeometryStore;

/// Lowest zoom level the grid honours.
pub const MIN_ZOOM: u8 = 9;
/// Highest zoom level the grid honours. Finer zooms reuse its sizing.
pub const MAX_ZOOM: u8 = 22;
/// Upper bound on hexagons tested against a buffer's bounding box.
pub const MAX_GRID_CANDIDATES: i64 = 100_000;
/// First zoom level that uses exact intersection.
pub const EXACT_JOIN_ZOOM: u8 = 12;
/// Vertices on the geodesic buffer ring.
pub const BUFFER_SEGMENTS: usize = 32;

const METERS_PER_PIXEL_AT_14: f64 = 9.555;
const RADIUS_PIXELS: f64 = 120.0;
const EDGE_DEGREES_AT_14: f64 = 0.001;

/// Sizing derived from a zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomSizing {
    /// Effective zoom after clamping.
    pub zoom: u8,
    pub meters_per_pixel: f64,
    pub radius_m: f64,
    /// Hexagon edge length in degrees.
    pub cell_size: f64,
}

impl ZoomSizing {
    pub fn for_zoom(zoom: u8) -> Self {
        let zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
        let meters_per_pixel = METERS_PER_PIXEL_AT_14 * 2f64.powi(14 - i32::from(zoom));
        Self {
            zoom,
            meters_per_pixel,
            radius_m: meters_per_pixel * RADIUS_PIXELS,
            cell_size: (EDGE_DEGREES_AT_14 / METERS_PER_PIXEL_AT_14) * meters_per_pixel,
        }
    }

    pub fn join_mode(&self) -> JoinMode {
        join_mode_for_zoom(self.zoom)
    }
}

pub fn join_mode_for_zoom(zoom: u8) -> JoinMode {
    if zoom.max(MIN_ZOOM) < EXACT_JOIN_ZOOM {
        JoinMode::BoundingBox
    } else {
        JoinMode::Intersects
    }
}

/// Approximate circle of `radius_m` meters around `center`, computed on
/// the WGS84 ellipsoid. The ring is closed, and every longitude lies
/// within 180 degrees of the center's.
pub fn geodesic_buffer(center: Point<f64>, radius_m: f64) -> Polygon<f64> {
    let step = 360.0 / BUFFER_SEGMENTS as f64;
    let mut ring: Vec<Point<f64>> = (0..BUFFER_SEGMENTS)
        .map(|k| {
            let p = Geodesic::destination(center, k as f64 * step, radius_m);
            let lon = p.x() - 360.0 * ((p.x() - center.x()) / 360.0).round();
            Point::new(lon, p.y())
        })
        .collect();
    ring.push(ring[0]);
    Polygon::new(LineString::from(ring), vec![])
}

/// Flat-topped hexagon with edge `size` centered at (`cx`, `cy`).
fn hexagon(cx: f64, cy: f64, size: f64) -> Polygon<f64> {
    let half_height = size * 3f64.sqrt() / 2.0;
    let half_edge = size / 2.0;
    Polygon::new(
        LineString::from(vec![
            (cx - size, cy),
            (cx - half_edge, cy - half_height),
            (cx + half_edge, cy - half_height),
            (cx + size, cy),
            (cx + half_edge, cy + half_height),
            (cx - half_edge, cy + half_height),
            (cx - size, cy),
        ]),
        vec![],
    )
}

/// Hexagons of the origin-anchored tiling with edge `size` that intersect
/// `area`, in column-major order (columns west to east, rows south to
/// north within a column).
///
/// Fails when the bounding box of `area` spans more than
/// [`MAX_GRID_CANDIDATES`] hexagons.
pub fn hexagon_cover(area: &Polygon<f64>, size: f64) -> Result<Vec<Polygon<f64>>> {
    let Some(bbox) = BBox::from_polygon(area) else {
        return Ok(Vec::new());
    };
    if !(size > 0.0) {
        return Ok(Vec::new());
    }
    let col_step = size * 1.5;
    let row_step = size * 3f64.sqrt();

    let too_large = || {
        Error::Geometry(format!(
            "grid over {:.6}, {:.6} .. {:.6}, {:.6} with cell size {} exceeds {} cells",
            bbox.min_y, bbox.min_x, bbox.max_y, bbox.max_x, size, MAX_GRID_CANDIDATES
        ))
    };
    let first_col = tile_index((bbox.min_x / col_step).floor(), -1).ok_or_else(too_large)?;
    let last_col = tile_index((bbox.max_x / col_step).ceil(), 1).ok_or_else(too_large)?;
    let first_row = tile_index((bbox.min_y / row_step).floor(), -1).ok_or_else(too_large)?;
    let last_row = tile_index((bbox.max_y / row_step).ceil(), 1).ok_or_else(too_large)?;

    let candidates = (last_col - first_col + 1)
        .checked_mul(last_row - first_row + 1)
        .ok_or_else(too_large)?;
    if candidates > MAX_GRID_CANDIDATES {
        return Err(too_large());
    }

    let mut cells = Vec::new();
    for i in first_col..=last_col {
        let cx = i as f64 * col_step;
        let offset = if i.rem_euclid(2) == 1 { row_step / 2.0 } else { 0.0 };
        for j in first_row..=last_row {
            let cy = j as f64 * row_step + offset;
            let cell = hexagon(cx, cy, size);
            if cell.intersects(area) {
                cells.push(cell);
            }
        }
    }
    Ok(cells)
}

/// Tiling index for an already-rounded coordinate, padded by `pad`.
/// `None` when the index is not a sane `i64`.
fn tile_index(rounded: f64, pad: i64) -> Option<i64> {
    const LIMIT: f64 = 4_503_599_627_370_496.0;
    if !rounded.is_finite() || rounded.abs() > LIMIT {
        return None;
    }
    (rounded as i64).checked_add(pad)
}

/// One cell of an aggregated grid.
#[derive(Debug, Clone)]
pub struct GridCell {
    /// 1-based identity, stable for a given center and zoom.
    pub id: u64,
    pub polygon: Polygon<f64>,
    /// Distinct outage timestamps touching the cell.
    pub outage: u64,
}

/// An aggregated grid around one center.
#[derive(Debug, Clone)]
pub struct GridResult {
    pub center: Point<f64>,
    pub sizing: ZoomSizing,
    pub join_mode: JoinMode,
    pub cells: Vec<GridCell>,
    pub max_outage: u64,
}

/// Serialized grid: a GeoJSON feature collection with the grid metadata
/// alongside.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridFeatureCollection {
    #[serde(flatten)]
    pub collection: FeatureCollection<CellProperties>,
    pub max_outage: u64,
    pub zoom: u8,
    pub join_mode: JoinMode,
    pub center: GridCenter,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GridCenter {
    pub lat: f64,
    pub lon: f64,
}

impl GridResult {
    /// `outage / max_outage` for shading, or 0 when nothing was counted.
    pub fn normalized(&self, cell: &GridCell) -> f64 {
        if self.max_outage == 0 {
            0.0
        } else {
            cell.outage as f64 / self.max_outage as f64
        }
    }

    pub fn to_feature_collection(&self) -> GridFeatureCollection {
        let features = self
            .cells
            .iter()
            .map(|c| {
                Feature::new(
                    c.id,
                    &c.polygon,
                    CellProperties {
                        item: c.id,
                        outage: c.outage,
                    },
                )
            })
            .collect();
        GridFeatureCollection {
            collection: FeatureCollection::new(features),
            max_outage: self.max_outage,
            zoom: self.sizing.zoom,
            join_mode: self.join_mode,
            center: GridCenter {
                lat: self.center.y(),
                lon: self.center.x(),
            },
        }
    }
}

/// Build the grid around `center` (`x` = longitude, `y` = latitude) at
/// `zoom` and count distinct outage timestamps per cell.
pub async fn aggregate<S: GeometryStore + ?Sized>(
    store: &S,
    center: Point<f64>,
    zoom: u8,
) -> Result<GridResult> {
    let sizing = ZoomSizing::for_zoom(zoom);
    let join_mode = sizing.join_mode();
    let buffer = geodesic_buffer(center, sizing.radius_m);
    let polygons = hexagon_cover(&buffer, sizing.cell_size)?;

    let counts = store.cell_outage_counts(&polygons, join_mode).await?;
    let cells: Vec<GridCell> = polygons
        .into_iter()
        .zip(counts)
        .enumerate()
        .map(|(i, (polygon, outage))| GridCell {
            id: i as u64 + 1,
            polygon,
            outage,
        })
        .collect();
    let max_outage = cells.iter().map(|c| c.outage).max().unwrap_or(0);

    Ok(GridResult {
        center,
        sizing,
        join_mode,
        cells,
        max_outage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use geo::{polygon, Contains};

    const OTTAWA: (f64, f64) = (-75.790369, 45.446892);

    #[test]
    fn test_sizing_at_zoom_15() {
        let s = ZoomSizing::for_zoom(15);
        assert!((s.meters_per_pixel - 4.7775).abs() < 1e-9);
        assert!((s.radius_m - 573.3).abs() < 1e-6);
        assert!((s.cell_size - 0.0005).abs() < 1e-9);
    }

    #[test]
    fn test_sizing_clamps_below_nine() {
        for zoom in [0, 3, 8, 9] {
            let s = ZoomSizing::for_zoom(zoom);
            assert_eq!(s.zoom, 9);
            assert!((s.meters_per_pixel - 611.52).abs() < 1e-9);
            assert!((s.radius_m - 73382.4).abs() < 1e-6);
        }
    }

    #[test]
    fn test_sizing_strictly_decreasing() {
        for zoom in 9..20 {
            let a = ZoomSizing::for_zoom(zoom);
            let b = ZoomSizing::for_zoom(zoom + 1);
            assert!(b.meters_per_pixel < a.meters_per_pixel);
            assert!(b.radius_m < a.radius_m);
            assert!(b.cell_size < a.cell_size);
        }
    }

    #[test]
    fn test_join_mode_by_zoom() {
        for zoom in [0, 9, 10, 11] {
            assert_eq!(join_mode_for_zoom(zoom), JoinMode::BoundingBox);
        }
        for zoom in [12, 15, 18] {
            assert_eq!(join_mode_for_zoom(zoom), JoinMode::Intersects);
        }
    }

    #[test]
    fn test_buffer_ring_closed_and_sized() {
        let center = Point::new(OTTAWA.0, OTTAWA.1);
        let buffer = geodesic_buffer(center, 573.3);
        let ring = &buffer.exterior().0;
        assert_eq!(ring.len(), BUFFER_SEGMENTS + 1);
        assert_eq!(ring.first(), ring.last());
        // North vertex: ~573 m is ~0.00516 degrees of latitude.
        assert!((ring[0].y - center.y() - 0.00516).abs() < 1e-4);
        assert!(buffer.contains(&center));
    }

    #[test]
    fn test_cover_is_column_major_and_touches_area() {
        let area = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ];
        let cells = hexagon_cover(&area, 0.2).unwrap();
        assert!(!cells.is_empty());
        assert!(cells.iter().all(|c| c.intersects(&area)));

        let centers: Vec<(f64, f64)> = cells
            .iter()
            .map(|c| {
                let b = BBox::from_polygon(c).unwrap();
                ((b.min_x + b.max_x) / 2.0, (b.min_y + b.max_y) / 2.0)
            })
            .collect();
        for pair in centers.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            assert!(b.0 > a.0 + 1e-12 || ((b.0 - a.0).abs() < 1e-12 && b.1 > a.1));
        }
    }

    #[test]
    fn test_tiling_is_origin_anchored() {
        let a = polygon![
            (x: 0.05, y: 0.05),
            (x: 0.3, y: 0.05),
            (x: 0.3, y: 0.3),
            (x: 0.05, y: 0.05),
        ];
        let b = polygon![
            (x: 0.1, y: 0.1),
            (x: 0.5, y: 0.1),
            (x: 0.5, y: 0.5),
            (x: 0.1, y: 0.1),
        ];
        let from_a = hexagon_cover(&a, 0.1).unwrap();
        let from_b = hexagon_cover(&b, 0.1).unwrap();
        // Any cell appearing in both covers is the identical hexagon.
        let shared = from_a.iter().filter(|c| from_b.contains(c)).count();
        assert!(shared > 0);
    }

    #[test]
    fn test_sizing_clamps_above_max_zoom() {
        let max = ZoomSizing::for_zoom(MAX_ZOOM);
        for zoom in [23, 30, 64, 100, 255] {
            assert_eq!(ZoomSizing::for_zoom(zoom), max);
        }
        assert_eq!(max.zoom, 22);
        assert!(max.cell_size > 1e-6);
    }

    #[test]
    fn test_cover_rejects_unbounded_tiling() {
        let area = polygon![
            (x: 0.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: 0.0, y: 0.0),
        ];
        assert!(matches!(hexagon_cover(&area, 1e-9), Err(Error::Geometry(_))));
        assert!(matches!(hexagon_cover(&area, 1e-300), Err(Error::Geometry(_))));
    }

    #[tokio::test]
    async fn test_every_zoom_builds_a_bounded_grid() {
        let store = InMemoryStore::new();
        let center = Point::new(OTTAWA.0, OTTAWA.1);
        let finest = aggregate(&store, center, MAX_ZOOM).await.unwrap();
        for zoom in 20..=255u8 {
            let grid = aggregate(&store, center, zoom).await.unwrap();
            assert!(!grid.cells.is_empty(), "zoom {}", zoom);
            assert!(grid.cells.len() < 1000, "zoom {}: {} cells", zoom, grid.cells.len());
            if zoom >= MAX_ZOOM {
                assert_eq!(grid.cells.len(), finest.cells.len());
                assert_eq!(grid.sizing.zoom, MAX_ZOOM);
            }
        }
    }

    #[test]
    fn test_buffer_near_antimeridian_stays_local() {
        let center = Point::new(179.999, 10.0);
        let buffer = geodesic_buffer(center, 573.3);
        let b = BBox::from_polygon(&buffer).unwrap();
        assert!(b.max_x - b.min_x < 0.02);
        assert!(b.max_x > 180.0);
        assert!(b.min_x < 179.999);
    }

    #[tokio::test]
    async fn test_grid_near_antimeridian() {
        let store = InMemoryStore::new();
        let ottawa = aggregate(&store, Point::new(OTTAWA.0, OTTAWA.1), 15)
            .await
            .unwrap();
        for lon in [179.999, -179.999, 180.0] {
            let grid = aggregate(&store, Point::new(lon, 10.0), 15).await.unwrap();
            assert!(!grid.cells.is_empty());
            assert!(
                grid.cells.len() < ottawa.cells.len() * 2,
                "lon {}: {} cells",
                lon,
                grid.cells.len()
            );
        }
    }

    #[tokio::test]
    async fn test_grid_at_pole_is_rejected() {
        let store = InMemoryStore::new();
        let err = aggregate(&store, Point::new(0.0, 90.0), 15).await.unwrap_err();
        assert!(matches!(err, Error::Geometry(_)));
    }

    #[tokio::test]
    async fn test_zero_records_grid() {
        let store = InMemoryStore::new();
        let grid = aggregate(&store, Point::new(OTTAWA.0, OTTAWA.1), 15)
            .await
            .unwrap();
        assert!(!grid.cells.is_empty());
        assert!(grid.cells.iter().all(|c| c.outage == 0));
        assert_eq!(grid.max_outage, 0);
        assert_eq!(grid.normalized(&grid.cells[0]), 0.0);

        let fc = grid.to_feature_collection();
        assert_eq!(fc.collection.features.len(), grid.cells.len());
        assert_eq!(fc.max_outage, 0);
        assert_eq!(fc.join_mode, JoinMode::Intersects);
    }

    #[tokio::test]
    async fn test_counts_distinct_timestamps_near_center() {
        let store = InMemoryStore::new();
        let (lon, lat) = OTTAWA;
        let outage = polygon![
            (x: lon - 0.001, y: lat - 0.001),
            (x: lon + 0.001, y: lat - 0.001),
            (x: lon + 0.001, y: lat + 0.001),
            (x: lon - 0.001, y: lat + 0.001),
            (x: lon - 0.001, y: lat - 0.001),
        ];
        store.append_geometries(100, &[outage.clone()]).await.unwrap();
        store.append_geometries(200, &[outage.clone(), outage]).await.unwrap();

        let grid = aggregate(&store, Point::new(lon, lat), 15).await.unwrap();
        assert_eq!(grid.max_outage, 2);
        let hot = grid.cells.iter().filter(|c| c.outage == 2).count();
        assert!(hot > 0);
        assert!(grid.cells.iter().any(|c| c.outage == 0));

        let ids: Vec<u64> = grid.cells.iter().map(|c| c.id).collect();
        let expected: Vec<u64> = (1..=grid.cells.len() as u64).collect();
        assert_eq!(ids, expected);
        let top = grid.cells.iter().find(|c| c.outage == 2).unwrap();
        assert_eq!(grid.normalized(top), 1.0);
    }
}
