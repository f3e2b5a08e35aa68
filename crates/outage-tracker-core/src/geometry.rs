//! Fixed-precision polygon storage encoding.
//!
//! Outage polygons are persisted as TWKB (Tiny Well-Known Binary) with six
//! decimal digits of precision, the same encoding PostGIS produces with
//! `ST_AsTWKB(geom, 6)`. A bounding box is computed alongside each encoded
//! polygon so stores can prefilter spatial queries without decoding.
//!
//! # TWKB layout (polygon)
//!
//! ```text
//! byte 0      type (low nibble, 3 = polygon) | zigzag(precision) << 4
//! byte 1      metadata flags (bbox, size, idlist, extended dims, empty)
//! varint      ring count
//! per ring:   varint point count, then zigzag varint deltas (x, y)
//! ```
//!
//! Deltas run across ring boundaries: every coordinate is relative to the
//! previous coordinate of the whole geometry.

use geo::{BoundingRect, Coord, LineString, Polygon};
use prost::bytes::Buf;
use prost::encoding::{decode_varint, encode_varint};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Decimal digits kept by the storage encoding.
pub const STORAGE_PRECISION: u32 = 6;

const TWKB_POLYGON: u8 = 3;
const FLAG_BBOX: u8 = 0x01;
const FLAG_SIZE: u8 = 0x02;
const FLAG_ID_LIST: u8 = 0x04;
const FLAG_EXTENDED_DIMS: u8 = 0x08;
const FLAG_EMPTY: u8 = 0x10;

/// Axis-aligned bounding box in (longitude, latitude).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// Bounding box of a polygon's exterior ring.
    pub fn from_polygon(polygon: &Polygon<f64>) -> Option<Self> {
        let rect = polygon.bounding_rect()?;
        Some(Self::new(
            rect.min().x,
            rect.min().y,
            rect.max().x,
            rect.max().y,
        ))
    }

    /// Smallest box covering every polygon, or `None` for an empty slice.
    pub fn covering(polygons: &[Polygon<f64>]) -> Option<Self> {
        polygons
            .iter()
            .filter_map(Self::from_polygon)
            .reduce(|acc, b| acc.union(&b))
    }

    pub fn union(&self, other: &BBox) -> BBox {
        BBox::new(
            self.min_x.min(other.min_x),
            self.min_y.min(other.min_y),
            self.max_x.max(other.max_x),
            self.max_y.max(other.max_y),
        )
    }

    /// Closed-interval overlap test (touching boxes overlap), matching the
    /// semantics of the PostGIS `&&` operator.
    pub fn intersects(&self, other: &BBox) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// A polygon ready for storage: its TWKB bytes and bounding box, both
/// derived from the quantized coordinates.
#[derive(Debug, Clone)]
pub struct EncodedPolygon {
    pub twkb: Vec<u8>,
    pub bbox: BBox,
}

impl EncodedPolygon {
    /// Validate, quantize, and encode a polygon.
    pub fn encode(polygon: &Polygon<f64>) -> Result<Self> {
        let twkb = encode_polygon(polygon)?;
        // Recompute the box from the stored form so prefilters agree with
        // what the decoded view returns.
        let decoded = decode_polygon(&twkb)?;
        let bbox = BBox::from_polygon(&decoded)
            .ok_or_else(|| Error::Geometry("polygon has no extent".to_string()))?;
        Ok(Self { twkb, bbox })
    }
}

/// Check that a polygon is a usable closed ring with finite coordinates.
pub fn validate_polygon(polygon: &Polygon<f64>) -> Result<()> {
    let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
    for (i, ring) in rings.enumerate() {
        if ring.0.len() < 4 {
            return Err(Error::Geometry(format!(
                "ring {} has {} points, need at least 4",
                i,
                ring.0.len()
            )));
        }
        if ring.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
            return Err(Error::Geometry(format!(
                "ring {} has a non-finite coordinate",
                i
            )));
        }
    }
    Ok(())
}

/// Encode a polygon as TWKB at [`STORAGE_PRECISION`].
pub fn encode_polygon(polygon: &Polygon<f64>) -> Result<Vec<u8>> {
    validate_polygon(polygon)?;

    let scale = 10f64.powi(STORAGE_PRECISION as i32);
    let mut buf = Vec::with_capacity(16 + polygon.exterior().0.len() * 6);
    buf.push(TWKB_POLYGON | ((zigzag(STORAGE_PRECISION as i64) as u8 & 0x0F) << 4));
    buf.push(0);

    let rings: Vec<&LineString<f64>> = std::iter::once(polygon.exterior())
        .chain(polygon.interiors())
        .collect();
    encode_varint(rings.len() as u64, &mut buf);

    let (mut last_x, mut last_y) = (0i64, 0i64);
    for ring in rings {
        encode_varint(ring.0.len() as u64, &mut buf);
        for c in &ring.0 {
            let x = (c.x * scale).round() as i64;
            let y = (c.y * scale).round() as i64;
            encode_varint(zigzag(x - last_x), &mut buf);
            encode_varint(zigzag(y - last_y), &mut buf);
            last_x = x;
            last_y = y;
        }
    }
    Ok(buf)
}

/// Decode a TWKB polygon.
///
/// Accepts the optional bbox and size headers PostGIS can emit; only
/// two-dimensional, non-empty polygons are supported.
pub fn decode_polygon(bytes: &[u8]) -> Result<Polygon<f64>> {
    let mut cur: &[u8] = bytes;
    if cur.remaining() < 2 {
        return Err(Error::Geometry("twkb: truncated header".to_string()));
    }
    let header = cur.get_u8();
    let flags = cur.get_u8();

    let geom_type = header & 0x0F;
    if geom_type != TWKB_POLYGON {
        return Err(Error::Geometry(format!(
            "twkb: expected polygon (type 3), found type {}",
            geom_type
        )));
    }
    if flags & FLAG_EXTENDED_DIMS != 0 {
        return Err(Error::Geometry(
            "twkb: extended dimensions are not supported".to_string(),
        ));
    }
    if flags & FLAG_EMPTY != 0 {
        return Err(Error::Geometry("twkb: empty polygon".to_string()));
    }
    if flags & FLAG_ID_LIST != 0 {
        return Err(Error::Geometry(
            "twkb: id lists are not valid on a polygon".to_string(),
        ));
    }

    let precision = unzigzag(((header >> 4) & 0x0F) as u64);
    let scale = 10f64.powi(precision as i32);

    if flags & FLAG_SIZE != 0 {
        read_varint(&mut cur)?;
    }
    if flags & FLAG_BBOX != 0 {
        // min + delta for x and y
        for _ in 0..4 {
            read_varint(&mut cur)?;
        }
    }

    let ring_count = read_varint(&mut cur)?;
    if ring_count == 0 {
        return Err(Error::Geometry("twkb: polygon without rings".to_string()));
    }

    let (mut x, mut y) = (0i64, 0i64);
    let mut rings = Vec::with_capacity(ring_count.min(64) as usize);
    for _ in 0..ring_count {
        let point_count = read_varint(&mut cur)?;
        let mut coords = Vec::with_capacity(point_count.min(4096) as usize);
        for _ in 0..point_count {
            x += unzigzag(read_varint(&mut cur)?);
            y += unzigzag(read_varint(&mut cur)?);
            coords.push(Coord {
                x: x as f64 / scale,
                y: y as f64 / scale,
            });
        }
        rings.push(LineString::new(coords));
    }

    let mut rings = rings.into_iter();
    let exterior = rings.next().unwrap_or_else(|| LineString::new(Vec::new()));
    Ok(Polygon::new(exterior, rings.collect()))
}

fn read_varint(cur: &mut &[u8]) -> Result<u64> {
    decode_varint(cur).map_err(|e| Error::Geometry(format!("twkb: {}", e)))
}

fn zigzag(n: i64) -> u64 {
    ((n << 1) ^ (n >> 63)) as u64
}

fn unzigzag(n: u64) -> i64 {
    ((n >> 1) as i64) ^ -((n & 1) as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn gatineau_block() -> Polygon<f64> {
        polygon![
            (x: -75.7912346, y: 45.4461234),
            (x: -75.7891111, y: 45.4462222),
            (x: -75.7893333, y: 45.4479999),
            (x: -75.7910000, y: 45.4478888),
            (x: -75.7912346, y: 45.4461234),
        ]
    }

    #[test]
    fn test_header_bytes() {
        let bytes = encode_polygon(&gatineau_block()).unwrap();
        // zigzag(6) = 12 in the high nibble, polygon type 3 in the low one
        assert_eq!(bytes[0], 0xC3);
        assert_eq!(bytes[1], 0x00);
    }

    #[test]
    fn test_round_trip_within_precision() {
        let original = gatineau_block();
        let decoded = decode_polygon(&encode_polygon(&original).unwrap()).unwrap();
        assert_eq!(decoded.exterior().0.len(), original.exterior().0.len());
        for (a, b) in original.exterior().0.iter().zip(decoded.exterior().0.iter()) {
            assert!((a.x - b.x).abs() <= 0.5e-6 + 1e-12, "x {} vs {}", a.x, b.x);
            assert!((a.y - b.y).abs() <= 0.5e-6 + 1e-12, "y {} vs {}", a.y, b.y);
        }
    }

    #[test]
    fn test_hole_survives_and_deltas_span_rings() {
        let with_hole = Polygon::new(
            LineString::from(vec![
                (-73.60, 45.50),
                (-73.50, 45.50),
                (-73.50, 45.60),
                (-73.60, 45.60),
                (-73.60, 45.50),
            ]),
            vec![LineString::from(vec![
                (-73.57, 45.53),
                (-73.53, 45.53),
                (-73.53, 45.57),
                (-73.57, 45.53),
            ])],
        );
        let decoded = decode_polygon(&encode_polygon(&with_hole).unwrap()).unwrap();
        assert_eq!(decoded.interiors().len(), 1);
        let first_hole = decoded.interiors()[0].0[0];
        assert!((first_hole.x + 73.57).abs() < 1e-9);
        assert!((first_hole.y - 45.53).abs() < 1e-9);
    }

    #[test]
    fn test_decode_skips_bbox_header() {
        // Polygon with the bbox flag set: bbox varints precede the rings.
        let mut bytes = vec![0xC3, FLAG_BBOX];
        for v in [zigzag(0), zigzag(10), zigzag(0), zigzag(10)] {
            encode_varint(v, &mut bytes);
        }
        let body = encode_polygon(&polygon![
            (x: 0.0, y: 0.0),
            (x: 0.00001, y: 0.0),
            (x: 0.00001, y: 0.00001),
            (x: 0.0, y: 0.0),
        ])
        .unwrap();
        bytes.extend_from_slice(&body[2..]);
        let decoded = decode_polygon(&bytes).unwrap();
        assert_eq!(decoded.exterior().0.len(), 4);
        assert!((decoded.exterior().0[1].x - 0.00001).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_degenerate_ring() {
        let line = Polygon::new(LineString::from(vec![(0.0, 0.0), (1.0, 1.0)]), vec![]);
        assert!(matches!(encode_polygon(&line), Err(Error::Geometry(_))));
    }

    #[test]
    fn test_rejects_non_polygon_and_truncated() {
        assert!(decode_polygon(&[0xC1, 0x00, 0x02, 0x04]).is_err());
        assert!(decode_polygon(&[0xC3]).is_err());
        let mut bytes = encode_polygon(&gatineau_block()).unwrap();
        bytes.truncate(bytes.len() - 3);
        assert!(decode_polygon(&bytes).is_err());
    }

    #[test]
    fn test_encoded_bbox_matches_quantized() {
        let encoded = EncodedPolygon::encode(&gatineau_block()).unwrap();
        assert!((encoded.bbox.min_x - -75.791235).abs() < 1e-9);
        assert!((encoded.bbox.max_y - 45.448).abs() < 1e-9);
    }

    #[test]
    fn test_bbox_touching_counts_as_overlap() {
        let a = BBox::new(0.0, 0.0, 1.0, 1.0);
        let b = BBox::new(1.0, 1.0, 2.0, 2.0);
        let c = BBox::new(1.1, 0.0, 2.0, 1.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }
}
