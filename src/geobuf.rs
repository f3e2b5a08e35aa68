//! Geobuf wire format: protobuf-encoded GeoJSON as written by the outage
//! scraper.
//!
//! Only the parts of the schema needed to recover polygon geometry are
//! declared; property and id fields are skipped by the decoder. Coordinates
//! are integers scaled by `10^precision`, delta-encoded within each ring,
//! with the closing point of every ring omitted.

use geo::{Coord, LineString, MultiPolygon, Polygon};
use outage_tracker_core::error::{Error, Result};
use prost::Message;

const DEFAULT_DIMENSIONS: u32 = 2;
/// Geobuf writes at most x, y, z and m.
const MAX_DIMENSIONS: usize = 4;
const DEFAULT_PRECISION: u32 = 6;

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Data {
    #[prost(string, repeated, tag = "1")]
    pub keys: Vec<String>,
    #[prost(uint32, optional, tag = "2")]
    pub dimensions: Option<u32>,
    #[prost(uint32, optional, tag = "3")]
    pub precision: Option<u32>,
    #[prost(oneof = "data::DataType", tags = "4, 5, 6")]
    pub data_type: Option<data::DataType>,
}

pub mod data {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum DataType {
        #[prost(message, tag = "4")]
        FeatureCollection(super::FeatureCollection),
        #[prost(message, tag = "5")]
        Feature(super::Feature),
        #[prost(message, tag = "6")]
        Geometry(super::Geometry),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct FeatureCollection {
    #[prost(message, repeated, tag = "1")]
    pub features: Vec<Feature>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Feature {
    #[prost(message, optional, tag = "1")]
    pub geometry: Option<Geometry>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Geometry {
    #[prost(enumeration = "GeometryType", optional, tag = "1")]
    pub r#type: Option<i32>,
    #[prost(uint32, repeated, packed = "true", tag = "2")]
    pub lengths: Vec<u32>,
    #[prost(sint64, repeated, packed = "true", tag = "3")]
    pub coords: Vec<i64>,
    #[prost(message, repeated, tag = "4")]
    pub geometries: Vec<Geometry>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum GeometryType {
    Point = 0,
    MultiPoint = 1,
    LineString = 2,
    MultiLineString = 3,
    Polygon = 4,
    MultiPolygon = 5,
    GeometryCollection = 6,
}

/// Scaling and stride for one decoded message.
struct Frame {
    dim: usize,
    scale: f64,
}

impl Frame {
    /// One ring from `coords`, closed by repeating its first point.
    fn ring(&self, coords: &[i64]) -> std::result::Result<LineString<f64>, String> {
        let mut acc = [0i64; MAX_DIMENSIONS];
        let mut points: Vec<Coord<f64>> = coords
            .chunks_exact(self.dim)
            .map(|c| {
                for (a, d) in acc.iter_mut().zip(c) {
                    *a = a.checked_add(*d).ok_or("coordinate delta overflows")?;
                }
                Ok(Coord {
                    x: acc[0] as f64 / self.scale,
                    y: acc[1] as f64 / self.scale,
                })
            })
            .collect::<std::result::Result<_, &str>>()?;
        if let Some(first) = points.first().copied() {
            points.push(first);
        }
        Ok(LineString::new(points))
    }

    /// Split `coords` into consecutive rings of `lengths` points each.
    fn rings(&self, coords: &[i64], lengths: &[u32]) -> std::result::Result<Vec<LineString<f64>>, String> {
        let mut rings = Vec::with_capacity(lengths.len().min(4096));
        let mut start = 0usize;
        for &len in lengths {
            let end = start + len as usize * self.dim;
            let slice = coords
                .get(start..end)
                .ok_or_else(|| format!("ring of {} points overruns coordinate array", len))?;
            rings.push(self.ring(slice)?);
            start = end;
        }
        Ok(rings)
    }

    fn polygon(&self, geometry: &Geometry) -> std::result::Result<Polygon<f64>, String> {
        let mut rings = if geometry.lengths.is_empty() {
            vec![self.ring(&geometry.coords)?]
        } else {
            self.rings(&geometry.coords, &geometry.lengths)?
        }
        .into_iter();
        let exterior = rings.next().ok_or("polygon has no rings")?;
        Ok(Polygon::new(exterior, rings.collect()))
    }

    fn multi_polygon(&self, geometry: &Geometry) -> std::result::Result<MultiPolygon<f64>, String> {
        let lengths = &geometry.lengths;
        if lengths.is_empty() {
            return Ok(MultiPolygon::new(vec![Polygon::new(
                self.ring(&geometry.coords)?,
                vec![],
            )]));
        }

        let count = lengths[0] as usize;
        let mut polygons = Vec::with_capacity(count.min(4096));
        let mut cursor = 1usize;
        let mut start = 0usize;
        for _ in 0..count {
            let ring_count = *lengths.get(cursor).ok_or("truncated multipolygon lengths")? as usize;
            let ring_lengths = lengths
                .get(cursor + 1..cursor + 1 + ring_count)
                .ok_or("truncated multipolygon lengths")?;
            let mut rings = self.rings(&geometry.coords[start.min(geometry.coords.len())..], ring_lengths)?;
            start += ring_lengths.iter().map(|&l| l as usize * self.dim).sum::<usize>();
            cursor += ring_count + 1;
            if rings.is_empty() {
                return Err("multipolygon member has no rings".to_string());
            }
            let exterior = rings.remove(0);
            polygons.push(Polygon::new(exterior, rings));
        }
        Ok(MultiPolygon::new(polygons))
    }

    /// Polygons carried by one geometry. Multipolygons are split.
    fn polygons(&self, geometry: &Geometry) -> std::result::Result<Vec<Polygon<f64>>, String> {
        let kind = geometry
            .r#type
            .map(GeometryType::try_from)
            .transpose()
            .map_err(|e| e.to_string())?
            .unwrap_or(GeometryType::Point);
        match kind {
            GeometryType::Polygon => Ok(vec![self.polygon(geometry)?]),
            GeometryType::MultiPolygon => Ok(self.multi_polygon(geometry)?.0),
            other => Err(format!("unsupported geometry type {:?}", other)),
        }
    }
}

/// Decode a geobuf `Data` message into the polygons it carries, in
/// feature order.
pub fn decode_polygons(source_name: &str, bytes: &[u8]) -> Result<Vec<Polygon<f64>>> {
    let data = Data::decode(bytes).map_err(|e| Error::decode(source_name, e.to_string()))?;

    let dim = data.dimensions.unwrap_or(DEFAULT_DIMENSIONS) as usize;
    if !(2..=MAX_DIMENSIONS).contains(&dim) {
        return Err(Error::decode(
            source_name,
            format!("unsupported dimension count {}", dim),
        ));
    }
    let precision = data.precision.unwrap_or(DEFAULT_PRECISION);
    if precision > 15 {
        return Err(Error::decode(
            source_name,
            format!("unsupported precision {}", precision),
        ));
    }
    let frame = Frame {
        dim,
        scale: 10f64.powi(precision as i32),
    };

    let geometries: Vec<Geometry> = match data.data_type {
        Some(data::DataType::FeatureCollection(fc)) => fc
            .features
            .into_iter()
            .enumerate()
            .map(|(i, f)| {
                f.geometry
                    .ok_or_else(|| Error::decode(source_name, format!("feature {} has no geometry", i)))
            })
            .collect::<Result<_>>()?,
        Some(data::DataType::Feature(f)) => vec![f
            .geometry
            .ok_or_else(|| Error::decode(source_name, "feature has no geometry"))?],
        Some(data::DataType::Geometry(g)) => vec![g],
        None => return Err(Error::decode(source_name, "message carries no data")),
    };

    let mut polygons = Vec::new();
    for geometry in &geometries {
        polygons.extend(
            frame
                .polygons(geometry)
                .map_err(|message| Error::decode(source_name, message))?,
        );
    }
    Ok(polygons)
}

fn encode_ring(ring: &LineString<f64>, scale: f64, coords: &mut Vec<i64>) -> u32 {
    let points = &ring.0[..ring.0.len().saturating_sub(1)];
    let (mut px, mut py) = (0i64, 0i64);
    for c in points {
        let x = (c.x * scale).round() as i64;
        let y = (c.y * scale).round() as i64;
        coords.push(x - px);
        coords.push(y - py);
        px = x;
        py = y;
    }
    points.len() as u32
}

/// Encode polygons as a geobuf feature collection with precision 6.
pub fn encode_polygons(polygons: &[Polygon<f64>]) -> Vec<u8> {
    let scale = 10f64.powi(DEFAULT_PRECISION as i32);
    let features = polygons
        .iter()
        .map(|p| {
            let mut coords = Vec::new();
            let mut lengths = vec![encode_ring(p.exterior(), scale, &mut coords)];
            for hole in p.interiors() {
                lengths.push(encode_ring(hole, scale, &mut coords));
            }
            if lengths.len() == 1 {
                lengths.clear();
            }
            Feature {
                geometry: Some(Geometry {
                    r#type: Some(GeometryType::Polygon as i32),
                    lengths,
                    coords,
                    geometries: Vec::new(),
                }),
            }
        })
        .collect();
    Data {
        keys: Vec::new(),
        dimensions: None,
        precision: Some(DEFAULT_PRECISION),
        data_type: Some(data::DataType::FeatureCollection(FeatureCollection { features })),
    }
    .encode_to_vec()
}
