//! GeoJSON feature-collection shapes returned to map renderers.
//!
//! Only polygon features are produced. Each feature repeats its identity in
//! `properties.item` because choropleth renderers key features by a
//! property path rather than by the top-level `id`.

use geo::{Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::GeometryRecord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureCollection<P> {
    #[serde(rename = "type")]
    pub kind: String,
    pub features: Vec<Feature<P>>,
}

impl<P> FeatureCollection<P> {
    pub fn new(features: Vec<Feature<P>>) -> Self {
        Self {
            kind: "FeatureCollection".to_string(),
            features,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature<P> {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: u64,
    pub geometry: PolygonGeometry,
    pub properties: P,
}

impl<P> Feature<P> {
    pub fn new(id: u64, polygon: &Polygon<f64>, properties: P) -> Self {
        Self {
            kind: "Feature".to_string(),
            id,
            geometry: PolygonGeometry::from(polygon),
            properties,
        }
    }
}

/// GeoJSON `Polygon` geometry: rings of `[longitude, latitude]` positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonGeometry {
    #[serde(rename = "type")]
    pub kind: String,
    pub coordinates: Vec<Vec<[f64; 2]>>,
}

impl From<&Polygon<f64>> for PolygonGeometry {
    fn from(polygon: &Polygon<f64>) -> Self {
        let ring = |ls: &LineString<f64>| ls.0.iter().map(|c| [c.x, c.y]).collect::<Vec<_>>();
        let coordinates = std::iter::once(ring(polygon.exterior()))
            .chain(polygon.interiors().iter().map(ring))
            .collect();
        Self {
            kind: "Polygon".to_string(),
            coordinates,
        }
    }
}

impl PolygonGeometry {
    pub fn to_polygon(&self) -> Result<Polygon<f64>> {
        if self.kind != "Polygon" {
            return Err(Error::Geometry(format!(
                "expected Polygon geometry, found {}",
                self.kind
            )));
        }
        let mut rings = self.coordinates.iter().map(|r| {
            LineString::new(r.iter().map(|p| Coord { x: p[0], y: p[1] }).collect())
        });
        let exterior = rings
            .next()
            .ok_or_else(|| Error::Geometry("polygon has no rings".to_string()))?;
        Ok(Polygon::new(exterior, rings.collect()))
    }
}

/// Properties of one outage-density grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellProperties {
    pub item: u64,
    /// Distinct outage timestamps touching the cell.
    pub outage: u64,
}

/// Properties of one stored outage polygon at a given capture time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutageProperties {
    pub item: u64,
    pub timestamp: i64,
}

/// Feature collection of the outage polygons captured at one timestamp,
/// numbered from 1 in storage order.
pub fn snapshot_collection(records: &[GeometryRecord]) -> FeatureCollection<OutageProperties> {
    let features = records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let item = i as u64 + 1;
            Feature::new(
                item,
                &r.polygon,
                OutageProperties {
                    item,
                    timestamp: r.timestamp,
                },
            )
        })
        .collect();
    FeatureCollection::new(features)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    #[test]
    fn test_feature_json_shape() {
        let poly = polygon![
            (x: -75.79, y: 45.44),
            (x: -75.78, y: 45.44),
            (x: -75.78, y: 45.45),
            (x: -75.79, y: 45.44),
        ];
        let fc = FeatureCollection::new(vec![Feature::new(
            7,
            &poly,
            CellProperties { item: 7, outage: 3 },
        )]);
        let json = serde_json::to_value(&fc).unwrap();
        assert_eq!(json["type"], "FeatureCollection");
        assert_eq!(json["features"][0]["type"], "Feature");
        assert_eq!(json["features"][0]["geometry"]["type"], "Polygon");
        assert_eq!(json["features"][0]["properties"]["item"], 7);
        assert_eq!(json["features"][0]["properties"]["outage"], 3);
        assert_eq!(json["features"][0]["geometry"]["coordinates"][0][1][0], -75.78);
    }

    #[test]
    fn test_geometry_back_to_polygon() {
        let poly = polygon![
            (x: 1.0, y: 1.0),
            (x: 2.0, y: 1.0),
            (x: 2.0, y: 2.0),
            (x: 1.0, y: 1.0),
        ];
        let back = PolygonGeometry::from(&poly).to_polygon().unwrap();
        assert_eq!(back, poly);
    }
}
