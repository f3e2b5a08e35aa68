//! Request-side types shared by the CLI and the HTTP API.

use anyhow::{bail, Result};
use geo::Point;
use serde::{Deserialize, Serialize};

/// A WGS84 location as users type it: latitude first.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

impl Location {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Validated geometry point (`x` = longitude, `y` = latitude).
    pub fn to_point(&self) -> Result<Point<f64>> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            bail!("lat must be in [-90, 90], got {}", self.lat);
        }
        if !self.lon.is_finite() || !(-180.0..=180.0).contains(&self.lon) {
            bail!("lon must be in [-180, 180], got {}", self.lon);
        }
        Ok(Point::new(self.lon, self.lat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_axis_order() {
        let p = Location::new(45.446892, -75.790369).to_point().unwrap();
        assert_eq!(p.x(), -75.790369);
        assert_eq!(p.y(), 45.446892);
    }

    #[test]
    fn test_out_of_range_rejected() {
        assert!(Location::new(91.0, 0.0).to_point().is_err());
        assert!(Location::new(0.0, -181.0).to_point().is_err());
        assert!(Location::new(f64::NAN, 0.0).to_point().is_err());
    }
}
