//! Map projection seam
//!
//! The engine works in a projected plane. Mapping to geographic coordinates is
//! a pure function supplied by the caller; only the local tangent plane is
//! provided here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Mean Earth radius (m).
pub const EARTH_RADIUS: f64 = 6_371_000.0;

/// Pure mapping between projected metres and geographic degrees.
pub trait MapProjection: Send + Sync + fmt::Debug {
    /// Projected (x, y) in metres to (longitude, latitude) in degrees.
    fn to_geographic(&self, x: f64, y: f64) -> (f64, f64);

    /// (longitude, latitude) in degrees to projected (x, y) in metres.
    fn from_geographic(&self, lon: f64, lat: f64) -> (f64, f64);
}

/// Equirectangular local tangent plane about a reference point.
///
/// Adequate for regional domains of a few hundred kilometres.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaneProjection {
    pub reference_lon: f64,
    pub reference_lat: f64,
}

impl PlaneProjection {
    pub fn new(reference_lon: f64, reference_lat: f64) -> Self {
        Self {
            reference_lon,
            reference_lat,
        }
    }

    #[inline]
    fn cos_ref(&self) -> f64 {
        self.reference_lat.to_radians().cos().max(1e-6)
    }
}

impl MapProjection for PlaneProjection {
    fn to_geographic(&self, x: f64, y: f64) -> (f64, f64) {
        let lat = self.reference_lat + (y / EARTH_RADIUS).to_degrees();
        let lon = self.reference_lon + (x / (EARTH_RADIUS * self.cos_ref())).to_degrees();
        (lon, lat)
    }

    fn from_geographic(&self, lon: f64, lat: f64) -> (f64, f64) {
        let x = (lon - self.reference_lon).to_radians() * EARTH_RADIUS * self.cos_ref();
        let y = (lat - self.reference_lat).to_radians() * EARTH_RADIUS;
        (x, y)
    }
}

/// Serializable projection choice for run configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ProjectionSpec {
    Plane { reference_lon: f64, reference_lat: f64 },
}

impl Default for ProjectionSpec {
    fn default() -> Self {
        Self::Plane {
            reference_lon: 0.0,
            reference_lat: 45.0,
        }
    }
}

impl ProjectionSpec {
    pub fn build(&self) -> Arc<dyn MapProjection> {
        match *self {
            Self::Plane {
                reference_lon,
                reference_lat,
            } => Arc::new(PlaneProjection::new(reference_lon, reference_lat)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn plane_projection_round_trips_near_reference() {
        let p = PlaneProjection::new(10.0, 47.0);
        let (x, y) = p.from_geographic(10.5, 47.25);
        let (lon, lat) = p.to_geographic(x, y);
        assert_relative_eq!(lon, 10.5, epsilon = 1e-9);
        assert_relative_eq!(lat, 47.25, epsilon = 1e-9);
        // a quarter degree of latitude is ~27.8 km
        assert!((y - 27_799.0).abs() < 50.0, "{y}");
    }
}
