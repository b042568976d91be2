//! Plate carrée: longitude and latitude scaled linearly to metres.

use crate::{Projection, EARTH_RADIUS};

#[derive(Debug, Clone, Copy, Default)]
pub struct LatLon;

impl Projection for LatLon {
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        (
            EARTH_RADIUS * lon.to_radians(),
            EARTH_RADIUS * lat.to_radians(),
        )
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        ((x / EARTH_RADIUS).to_degrees(), (y / EARTH_RADIUS).to_degrees())
    }

    fn name(&self) -> &'static str {
        "latlon"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let p = LatLon;
        let (x, y) = p.forward(25.0, 60.0);
        let (lon, lat) = p.inverse(x, y);
        assert!((lon - 25.0).abs() < 1e-9);
        assert!((lat - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_linear_in_degrees() {
        let p = LatLon;
        let (x1, _) = p.forward(10.0, 0.0);
        let (x2, _) = p.forward(20.0, 0.0);
        assert!((x2 - 2.0 * x1).abs() < 1e-6);
    }
}
