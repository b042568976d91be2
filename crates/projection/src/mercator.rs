//! Spherical Mercator projection.

use std::f64::consts::PI;

use crate::{Projection, EARTH_RADIUS};

/// Latitudes are clamped to this value to keep the projection finite.
const MAX_LAT: f64 = 89.5;

#[derive(Debug, Clone, Copy, Default)]
pub struct Mercator;

impl Projection for Mercator {
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let lat = lat.clamp(-MAX_LAT, MAX_LAT).to_radians();
        let x = EARTH_RADIUS * lon.to_radians();
        let y = EARTH_RADIUS * (PI / 4.0 + lat / 2.0).tan().ln();
        (x, y)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let lon = (x / EARTH_RADIUS).to_degrees();
        let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
        (lon, lat)
    }

    fn name(&self) -> &'static str {
        "mercator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equator_is_zero() {
        let (x, y) = Mercator.forward(0.0, 0.0);
        assert!(x.abs() < 1e-9);
        assert!(y.abs() < 1e-9);
    }

    #[test]
    fn test_roundtrip() {
        let (x, y) = Mercator.forward(-45.0, 52.5);
        let (lon, lat) = Mercator.inverse(x, y);
        assert!((lon + 45.0).abs() < 1e-9);
        assert!((lat - 52.5).abs() < 1e-9);
    }

    #[test]
    fn test_latitude_stretches_northward() {
        let (_, y30) = Mercator.forward(0.0, 30.0);
        let (_, y60) = Mercator.forward(0.0, 60.0);
        assert!(y60 > 2.0 * y30);
    }
}
