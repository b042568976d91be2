//! Oblique stereographic projection.
//!
//! The projection parameters include:
//! - Central longitude: the meridian that is vertical on the map
//! - Central latitude: the tangent point latitude (90 for polar stereographic)
//! - True latitude: the latitude at which the scale is exact

use crate::{normalize_dlon, Projection, EARTH_RADIUS};

#[derive(Debug, Clone)]
pub struct Stereographic {
    /// Central meridian in radians
    lon0: f64,
    /// Latitude of the tangent point in radians
    lat0: f64,
    /// Scale factor making distances exact at the true latitude
    k0: f64,
}

impl Stereographic {
    pub fn new(central_lon: f64, central_lat: f64, true_lat: f64) -> Self {
        let true_lat = true_lat.to_radians();
        Self {
            lon0: central_lon.to_radians(),
            lat0: central_lat.to_radians(),
            k0: (1.0 + true_lat.abs().sin()) / 2.0,
        }
    }

    /// Polar stereographic centred on the north pole, true at 60N.
    pub fn polar() -> Self {
        Self::new(20.0, 90.0, 60.0)
    }
}

impl Projection for Stereographic {
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64) {
        let lat = lat.to_radians();
        let dlon = normalize_dlon(lon.to_radians() - self.lon0);

        let denom = 1.0 + self.lat0.sin() * lat.sin() + self.lat0.cos() * lat.cos() * dlon.cos();
        // The antipode of the tangent point has no image
        let denom = denom.max(1e-12);
        let k = 2.0 * EARTH_RADIUS * self.k0 / denom;

        let x = k * lat.cos() * dlon.sin();
        let y = k * (self.lat0.cos() * lat.sin() - self.lat0.sin() * lat.cos() * dlon.cos());
        (x, y)
    }

    fn inverse(&self, x: f64, y: f64) -> (f64, f64) {
        let x = x / self.k0;
        let y = y / self.k0;
        let rho = (x * x + y * y).sqrt();
        if rho < 1e-9 {
            return (self.lon0.to_degrees(), self.lat0.to_degrees());
        }
        let c = 2.0 * (rho / (2.0 * EARTH_RADIUS)).atan();

        let lat = (c.cos() * self.lat0.sin() + y * c.sin() * self.lat0.cos() / rho).asin();
        let lon = self.lon0
            + (x * c.sin()).atan2(rho * self.lat0.cos() * c.cos() - y * self.lat0.sin() * c.sin());

        (normalize_dlon(lon).to_degrees(), lat.to_degrees())
    }

    fn name(&self) -> &'static str {
        "stereographic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pole_maps_to_origin() {
        let proj = Stereographic::polar();
        let (x, y) = proj.forward(0.0, 90.0);
        assert!(x.abs() < 1e-6 && y.abs() < 1e-6);
    }

    #[test]
    fn test_central_meridian_is_vertical() {
        let proj = Stereographic::polar();
        let (x, y) = proj.forward(20.0, 60.0);
        assert!(x.abs() < 1e-6, "x should be ~0, got {}", x);
        assert!(y < 0.0, "south of the pole is below it, got {}", y);
    }

    #[test]
    fn test_roundtrip() {
        let proj = Stereographic::new(25.0, 90.0, 60.0);
        for (lon, lat) in [(6.0, 51.3), (49.0, 70.2), (25.0, 60.0), (-10.0, 40.0)] {
            let (x, y) = proj.forward(lon, lat);
            let (lon2, lat2) = proj.inverse(x, y);
            assert!((lon - lon2).abs() < 1e-6, "lon {} vs {}", lon, lon2);
            assert!((lat - lat2).abs() < 1e-6, "lat {} vs {}", lat, lat2);
        }
    }

    #[test]
    fn test_oblique_roundtrip() {
        let proj = Stereographic::new(10.0, 45.0, 45.0);
        let (x, y) = proj.forward(15.0, 50.0);
        let (lon, lat) = proj.inverse(x, y);
        assert!((lon - 15.0).abs() < 1e-6);
        assert!((lat - 50.0).abs() < 1e-6);
    }
}
