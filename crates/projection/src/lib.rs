//! Map projections and the rendering area built on them.
//!
//! Implements map projections from scratch without external dependencies.
//! A [`MapArea`] combines a [`Projection`] with a geographic rectangle and
//! an image size, giving conversions between geographic, world (metres)
//! and pixel coordinates.

pub mod area;
pub mod geographic;
pub mod mercator;
pub mod stereographic;

pub use area::{parse_area, Area, MapArea};
pub use geographic::LatLon;
pub use mercator::Mercator;
pub use stereographic::Stereographic;

/// Mean earth radius in metres used by every spherical projection here.
pub const EARTH_RADIUS: f64 = 6_371_220.0;

/// Forward and inverse transform between geographic degrees and world metres.
pub trait Projection: Send + Sync + std::fmt::Debug {
    /// `(lon, lat)` in degrees to world `(x, y)` in metres, y growing north.
    fn forward(&self, lon: f64, lat: f64) -> (f64, f64);

    /// World `(x, y)` in metres back to `(lon, lat)` in degrees.
    fn inverse(&self, x: f64, y: f64) -> (f64, f64);

    /// Short name, as used in projection descriptions.
    fn name(&self) -> &'static str;
}

/// Wrap a longitude difference into `[-PI, PI]`.
pub(crate) fn normalize_dlon(mut dlon: f64) -> f64 {
    use std::f64::consts::PI;
    while dlon > PI {
        dlon -= 2.0 * PI;
    }
    while dlon < -PI {
        dlon += 2.0 * PI;
    }
    dlon
}
