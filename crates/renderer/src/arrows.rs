//! Direction glyphs: wind arrows and meteorological wind barbs.
//!
//! Glyphs are defined in their own pixel coordinates with the staff along the
//! positive y axis. Placement rotates that axis onto the on-screen direction
//! the wind blows from, so the angle follows the active projection rather
//! than the raw compass bearing.

use projection::Area;
use qd_common::QdResult;

use crate::path::Path;

/// Keyword selecting the generated barb glyph instead of a path file.
pub const METEOROLOGICAL: &str = "meteorological";

/// Length of the geographic offset used to measure the screen angle, degrees.
const DIRECTION_PROBE: f64 = 0.1;

const STAFF_LENGTH: f64 = 30.0;
const BARB_LENGTH: f64 = 10.0;
const BARB_SPACING: f64 = 4.0;
const CALM_RADIUS: f64 = 4.0;

/// Glyph used for every anchor point.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrowShape {
    /// Barbs generated from the wind speed.
    Meteorological,
    /// A fixed path read from a file.
    Path(Path),
}

impl ArrowShape {
    /// `meteorological` or the name of a path file.
    pub fn load(spec: &str) -> QdResult<Self> {
        if spec == METEOROLOGICAL {
            return Ok(ArrowShape::Meteorological);
        }
        Ok(ArrowShape::Path(Path::read(std::path::Path::new(spec))?))
    }

    fn glyph(&self, speed: Option<f64>) -> Path {
        match self {
            ArrowShape::Meteorological => meteorological_arrow(speed),
            ArrowShape::Path(path) => path.clone(),
        }
    }
}

/// Logarithmic speed scaling `A * log10(B * speed + 1) + C`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedScale {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl Default for SpeedScale {
    fn default() -> Self {
        Self {
            a: 0.0,
            b: 0.0,
            c: 1.0,
        }
    }
}

impl SpeedScale {
    /// Scale factor for a speed. Unknown or non-positive speeds scale by `c`.
    pub fn factor(&self, speed: Option<f64>) -> f64 {
        match speed {
            Some(s) if s > 0.0 => self.a * (self.b * s + 1.0).log10() + self.c,
            _ => self.c,
        }
    }
}

/// Screen angle in radians of a meteorological direction at a point.
///
/// The angle is measured from the positive pixel y axis towards positive x,
/// following a short geographic step towards the direction.
pub fn screen_angle(area: &dyn Area, lon: f64, lat: f64, direction: f64) -> f64 {
    let (x0, y0) = area.to_xy(lon, lat);
    let rad = direction.to_radians();
    let lon1 = lon + rad.sin() * DIRECTION_PROBE;
    let lat1 = lat + rad.cos() * DIRECTION_PROBE;
    let (x1, y1) = area.to_xy(lon1, lat1);
    (x1 - x0).atan2(y1 - y0)
}

/// Build the glyph for one anchor point in pixel coordinates.
pub fn place_arrow(
    shape: &ArrowShape,
    speed: Option<f64>,
    scale: &SpeedScale,
    arrow_scale: f64,
    angle: f64,
    x: f64,
    y: f64,
) -> Path {
    let mut path = shape.glyph(speed.map(|s| s * scale.c));
    path.scale(scale.factor(speed));
    path.scale(arrow_scale);
    path.rotate(-angle.to_degrees());
    path.translate(x, y);
    path
}

/// A wind barb for a speed in m/s.
///
/// Pennants count 25 m/s, full barbs 5 m/s and half barbs 2.5 m/s. Calm
/// winds draw a small circle, an unknown speed only the staff.
pub fn meteorological_arrow(speed: Option<f64>) -> Path {
    let mut path = Path::new();

    let Some(speed) = speed.filter(|s| *s >= 0.0) else {
        path.add_polyline(&[(0.0, 0.0), (0.0, STAFF_LENGTH)]);
        return path;
    };

    let mut units = (speed / 2.5).round() as i64;
    if units == 0 {
        let ring: Vec<(f64, f64)> = (0..=16)
            .map(|k| {
                let a = k as f64 / 16.0 * std::f64::consts::TAU;
                (CALM_RADIUS * a.cos(), CALM_RADIUS * a.sin())
            })
            .collect();
        path.add_polyline(&ring);
        return path;
    }

    path.add_polyline(&[(0.0, 0.0), (0.0, STAFF_LENGTH)]);

    let mut y = STAFF_LENGTH;
    while units >= 10 {
        path.add_polygon(&[(0.0, y), (BARB_LENGTH, y - BARB_SPACING / 2.0), (0.0, y - BARB_SPACING)]);
        y -= BARB_SPACING + 1.0;
        units -= 10;
    }
    while units >= 2 {
        path.add_polyline(&[(0.0, y), (BARB_LENGTH, y + BARB_SPACING)]);
        y -= BARB_SPACING;
        units -= 2;
    }
    if units == 1 {
        // A lone half barb is set off from the staff end
        if y == STAFF_LENGTH {
            y -= BARB_SPACING;
        }
        path.add_polyline(&[(0.0, y), (BARB_LENGTH / 2.0, y + BARB_SPACING / 2.0)]);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathOp;
    use projection::{parse_area, MapArea};

    fn area() -> MapArea {
        parse_area("latlon:20,60,30,70:100,100").unwrap()
    }

    fn subpaths(path: &Path) -> usize {
        path.elements().iter().filter(|e| e.op == PathOp::MoveTo).count()
    }

    #[test]
    fn test_speed_scale() {
        let scale = SpeedScale { a: 2.0, b: 9.0, c: 1.0 };
        assert_eq!(scale.factor(None), 1.0);
        assert_eq!(scale.factor(Some(0.0)), 1.0);
        assert!((scale.factor(Some(1.0)) - 3.0).abs() < 1e-12);
        assert_eq!(SpeedScale::default().factor(Some(10.0)), 1.0);
    }

    #[test]
    fn test_unknown_speed_scales_by_c() {
        let shape = ArrowShape::Path(Path::parse_svg("M0 0 L0 10").unwrap());
        let scale = SpeedScale { a: 0.0, b: 0.0, c: 2.0 };
        let path = place_arrow(&shape, None, &scale, 1.0, 0.0, 0.0, 0.0);
        let (x1, y1, x2, y2) = path.bounding_box().unwrap();
        assert!((x2 - x1).abs() < 1e-9);
        assert!((y2 - y1 - 20.0).abs() < 1e-9);

        let calm = place_arrow(&shape, Some(-1.0), &scale, 1.0, 0.0, 0.0, 0.0);
        let (_, y1, _, y2) = calm.bounding_box().unwrap();
        assert!((y2 - y1 - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_screen_angle_latlon() {
        let area = area();
        // Wind from the north points up on screen
        let north = screen_angle(&area, 25.0, 65.0, 0.0);
        assert!((north.abs() - std::f64::consts::PI).abs() < 1e-9);
        // Wind from the east points right
        let east = screen_angle(&area, 25.0, 65.0, 90.0);
        assert!((east - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn test_place_arrow_rotates_staff_towards_direction() {
        let area = area();
        let angle = screen_angle(&area, 25.0, 65.0, 90.0);
        let path = place_arrow(&ArrowShape::Meteorological, None, &SpeedScale::default(), 1.0, angle, 50.0, 50.0);
        let end = path.elements()[1];
        assert!((end.x - (50.0 + STAFF_LENGTH)).abs() < 1e-9);
        assert!((end.y - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_barb_counts() {
        // 12.5 m/s = two full barbs and a half barb, plus the staff
        assert_eq!(subpaths(&meteorological_arrow(Some(12.5))), 4);
        // 30 m/s = pennant and a full barb
        let barb = meteorological_arrow(Some(30.0));
        assert_eq!(subpaths(&barb), 3);
        assert_eq!(barb.elements().iter().filter(|e| e.op == PathOp::Close).count(), 1);
        // Unknown speed draws the staff only
        assert_eq!(subpaths(&meteorological_arrow(None)), 1);
    }

    #[test]
    fn test_calm_is_a_circle() {
        let calm = meteorological_arrow(Some(0.5));
        let (x1, y1, x2, y2) = calm.bounding_box().unwrap();
        assert!((x2 - x1 - 2.0 * CALM_RADIUS).abs() < 1e-9);
        assert!((y2 - y1 - 2.0 * CALM_RADIUS).abs() < 1e-6);
    }

    #[test]
    fn test_load_shape() {
        assert_eq!(ArrowShape::load(METEOROLOGICAL).unwrap(), ArrowShape::Meteorological);
        assert!(ArrowShape::load("/no/such/arrow.svg").is_err());

        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("arrow.svg");
        std::fs::write(&file, "M0 0 L0 10").unwrap();
        let shape = ArrowShape::load(file.to_str().unwrap()).unwrap();
        assert!(matches!(shape, ArrowShape::Path(p) if p.len() == 2));
    }
}
