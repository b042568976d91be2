//! Interpolation of field values between grid nodes.

use qd_common::Field;

/// Bilinear interpolation.
///
/// `x` and `y` are fractional grid coordinates. Corners outside the grid
/// count as missing, and any missing corner makes the result missing.
pub fn bilinear(field: &Field, x: f64, y: f64) -> Option<f32> {
    if !x.is_finite() || !y.is_finite() {
        return None;
    }
    let i = x.floor() as i64;
    let j = y.floor() as i64;

    let v00 = field.at(i, j);
    let v10 = field.at(i + 1, j);
    let v01 = field.at(i, j + 1);
    let v11 = field.at(i + 1, j + 1);

    bilinear_from_corners(x - i as f64, y - j as f64, v00, v10, v01, v11)
}

/// Bilinear interpolation from four corner values and the fractional
/// offsets inside the cell. All four corners must be present.
pub fn bilinear_from_corners(
    dx: f64,
    dy: f64,
    v00: Option<f32>,
    v10: Option<f32>,
    v01: Option<f32>,
    v11: Option<f32>,
) -> Option<f32> {
    let (v00, v10, v01, v11) = (v00? as f64, v10? as f64, v01? as f64, v11? as f64);
    let bottom = v00 * (1.0 - dx) + v10 * dx;
    let top = v01 * (1.0 - dx) + v11 * dx;
    Some((bottom * (1.0 - dy) + top * dy) as f32)
}
