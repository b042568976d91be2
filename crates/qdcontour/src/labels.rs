//! Label points: value sampling, masking and drawing.

use projection::Area;
use qd_common::{Field, GridSpec, QdResult};
use querydata::bilinear;
use renderer::text::{draw_text, draw_text_with_halo, format_value};
use renderer::{Canvas, FontLibrary, TextStyle};

use crate::spec::{ContourSpec, LabelPoint};

/// Grid coordinates closer than this to a node use the node value.
const NODE_TOLERANCE: f64 = 1e-5;

/// Value of a field at a geographic point.
///
/// Points on a grid node take the node value, others are interpolated
/// bilinearly and are missing if any surrounding node is missing.
pub fn sample_value(field: &Field, grid: &GridSpec, lon: f64, lat: f64) -> Option<f32> {
    let (x, y) = grid.lon_lat_to_grid(lon, lat);
    let (ri, rj) = (x.round(), y.round());
    if (x - ri).abs() < NODE_TOLERANCE && (y - rj).abs() < NODE_TOLERANCE {
        return field.at(ri as i64, rj as i64);
    }
    bilinear(field, x, y)
}

/// Label points at every `dx`:th column and `dy`:th row of a grid.
pub fn grid_label_points(grid: &GridSpec, dx: usize, dy: usize) -> Vec<LabelPoint> {
    if dx == 0 || dy == 0 {
        return Vec::new();
    }
    let mut points = Vec::new();
    for j in (0..grid.ny).step_by(dy) {
        for i in (0..grid.nx).step_by(dx) {
            let (lon, lat) = grid.lon_lat(i, j);
            points.push(LabelPoint::new(lon, lat));
        }
    }
    points
}

/// A point is masked when the mask pixel under it is not fully
/// transparent. Points outside the mask use its top left pixel.
pub fn is_masked(mask: Option<&Canvas>, x: f64, y: f64) -> bool {
    let Some(mask) = mask else {
        return false;
    };
    let (px, py) = (x.round(), y.round());
    let inside = px >= 0.0 && py >= 0.0 && px < mask.width() as f64 && py < mask.height() as f64;
    let pixel = if inside {
        mask.pixel(px as u32, py as u32)
    } else {
        mask.pixel(0, 0)
    };
    pixel.is_some_and(|c| c.a != 0)
}

/// Sample every label point of a spec into `label_values`.
pub fn sample_labels(spec: &mut ContourSpec, field: &Field, grid: &GridSpec) {
    spec.label_values = spec
        .label_points
        .iter()
        .map(|p| sample_value(field, grid, p.lon, p.lat))
        .collect();
}

fn label_xy(point: &LabelPoint, area: &dyn Area) -> (f64, f64) {
    point.pixel.unwrap_or_else(|| area.to_xy(point.lon, point.lat))
}

/// Composite the marker image at every unmasked label point.
pub fn draw_markers(canvas: &mut Canvas, spec: &ContourSpec, area: &dyn Area, mask: Option<&Canvas>) {
    let Some(marker) = &spec.label.marker else {
        return;
    };
    for (k, point) in spec.label_points.iter().enumerate() {
        let (x, y) = area.to_xy(point.lon, point.lat);
        if is_masked(mask, x, y) {
            continue;
        }
        let value = spec.label_values.get(k).copied().flatten();
        if value.is_none() && spec.label.missing.is_empty() {
            continue;
        }
        canvas.composite_centered(&marker.image, x, y, marker.rule, marker.alpha);
    }
}

/// Draw the value texts and captions of a spec.
pub fn draw_texts(
    canvas: &mut Canvas,
    spec: &ContourSpec,
    area: &dyn Area,
    mask: Option<&Canvas>,
    fonts: &mut FontLibrary,
) -> QdResult<()> {
    let label = &spec.label;
    if label.format.is_empty() || spec.label_points.is_empty() {
        return Ok(());
    }

    let style = TextStyle {
        font: fonts.font(&label.font)?,
        size: label.size,
        color: label.fill_color,
        rule: label.fill_rule,
        align: label.align,
        angle: label.angle,
    };
    let halo = (!label.stroke_color.is_transparent()).then_some((label.stroke_color, label.stroke_rule));
    let caption_style = TextStyle {
        align: label.caption_align,
        ..style.clone()
    };

    for (k, point) in spec.label_points.iter().enumerate() {
        let (x, y) = label_xy(point, area);
        if is_masked(mask, x, y) {
            continue;
        }
        let text = match spec.label_values.get(k).copied().flatten() {
            Some(value) => format_value(&label.format, value as f64),
            None => label.missing.clone(),
        };
        if text.is_empty() {
            continue;
        }

        let tx = (x + label.offset.0) as f32;
        let ty = (y + label.offset.1) as f32;
        draw_text_with_halo(canvas, &style, halo, &text, tx, ty);

        if !label.caption.is_empty() {
            let cx = tx + label.caption_offset.0 as f32;
            let cy = ty + label.caption_offset.1 as f32;
            draw_text(canvas, &caption_style, &label.caption, cx, cy);
        }
    }
    Ok(())
}
