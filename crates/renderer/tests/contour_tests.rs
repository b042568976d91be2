//! Tests for contour tracing, caching and drawing the result.

use std::sync::Arc;

use projection::parse_area;
use qd_common::{BlendRule, Color, Field};
use renderer::cache::ContourCache;
use renderer::canvas::Canvas;
use renderer::contour::{ContourEngine, ContourRequest, DefaultContourEngine, Interpolation};
use test_utils::{areas, assert_approx_eq, create_constant_field, create_field_with_missing, small_grid};

/// Value equals the column index.
fn column_field() -> Field {
    let mut field = Field::filled(5, 5, None);
    for j in 0..5 {
        for i in 0..5 {
            field.set(i, j, Some(i as f32));
        }
    }
    field
}

// ============================================================================
// Fill bands
// ============================================================================

#[test]
fn test_band_covering_everything_spans_the_grid() {
    let field = create_constant_field(5, 5, 5.0);
    let path = DefaultContourEngine.contour(&field, &small_grid(), &ContourRequest::band(Some(0.0), Some(10.0)));
    let (x1, y1, x2, y2) = path.bounding_box().unwrap();
    assert_approx_eq!(x1, 20.0, 1e-9);
    assert_approx_eq!(y1, 60.0, 1e-9);
    assert_approx_eq!(x2, 28.0, 1e-9);
    assert_approx_eq!(y2, 68.0, 1e-9);
}

#[test]
fn test_band_outside_values_is_empty() {
    let field = create_constant_field(5, 5, 5.0);
    let path = DefaultContourEngine.contour(&field, &small_grid(), &ContourRequest::band(Some(10.0), Some(20.0)));
    assert!(path.is_empty());
}

#[test]
fn test_band_is_clipped_between_columns() {
    let path = DefaultContourEngine.contour(&column_field(), &small_grid(), &ContourRequest::band(Some(1.0), Some(3.0)));
    let (x1, _, x2, _) = path.bounding_box().unwrap();
    // Columns 1 and 3 lie at 22 and 26 degrees
    assert_approx_eq!(x1, 22.0, 1e-6);
    assert_approx_eq!(x2, 26.0, 1e-6);
}

#[test]
fn test_missing_band_covers_cells_with_missing_corners() {
    let field = create_field_with_missing(5, 5, 1.0, &[(0, 0)]);
    let path = DefaultContourEngine.contour(&field, &small_grid(), &ContourRequest::band(None, None));
    let (x1, y1, x2, y2) = path.bounding_box().unwrap();
    assert_eq!((x1, y1, x2, y2), (20.0, 60.0, 22.0, 62.0));

    let complete = create_constant_field(5, 5, 1.0);
    assert!(DefaultContourEngine
        .contour(&complete, &small_grid(), &ContourRequest::band(None, None))
        .is_empty());
}

#[test]
fn test_discrete_band_uses_whole_cells() {
    let request = ContourRequest {
        interpolation: Interpolation::Discrete,
        ..ContourRequest::band(Some(2.0), Some(3.0))
    };
    let path = DefaultContourEngine.contour(&column_field(), &small_grid(), &request);
    let (x1, _, x2, _) = path.bounding_box().unwrap();
    assert_approx_eq!(x1, 24.0, 1e-9);
    assert_approx_eq!(x2, 26.0, 1e-9);
}

// ============================================================================
// Isolines
// ============================================================================

#[test]
fn test_isoline_follows_the_level() {
    let path = DefaultContourEngine.contour(&column_field(), &small_grid(), &ContourRequest::line(2.5));
    assert!(!path.is_empty());
    for e in path.elements() {
        assert_approx_eq!(e.x, 25.0, 1e-9);
    }
    let (_, y1, _, y2) = path.bounding_box().unwrap();
    assert_approx_eq!(y1, 60.0, 1e-9);
    assert_approx_eq!(y2, 68.0, 1e-9);
}

#[test]
fn test_isoline_with_depth_stays_on_level() {
    let request = ContourRequest {
        depth: 2,
        ..ContourRequest::line(1.6)
    };
    let path = DefaultContourEngine.contour(&column_field(), &small_grid(), &request);
    assert!(!path.is_empty());
    for e in path.elements() {
        assert_approx_eq!(e.x, 23.2, 1e-4);
    }
}

// ============================================================================
// Cache
// ============================================================================

#[test]
fn test_cache_reuses_geometry() {
    let mut cache = ContourCache::new();
    let field = column_field();
    let request = ContourRequest::band(Some(1.0), Some(3.0));

    let first = cache.contour(&DefaultContourEngine, &field, &small_grid(), &request);
    assert!(!cache.was_cached());
    let second = cache.contour(&DefaultContourEngine, &field, &small_grid(), &request);
    assert!(cache.was_cached());
    assert!(Arc::ptr_eq(&first, &second));

    cache.clear();
    let third = cache.contour(&DefaultContourEngine, &field, &small_grid(), &request);
    assert!(!cache.was_cached());
    assert_eq!(*first, *third);
}

// ============================================================================
// Drawing
// ============================================================================

#[test]
fn test_projected_band_fills_the_canvas() {
    let area = parse_area(areas::SMALL_LATLON).unwrap();
    let field = create_constant_field(5, 5, 5.0);
    let mut path = DefaultContourEngine.contour(&field, &small_grid(), &ContourRequest::band(Some(0.0), Some(10.0)));
    path.project(&area);

    let mut canvas = Canvas::new(100, 100).unwrap();
    canvas.fill_path(&path, Color::rgb(0, 128, 0), BlendRule::Over);
    assert_eq!(canvas.pixel(50, 50), Some(Color::rgb(0, 128, 0)));
    assert_eq!(canvas.pixel(2, 97), Some(Color::rgb(0, 128, 0)));
}
