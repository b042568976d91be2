//! Contour geometry extraction.
//!
//! Fill bands are built per grid cell: each cell is split into two triangles
//! and every triangle is clipped in value space to the band limits. Isolines
//! use marching squares with segment joining. All geometry is returned in
//! geographic coordinates using the grid definition, ready to be projected.

use std::collections::HashMap;

use qd_common::{Field, GridSpec, QdError, QdResult};

use crate::path::Path;

/// How values vary between grid nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Interpolation {
    /// Bilinear variation inside each cell.
    #[default]
    Linear,
    /// Each node's value covers the half cell around it.
    Nearest,
    /// The lower left corner value covers the whole cell.
    Discrete,
}

impl Interpolation {
    pub fn parse(s: &str) -> QdResult<Self> {
        match s {
            "Linear" => Ok(Interpolation::Linear),
            "Nearest" => Ok(Interpolation::Nearest),
            "Discrete" => Ok(Interpolation::Discrete),
            other => Err(QdError::UnknownInterpolation(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Interpolation::Linear => "Linear",
            Interpolation::Nearest => "Nearest",
            Interpolation::Discrete => "Discrete",
        }
    }
}

/// Arguments of one contouring request.
///
/// `lo`/`hi` set to `None` mean unbounded. Both `None` selects the cells
/// containing missing values. `hi == None` with `isoline` set traces the
/// isoline at `lo`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContourRequest {
    pub lo: Option<f32>,
    pub hi: Option<f32>,
    pub exact_lo: bool,
    pub exact_hi: bool,
    pub data_lo: Option<f32>,
    pub data_hi: Option<f32>,
    pub depth: u32,
    pub interpolation: Interpolation,
    pub keep_triangles: bool,
    pub isoline: bool,
}

impl ContourRequest {
    /// A fill band `[lo, hi)`.
    pub fn band(lo: Option<f32>, hi: Option<f32>) -> Self {
        Self {
            lo,
            hi,
            exact_lo: true,
            exact_hi: false,
            data_lo: None,
            data_hi: None,
            depth: 0,
            interpolation: Interpolation::Linear,
            keep_triangles: false,
            isoline: false,
        }
    }

    /// An isoline at `value`.
    pub fn line(value: f32) -> Self {
        Self {
            isoline: true,
            ..Self::band(Some(value), None)
        }
    }

    fn clamp(&self, v: f32) -> f32 {
        let v = match self.data_lo {
            Some(lo) if v < lo => lo,
            _ => v,
        };
        match self.data_hi {
            Some(hi) if v > hi => hi,
            _ => v,
        }
    }

    fn contains(&self, v: f32) -> bool {
        let above_lo = match self.lo {
            None => true,
            Some(lo) => v > lo || (self.exact_lo && v == lo),
        };
        let below_hi = match self.hi {
            None => true,
            Some(hi) => v < hi || (self.exact_hi && v == hi),
        };
        above_lo && below_hi
    }

    fn is_missing_band(&self) -> bool {
        self.lo.is_none() && self.hi.is_none() && !self.isoline
    }
}

/// Traces contour geometry from a field.
pub trait ContourEngine: Send + Sync {
    fn contour(&self, field: &Field, grid: &GridSpec, request: &ContourRequest) -> Path;
}

/// The built-in triangle clipping and marching squares engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultContourEngine;

impl ContourEngine for DefaultContourEngine {
    fn contour(&self, field: &Field, grid: &GridSpec, request: &ContourRequest) -> Path {
        let (nx, ny) = field.shape();
        let mut out = Path::new();
        if nx < 2 || ny < 2 {
            return out;
        }

        let to_geo = |x: f64, y: f64| grid.grid_to_lon_lat(x, y);

        if request.is_missing_band() {
            missing_cells(field, &mut out, &to_geo);
            return out;
        }

        match (request.interpolation, request.isoline) {
            (Interpolation::Linear, false) => linear_band(field, request, &mut out, &to_geo),
            (Interpolation::Linear, true) => {
                if let Some(level) = request.lo {
                    let segments = march_squares(field, request, level);
                    for line in connect_segments(segments) {
                        let points: Vec<(f64, f64)> =
                            line.iter().map(|&(x, y)| to_geo(x, y)).collect();
                        out.add_polyline(&points);
                    }
                }
            }
            (Interpolation::Nearest, isoline) => {
                stepped_geometry(field, request, isoline, Stepping::Nearest, &mut out, &to_geo)
            }
            (Interpolation::Discrete, isoline) => {
                stepped_geometry(field, request, isoline, Stepping::Discrete, &mut out, &to_geo)
            }
        }
        out
    }
}

/// Corner values of one (sub)cell, in counter-clockwise order starting at
/// the lower left corner: `(x0,y0) (x1,y0) (x1,y1) (x0,y1)`.
struct Cell {
    x0: f64,
    y0: f64,
    size: f64,
    v: [f32; 4],
}

/// Visit all complete cells, subdivided `depth` times with bilinear refinement.
fn for_each_cell(field: &Field, request: &ContourRequest, mut visit: impl FnMut(&Cell)) {
    let (nx, ny) = field.shape();
    let n = 1usize << request.depth.min(8);
    let size = 1.0 / n as f64;

    for j in 0..ny - 1 {
        for i in 0..nx - 1 {
            let corners = [
                field.get(i, j),
                field.get(i + 1, j),
                field.get(i + 1, j + 1),
                field.get(i, j + 1),
            ];
            let [Some(a), Some(b), Some(c), Some(d)] = corners else {
                continue;
            };
            let [a, b, c, d] = [a, b, c, d].map(|v| request.clamp(v));

            if n == 1 {
                visit(&Cell {
                    x0: i as f64,
                    y0: j as f64,
                    size,
                    v: [a, b, c, d],
                });
                continue;
            }

            let at = |fx: f64, fy: f64| -> f32 {
                let bottom = a as f64 * (1.0 - fx) + b as f64 * fx;
                let top = d as f64 * (1.0 - fx) + c as f64 * fx;
                (bottom * (1.0 - fy) + top * fy) as f32
            };
            for sj in 0..n {
                for si in 0..n {
                    let fx0 = si as f64 * size;
                    let fy0 = sj as f64 * size;
                    let fx1 = fx0 + size;
                    let fy1 = fy0 + size;
                    visit(&Cell {
                        x0: i as f64 + fx0,
                        y0: j as f64 + fy0,
                        size,
                        v: [at(fx0, fy0), at(fx1, fy0), at(fx1, fy1), at(fx0, fy1)],
                    });
                }
            }
        }
    }
}

fn missing_cells(field: &Field, out: &mut Path, to_geo: &impl Fn(f64, f64) -> (f64, f64)) {
    let (nx, ny) = field.shape();
    for j in 0..ny - 1 {
        for i in 0..nx - 1 {
            let missing = field.get(i, j).is_none()
                || field.get(i + 1, j).is_none()
                || field.get(i + 1, j + 1).is_none()
                || field.get(i, j + 1).is_none();
            if missing {
                let (x, y) = (i as f64, j as f64);
                out.add_polygon(&[
                    to_geo(x, y),
                    to_geo(x + 1.0, y),
                    to_geo(x + 1.0, y + 1.0),
                    to_geo(x, y + 1.0),
                ]);
            }
        }
    }
}

fn linear_band(
    field: &Field,
    request: &ContourRequest,
    out: &mut Path,
    to_geo: &impl Fn(f64, f64) -> (f64, f64),
) {
    for_each_cell(field, request, |cell| {
        let (x0, y0) = (cell.x0, cell.y0);
        let (x1, y1) = (cell.x0 + cell.size, cell.y0 + cell.size);
        let corners = [(x0, y0), (x1, y0), (x1, y1), (x0, y1)];

        if !request.keep_triangles && cell.v.iter().all(|&v| request.contains(v)) {
            let quad: Vec<(f64, f64)> = corners.iter().map(|&(x, y)| to_geo(x, y)).collect();
            out.add_polygon(&quad);
            return;
        }

        for tri in [[0usize, 1, 2], [0, 2, 3]] {
            let polygon: Vec<(f64, f64, f32)> = tri
                .iter()
                .map(|&k| (corners[k].0, corners[k].1, cell.v[k]))
                .collect();
            let clipped = clip_triangle(polygon, request);
            // Slivers left by clipping through a vertex are dropped
            if clipped.len() >= 3 && polygon_area(&clipped) > 1e-12 {
                let points: Vec<(f64, f64)> = clipped.iter().map(|&(x, y, _)| to_geo(x, y)).collect();
                out.add_polygon(&points);
            }
        }
    });
}

/// Sutherland-Hodgman clipping of a polygon against the band limits in value space.
fn clip_triangle(polygon: Vec<(f64, f64, f32)>, request: &ContourRequest) -> Vec<(f64, f64, f32)> {
    let mut polygon = polygon;
    if let Some(lo) = request.lo {
        let exact = request.exact_lo;
        polygon = clip_half(&polygon, |v| {
            let d = v as f64 - lo as f64;
            (d, d > 0.0 || (exact && d == 0.0))
        });
    }
    if let Some(hi) = request.hi {
        let exact = request.exact_hi;
        polygon = clip_half(&polygon, |v| {
            let d = hi as f64 - v as f64;
            (d, d > 0.0 || (exact && d == 0.0))
        });
    }
    polygon
}

fn clip_half(
    polygon: &[(f64, f64, f32)],
    side: impl Fn(f32) -> (f64, bool),
) -> Vec<(f64, f64, f32)> {
    let mut out = Vec::with_capacity(polygon.len() + 2);
    for k in 0..polygon.len() {
        let cur = polygon[k];
        let prev = polygon[(k + polygon.len() - 1) % polygon.len()];
        let (d_cur, in_cur) = side(cur.2);
        let (d_prev, in_prev) = side(prev.2);

        if in_cur {
            if !in_prev {
                out.push(crossing(prev, cur, d_prev, d_cur));
            }
            out.push(cur);
        } else if in_prev {
            out.push(crossing(prev, cur, d_prev, d_cur));
        }
    }
    out
}

fn crossing(a: (f64, f64, f32), b: (f64, f64, f32), da: f64, db: f64) -> (f64, f64, f32) {
    let denom = da - db;
    let t = if denom.abs() < 1e-15 { 0.5 } else { (da / denom).clamp(0.0, 1.0) };
    (
        a.0 + t * (b.0 - a.0),
        a.1 + t * (b.1 - a.1),
        (a.2 as f64 + t * (b.2 as f64 - a.2 as f64)) as f32,
    )
}

fn polygon_area(polygon: &[(f64, f64, f32)]) -> f64 {
    let mut area = 0.0;
    for k in 0..polygon.len() {
        let (x1, y1, _) = polygon[k];
        let (x2, y2, _) = polygon[(k + 1) % polygon.len()];
        area += x1 * y2 - x2 * y1;
    }
    (area / 2.0).abs()
}

#[derive(Clone, Copy, PartialEq)]
enum Stepping {
    Nearest,
    Discrete,
}

/// Geometry for piecewise constant fields: each node (nearest) or each cell
/// (discrete) owns a rectangle holding a single value.
fn stepped_geometry(
    field: &Field,
    request: &ContourRequest,
    isoline: bool,
    stepping: Stepping,
    out: &mut Path,
    to_geo: &impl Fn(f64, f64) -> (f64, f64),
) {
    let (nx, ny) = field.shape();
    let xmax = (nx - 1) as f64;
    let ymax = (ny - 1) as f64;

    // Rectangle owned by node or cell (i, j)
    let rect = |i: usize, j: usize| -> (f64, f64, f64, f64) {
        match stepping {
            Stepping::Nearest => (
                (i as f64 - 0.5).max(0.0),
                (j as f64 - 0.5).max(0.0),
                (i as f64 + 0.5).min(xmax),
                (j as f64 + 0.5).min(ymax),
            ),
            Stepping::Discrete => (i as f64, j as f64, i as f64 + 1.0, j as f64 + 1.0),
        }
    };
    let (ci, cj) = match stepping {
        Stepping::Nearest => (nx, ny),
        Stepping::Discrete => (nx - 1, ny - 1),
    };
    let value = |i: usize, j: usize| field.get(i, j).map(|v| request.clamp(v));

    if !isoline {
        for j in 0..cj {
            for i in 0..ci {
                if let Some(v) = value(i, j) {
                    if request.contains(v) {
                        let (x0, y0, x1, y1) = rect(i, j);
                        out.add_polygon(&[to_geo(x0, y0), to_geo(x1, y0), to_geo(x1, y1), to_geo(x0, y1)]);
                    }
                }
            }
        }
        return;
    }

    let Some(level) = request.lo else {
        return;
    };
    let above = |i: usize, j: usize| value(i, j).map(|v| v >= level);
    for j in 0..cj {
        for i in 0..ci {
            let Some(here) = above(i, j) else {
                continue;
            };
            let (x0, y0, x1, y1) = rect(i, j);
            if i + 1 < ci && above(i + 1, j).is_some_and(|right| right != here) {
                out.add_polyline(&[to_geo(x1, y0), to_geo(x1, y1)]);
            }
            if j + 1 < cj && above(i, j + 1).is_some_and(|up| up != here) {
                out.add_polyline(&[to_geo(x0, y1), to_geo(x1, y1)]);
            }
        }
    }
}

type Segment = ((f64, f64), (f64, f64));

/// Marching squares over all complete cells for one level.
fn march_squares(field: &Field, request: &ContourRequest, level: f32) -> Vec<Segment> {
    let mut segments = Vec::new();
    for_each_cell(field, request, |cell| {
        let [bl, br, tr, tl] = cell.v;
        let (x0, y0) = (cell.x0, cell.y0);
        let (x1, y1) = (cell.x0 + cell.size, cell.y0 + cell.size);

        let mut index = 0u8;
        if tl >= level {
            index |= 1;
        }
        if tr >= level {
            index |= 2;
        }
        if br >= level {
            index |= 4;
        }
        if bl >= level {
            index |= 8;
        }

        let top = interpolate_edge((x0, y1), (x1, y1), tl, tr, level);
        let right = interpolate_edge((x1, y1), (x1, y0), tr, br, level);
        let bottom = interpolate_edge((x0, y0), (x1, y0), bl, br, level);
        let left = interpolate_edge((x0, y1), (x0, y0), tl, bl, level);

        match index {
            0 | 15 => {}
            1 | 14 => segments.push((left, top)),
            2 | 13 => segments.push((top, right)),
            3 | 12 => segments.push((left, right)),
            4 | 11 => segments.push((right, bottom)),
            6 | 9 => segments.push((top, bottom)),
            7 | 8 => segments.push((left, bottom)),
            // Saddles: resolve with the cell centre value
            5 | 10 => {
                let centre = (tl + tr + br + bl) / 4.0;
                let centre_above = centre >= level;
                if (index == 5) == centre_above {
                    segments.push((left, bottom));
                    segments.push((top, right));
                } else {
                    segments.push((left, top));
                    segments.push((right, bottom));
                }
            }
            _ => {}
        }
    });
    segments
}

fn interpolate_edge(p1: (f64, f64), p2: (f64, f64), v1: f32, v2: f32, level: f32) -> (f64, f64) {
    let (v1, v2, level) = (v1 as f64, v2 as f64, level as f64);
    if (v2 - v1).abs() < 1e-12 {
        return ((p1.0 + p2.0) / 2.0, (p1.1 + p2.1) / 2.0);
    }
    let t = ((level - v1) / (v2 - v1)).clamp(0.0, 1.0);
    (p1.0 + t * (p2.0 - p1.0), p1.1 + t * (p2.1 - p1.1))
}

/// Join unordered segments into polylines. Closed rings repeat their first point.
fn connect_segments(segments: Vec<Segment>) -> Vec<Vec<(f64, f64)>> {
    const SCALE: f64 = 1e6;
    let key = |p: (f64, f64)| ((p.0 * SCALE).round() as i64, (p.1 * SCALE).round() as i64);

    let mut by_point: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (k, (a, b)) in segments.iter().enumerate() {
        by_point.entry(key(*a)).or_default().push(k);
        by_point.entry(key(*b)).or_default().push(k);
    }

    let mut used = vec![false; segments.len()];
    let mut lines = Vec::new();

    let next_from = |point: (f64, f64), used: &[bool]| -> Option<usize> {
        by_point
            .get(&key(point))
            .and_then(|candidates| candidates.iter().copied().find(|&k| !used[k]))
    };

    for start in 0..segments.len() {
        if used[start] {
            continue;
        }
        used[start] = true;
        let (a, b) = segments[start];
        let mut line = std::collections::VecDeque::from(vec![a, b]);

        // Extend forwards, then backwards
        while let Some(&end) = line.back() {
            let Some(k) = next_from(end, &used) else {
                break;
            };
            used[k] = true;
            let (s, e) = segments[k];
            line.push_back(if key(s) == key(end) { e } else { s });
        }
        while let Some(&first) = line.front() {
            let Some(k) = next_from(first, &used) else {
                break;
            };
            used[k] = true;
            let (s, e) = segments[k];
            line.push_front(if key(s) == key(first) { e } else { s });
        }

        lines.push(line.into_iter().collect());
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::PathOp;

    fn grid(nx: usize, ny: usize) -> GridSpec {
        GridSpec::new(nx, ny, 1.0, 1.0, 0.0, 0.0)
    }

    fn polygons(path: &Path) -> usize {
        path.elements().iter().filter(|e| e.op == PathOp::Close).count()
    }

    #[test]
    fn test_interpolation_parse() {
        assert_eq!(Interpolation::parse("Linear").unwrap(), Interpolation::Linear);
        assert_eq!(Interpolation::parse("Discrete").unwrap().name(), "Discrete");
        assert!(matches!(
            Interpolation::parse("Cubic"),
            Err(QdError::UnknownInterpolation(_))
        ));
    }

    #[test]
    fn test_uniform_field_inside_band_is_one_quad_per_cell() {
        let field = Field::filled(3, 3, Some(5.0));
        let path = DefaultContourEngine.contour(&field, &grid(3, 3), &ContourRequest::band(Some(0.0), Some(10.0)));
        assert_eq!(polygons(&path), 4);
        assert_eq!(path.bounding_box(), Some((0.0, 0.0, 2.0, 2.0)));
    }

    #[test]
    fn test_keep_triangles_doubles_polygons() {
        let field = Field::filled(3, 3, Some(5.0));
        let request = ContourRequest {
            keep_triangles: true,
            ..ContourRequest::band(Some(0.0), Some(10.0))
        };
        let path = DefaultContourEngine.contour(&field, &grid(3, 3), &request);
        assert_eq!(polygons(&path), 8);
    }

    #[test]
    fn test_band_is_clipped_at_the_crossing() {
        // Values grow from 0 to 10 along x
        let field = Field::from_f32(2, 2, &[0.0, 10.0, 0.0, 10.0]).unwrap();
        let path = DefaultContourEngine.contour(&field, &grid(2, 2), &ContourRequest::band(Some(5.0), None));
        let (x1, y1, x2, y2) = path.bounding_box().unwrap();
        assert!((x1 - 0.5).abs() < 1e-9);
        assert_eq!((y1, x2, y2), (0.0, 1.0, 1.0));
    }

    #[test]
    fn test_exact_hi_includes_flat_top() {
        let field = Field::filled(2, 2, Some(10.0));
        let open = ContourRequest::band(Some(0.0), Some(10.0));
        assert!(DefaultContourEngine.contour(&field, &grid(2, 2), &open).is_empty());

        let closed = ContourRequest {
            exact_hi: true,
            ..open
        };
        assert!(!DefaultContourEngine.contour(&field, &grid(2, 2), &closed).is_empty());
    }

    #[test]
    fn test_missing_band_covers_cells_with_missing_corner() {
        let field = Field::from_values(3, 2, vec![Some(1.0), None, Some(1.0), Some(1.0), Some(1.0), Some(1.0)]).unwrap();
        let path = DefaultContourEngine.contour(&field, &grid(3, 2), &ContourRequest::band(None, None));
        assert_eq!(polygons(&path), 2);

        // Cells with a missing corner never appear in ordinary bands
        let band = DefaultContourEngine.contour(&field, &grid(3, 2), &ContourRequest::band(Some(0.0), Some(2.0)));
        assert!(band.is_empty());
    }

    #[test]
    fn test_data_limits_clamp_values() {
        let field = Field::filled(2, 2, Some(100.0));
        let request = ContourRequest {
            data_hi: Some(5.0),
            ..ContourRequest::band(Some(0.0), Some(10.0))
        };
        assert!(!DefaultContourEngine.contour(&field, &grid(2, 2), &request).is_empty());
    }

    #[test]
    fn test_isoline_around_peak_is_closed() {
        #[rustfmt::skip]
        let field = Field::from_f32(3, 3, &[
            0.0, 0.0, 0.0,
            0.0, 10.0, 0.0,
            0.0, 0.0, 0.0,
        ]).unwrap();
        let path = DefaultContourEngine.contour(&field, &grid(3, 3), &ContourRequest::line(5.0));
        let moves = path.elements().iter().filter(|e| e.op == PathOp::MoveTo).count();
        assert_eq!(moves, 1);
        let first = path.elements()[0];
        let last = path.elements()[path.len() - 1];
        assert!((first.x - last.x).abs() < 1e-9 && (first.y - last.y).abs() < 1e-9);
        assert_eq!(path.bounding_box(), Some((0.5, 0.5, 1.5, 1.5)));
    }

    #[test]
    fn test_depth_refines_cells() {
        let field = Field::filled(2, 2, Some(5.0));
        let request = ContourRequest {
            depth: 2,
            keep_triangles: true,
            ..ContourRequest::band(Some(0.0), Some(10.0))
        };
        let path = DefaultContourEngine.contour(&field, &grid(2, 2), &request);
        assert_eq!(polygons(&path), 2 * 16);
    }

    #[test]
    fn test_nearest_and_discrete_rectangles() {
        let field = Field::from_f32(2, 2, &[1.0, 9.0, 1.0, 9.0]).unwrap();
        let nearest = ContourRequest {
            interpolation: Interpolation::Nearest,
            ..ContourRequest::band(Some(5.0), None)
        };
        let path = DefaultContourEngine.contour(&field, &grid(2, 2), &nearest);
        assert_eq!(path.bounding_box(), Some((0.5, 0.0, 1.0, 1.0)));

        let discrete = ContourRequest {
            interpolation: Interpolation::Discrete,
            ..nearest
        };
        // The lower left corner value (1.0) owns the only cell
        assert!(DefaultContourEngine.contour(&field, &grid(2, 2), &discrete).is_empty());
    }

    #[test]
    fn test_geometry_uses_grid_coordinates() {
        let field = Field::filled(2, 2, Some(1.0));
        let grid = GridSpec::new(2, 2, 0.5, 0.25, 20.0, 60.0);
        let path = DefaultContourEngine.contour(&field, &grid, &ContourRequest::band(None, Some(2.0)));
        assert_eq!(path.bounding_box(), Some((20.0, 60.0, 20.5, 60.25)));
    }
}
