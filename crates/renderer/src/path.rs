//! Vector path geometry.
//!
//! A [`Path`] is a flat list of move/line/close operations in `f64`
//! coordinates. Curves are flattened when parsed. Paths are built in
//! geographic coordinates by the contour engine, projected to pixels with
//! an [`Area`], and finally converted to a `tiny_skia::Path` for drawing.

use projection::Area;
use qd_common::{QdError, QdResult};

/// Number of line segments used to flatten one Bezier curve.
const CURVE_STEPS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathOp {
    MoveTo,
    LineTo,
    /// Close the current subpath back to its first point.
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathElement {
    pub op: PathOp,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Path {
    elements: Vec<PathElement>,
}

impl Path {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn move_to(&mut self, x: f64, y: f64) {
        self.elements.push(PathElement {
            op: PathOp::MoveTo,
            x,
            y,
        });
    }

    pub fn line_to(&mut self, x: f64, y: f64) {
        if self.elements.is_empty() {
            self.move_to(x, y);
            return;
        }
        self.elements.push(PathElement {
            op: PathOp::LineTo,
            x,
            y,
        });
    }

    pub fn close(&mut self) {
        if let Some((x, y)) = self.subpath_start() {
            self.elements.push(PathElement {
                op: PathOp::Close,
                x,
                y,
            });
        }
    }

    /// Append a closed polygon.
    pub fn add_polygon(&mut self, points: &[(f64, f64)]) {
        let Some((&(x0, y0), rest)) = points.split_first() else {
            return;
        };
        self.move_to(x0, y0);
        for &(x, y) in rest {
            self.line_to(x, y);
        }
        self.close();
    }

    /// Append an open polyline.
    pub fn add_polyline(&mut self, points: &[(f64, f64)]) {
        let Some((&(x0, y0), rest)) = points.split_first() else {
            return;
        };
        self.move_to(x0, y0);
        for &(x, y) in rest {
            self.line_to(x, y);
        }
    }

    /// Append all elements of another path.
    pub fn add(&mut self, other: &Path) {
        self.elements.extend_from_slice(&other.elements);
    }

    pub fn elements(&self) -> &[PathElement] {
        &self.elements
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    fn subpath_start(&self) -> Option<(f64, f64)> {
        self.elements
            .iter()
            .rev()
            .find(|e| e.op == PathOp::MoveTo)
            .map(|e| (e.x, e.y))
    }

    /// Bounding box `(min_x, min_y, max_x, max_y)`, `None` for an empty path.
    pub fn bounding_box(&self) -> Option<(f64, f64, f64, f64)> {
        self.elements.iter().fold(None, |acc, e| match acc {
            None => Some((e.x, e.y, e.x, e.y)),
            Some((x1, y1, x2, y2)) => Some((x1.min(e.x), y1.min(e.y), x2.max(e.x), y2.max(e.y))),
        })
    }

    /// Apply a coordinate mapping to every point.
    pub fn transform(&mut self, f: impl Fn(f64, f64) -> (f64, f64)) {
        for e in self.elements.iter_mut() {
            let (x, y) = f(e.x, e.y);
            e.x = x;
            e.y = y;
        }
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.transform(|x, y| (x + dx, y + dy));
    }

    pub fn scale(&mut self, factor: f64) {
        self.transform(|x, y| (x * factor, y * factor));
    }

    /// Rotate clockwise on screen (y grows downwards) by `degrees` around the origin.
    pub fn rotate(&mut self, degrees: f64) {
        let (sin, cos) = degrees.to_radians().sin_cos();
        self.transform(|x, y| (x * cos - y * sin, x * sin + y * cos));
    }

    /// Project geographic `(lon, lat)` coordinates to pixels.
    pub fn project(&mut self, area: &dyn Area) {
        self.transform(|lon, lat| area.to_xy(lon, lat));
    }

    /// Drop intermediate line points deviating less than `tolerance` from the
    /// straight line through their neighbours (Douglas-Peucker per subpath).
    pub fn simplify_lines(&mut self, tolerance: f64) {
        let mut out = Vec::with_capacity(self.elements.len());
        let mut run: Vec<PathElement> = Vec::new();

        let flush = |run: &mut Vec<PathElement>, out: &mut Vec<PathElement>| {
            if run.len() <= 2 {
                out.append(run);
                return;
            }
            let mut keep = vec![false; run.len()];
            keep[0] = true;
            keep[run.len() - 1] = true;
            douglas_peucker(run, 0, run.len() - 1, tolerance, &mut keep);
            out.extend(run.iter().zip(keep).filter(|(_, k)| *k).map(|(e, _)| *e));
            run.clear();
        };

        for e in &self.elements {
            match e.op {
                PathOp::MoveTo => {
                    flush(&mut run, &mut out);
                    run.push(*e);
                }
                PathOp::LineTo => run.push(*e),
                PathOp::Close => {
                    flush(&mut run, &mut out);
                    out.push(*e);
                }
            }
        }
        flush(&mut run, &mut out);
        self.elements = out;
    }

    /// Convert to a tiny-skia path. Returns `None` when nothing drawable remains.
    pub fn to_skia(&self) -> Option<tiny_skia::Path> {
        let mut pb = tiny_skia::PathBuilder::new();
        for e in &self.elements {
            if !e.x.is_finite() || !e.y.is_finite() {
                continue;
            }
            match e.op {
                PathOp::MoveTo => pb.move_to(e.x as f32, e.y as f32),
                PathOp::LineTo => pb.line_to(e.x as f32, e.y as f32),
                PathOp::Close => pb.close(),
            }
        }
        pb.finish()
    }

    /// Parse SVG path data (`M L H V Q C Z`, absolute or relative).
    pub fn parse_svg(data: &str) -> QdResult<Path> {
        let invalid = |message: String| QdError::invalid("arrowpath", message);

        let tokens = tokenize_svg(data).map_err(invalid)?;
        let mut path = Path::new();
        let mut i = 0;
        let mut command: Option<char> = None;
        let (mut cx, mut cy) = (0.0f64, 0.0f64);
        let (mut sx, mut sy) = (0.0f64, 0.0f64);

        let number = |tokens: &[SvgToken], i: &mut usize| -> QdResult<f64> {
            match tokens.get(*i) {
                Some(SvgToken::Number(n)) => {
                    *i += 1;
                    Ok(*n)
                }
                _ => Err(QdError::invalid("arrowpath", "expected a number in path data")),
            }
        };

        while i < tokens.len() {
            if let SvgToken::Command(c) = tokens[i] {
                command = Some(c);
                i += 1;
                if c == 'Z' || c == 'z' {
                    path.close();
                    cx = sx;
                    cy = sy;
                    continue;
                }
            }
            let Some(c) = command else {
                return Err(invalid("path data must start with a command".to_string()));
            };
            let relative = c.is_ascii_lowercase();
            let (ox, oy) = if relative { (cx, cy) } else { (0.0, 0.0) };

            match c.to_ascii_uppercase() {
                'M' => {
                    let x = number(&tokens, &mut i)? + ox;
                    let y = number(&tokens, &mut i)? + oy;
                    path.move_to(x, y);
                    (cx, cy, sx, sy) = (x, y, x, y);
                    // Further coordinate pairs are implicit line-tos
                    command = Some(if relative { 'l' } else { 'L' });
                }
                'L' => {
                    let x = number(&tokens, &mut i)? + ox;
                    let y = number(&tokens, &mut i)? + oy;
                    path.line_to(x, y);
                    (cx, cy) = (x, y);
                }
                'H' => {
                    let x = number(&tokens, &mut i)? + ox;
                    path.line_to(x, cy);
                    cx = x;
                }
                'V' => {
                    let y = number(&tokens, &mut i)? + if relative { cy } else { 0.0 };
                    path.line_to(cx, y);
                    cy = y;
                }
                'Q' => {
                    let x1 = number(&tokens, &mut i)? + ox;
                    let y1 = number(&tokens, &mut i)? + oy;
                    let x = number(&tokens, &mut i)? + ox;
                    let y = number(&tokens, &mut i)? + oy;
                    for step in 1..=CURVE_STEPS {
                        let t = step as f64 / CURVE_STEPS as f64;
                        let u = 1.0 - t;
                        path.line_to(
                            u * u * cx + 2.0 * u * t * x1 + t * t * x,
                            u * u * cy + 2.0 * u * t * y1 + t * t * y,
                        );
                    }
                    (cx, cy) = (x, y);
                }
                'C' => {
                    let x1 = number(&tokens, &mut i)? + ox;
                    let y1 = number(&tokens, &mut i)? + oy;
                    let x2 = number(&tokens, &mut i)? + ox;
                    let y2 = number(&tokens, &mut i)? + oy;
                    let x = number(&tokens, &mut i)? + ox;
                    let y = number(&tokens, &mut i)? + oy;
                    for step in 1..=CURVE_STEPS {
                        let t = step as f64 / CURVE_STEPS as f64;
                        let u = 1.0 - t;
                        path.line_to(
                            u * u * u * cx + 3.0 * u * u * t * x1 + 3.0 * u * t * t * x2 + t * t * t * x,
                            u * u * u * cy + 3.0 * u * u * t * y1 + 3.0 * u * t * t * y2 + t * t * t * y,
                        );
                    }
                    (cx, cy) = (x, y);
                }
                other => {
                    return Err(invalid(format!("unsupported path command '{}'", other)));
                }
            }
        }

        Ok(path)
    }

    /// Import all paths of an SVG document, with their transforms applied.
    pub fn from_svg_document(data: &[u8]) -> QdResult<Path> {
        let tree = usvg::Tree::from_data(data, &usvg::Options::default())
            .map_err(|e| QdError::invalid("arrowpath", format!("invalid SVG document: {}", e)))?;
        let mut path = Path::new();
        collect_svg_paths(tree.root(), &mut path);
        Ok(path)
    }

    /// Read a path file: an SVG document or bare SVG path data.
    pub fn read(file: &std::path::Path) -> QdResult<Path> {
        if !file.exists() {
            return Err(QdError::FileNotFound(file.display().to_string()));
        }
        let data = std::fs::read(file)?;
        let text = String::from_utf8_lossy(&data);
        if text.trim_start().starts_with('<') {
            Path::from_svg_document(&data)
        } else {
            Path::parse_svg(&text)
        }
    }
}

fn collect_svg_paths(group: &usvg::Group, out: &mut Path) {
    use usvg::tiny_skia_path::PathSegment;

    for node in group.children() {
        match node {
            usvg::Node::Group(g) => collect_svg_paths(g, out),
            usvg::Node::Path(p) => {
                let ts = p.abs_transform();
                let map = |pt: usvg::tiny_skia_path::Point| -> (f64, f64) {
                    (
                        (ts.sx * pt.x + ts.kx * pt.y + ts.tx) as f64,
                        (ts.ky * pt.x + ts.sy * pt.y + ts.ty) as f64,
                    )
                };
                let mut last = (0.0, 0.0);
                for segment in p.data().segments() {
                    match segment {
                        PathSegment::MoveTo(pt) => {
                            last = map(pt);
                            out.move_to(last.0, last.1);
                        }
                        PathSegment::LineTo(pt) => {
                            last = map(pt);
                            out.line_to(last.0, last.1);
                        }
                        PathSegment::QuadTo(p1, pt) => {
                            let (x1, y1) = map(p1);
                            let (x, y) = map(pt);
                            for step in 1..=CURVE_STEPS {
                                let t = step as f64 / CURVE_STEPS as f64;
                                let u = 1.0 - t;
                                out.line_to(
                                    u * u * last.0 + 2.0 * u * t * x1 + t * t * x,
                                    u * u * last.1 + 2.0 * u * t * y1 + t * t * y,
                                );
                            }
                            last = (x, y);
                        }
                        PathSegment::CubicTo(p1, p2, pt) => {
                            let (x1, y1) = map(p1);
                            let (x2, y2) = map(p2);
                            let (x, y) = map(pt);
                            for step in 1..=CURVE_STEPS {
                                let t = step as f64 / CURVE_STEPS as f64;
                                let u = 1.0 - t;
                                out.line_to(
                                    u * u * u * last.0
                                        + 3.0 * u * u * t * x1
                                        + 3.0 * u * t * t * x2
                                        + t * t * t * x,
                                    u * u * u * last.1
                                        + 3.0 * u * u * t * y1
                                        + 3.0 * u * t * t * y2
                                        + t * t * t * y,
                                );
                            }
                            last = (x, y);
                        }
                        PathSegment::Close => out.close(),
                    }
                }
            }
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum SvgToken {
    Command(char),
    Number(f64),
}

fn tokenize_svg(data: &str) -> Result<Vec<SvgToken>, String> {
    let chars: Vec<char> = data.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() || c == ',' {
            i += 1;
        } else if c.is_ascii_alphabetic() && c != 'e' && c != 'E' {
            tokens.push(SvgToken::Command(c));
            i += 1;
        } else if c.is_ascii_digit() || c == '-' || c == '+' || c == '.' {
            let start = i;
            i += 1;
            let mut seen_dot = c == '.';
            while i < chars.len() {
                let d = chars[i];
                if d.is_ascii_digit() {
                    i += 1;
                } else if d == '.' && !seen_dot {
                    seen_dot = true;
                    i += 1;
                } else if (d == 'e' || d == 'E') && i + 1 < chars.len() {
                    i += 1;
                    if chars[i] == '-' || chars[i] == '+' {
                        i += 1;
                    }
                } else {
                    break;
                }
            }
            let text: String = chars[start..i].iter().collect();
            let n = text
                .parse::<f64>()
                .map_err(|_| format!("invalid number '{}' in path data", text))?;
            tokens.push(SvgToken::Number(n));
        } else {
            return Err(format!("unexpected character '{}' in path data", c));
        }
    }
    Ok(tokens)
}

fn douglas_peucker(points: &[PathElement], first: usize, last: usize, tolerance: f64, keep: &mut [bool]) {
    if last <= first + 1 {
        return;
    }
    let (ax, ay) = (points[first].x, points[first].y);
    let (bx, by) = (points[last].x, points[last].y);
    let (dx, dy) = (bx - ax, by - ay);
    let len = (dx * dx + dy * dy).sqrt();

    let mut max_dist = -1.0;
    let mut max_index = first;
    for (k, p) in points.iter().enumerate().take(last).skip(first + 1) {
        let dist = if len < 1e-12 {
            ((p.x - ax).powi(2) + (p.y - ay).powi(2)).sqrt()
        } else {
            ((p.x - ax) * dy - (p.y - ay) * dx).abs() / len
        };
        if dist > max_dist {
            max_dist = dist;
            max_index = k;
        }
    }

    if max_dist > tolerance {
        keep[max_index] = true;
        douglas_peucker(points, first, max_index, tolerance, keep);
        douglas_peucker(points, max_index, last, tolerance, keep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_absolute_and_relative() {
        let path = Path::parse_svg("M 0 0 L 10 0 l 0 10 H 0 Z").unwrap();
        let ops: Vec<PathOp> = path.elements().iter().map(|e| e.op).collect();
        assert_eq!(
            ops,
            vec![PathOp::MoveTo, PathOp::LineTo, PathOp::LineTo, PathOp::LineTo, PathOp::Close]
        );
        let e = path.elements()[2];
        assert_eq!((e.x, e.y), (10.0, 10.0));
        assert_eq!(path.bounding_box(), Some((0.0, 0.0, 10.0, 10.0)));
    }

    #[test]
    fn test_parse_implicit_lineto_and_compact_numbers() {
        let path = Path::parse_svg("m1,1 2,0-1.5.5").unwrap();
        assert_eq!(path.len(), 3);
        let e = path.elements()[2];
        assert!((e.x - 1.5).abs() < 1e-12 && (e.y - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_parse_curves_are_flattened() {
        let path = Path::parse_svg("M0 0 Q 5 10 10 0 C 10 5 0 5 0 0").unwrap();
        assert_eq!(path.len(), 1 + 2 * CURVE_STEPS);
        let last = path.elements().last().unwrap();
        assert!(last.x.abs() < 1e-12 && last.y.abs() < 1e-12);
    }

    #[test]
    fn test_parse_errors() {
        assert!(Path::parse_svg("0 0 L 1 1").is_err());
        assert!(Path::parse_svg("M 0").is_err());
        assert!(Path::parse_svg("M 0 0 A 1 1 0 0 0 2 2").is_err());
    }

    #[test]
    fn test_rotate_quarter_turn() {
        let mut path = Path::new();
        path.move_to(0.0, 1.0);
        path.rotate(90.0);
        let e = path.elements()[0];
        assert!((e.x + 1.0).abs() < 1e-12 && e.y.abs() < 1e-12);
    }

    #[test]
    fn test_simplify_removes_collinear_points() {
        let mut path = Path::new();
        path.add_polyline(&[(0.0, 0.0), (1.0, 0.0), (2.0, 0.001), (3.0, 0.0), (3.0, 5.0)]);
        path.simplify_lines(0.1);
        let points: Vec<(f64, f64)> = path.elements().iter().map(|e| (e.x, e.y)).collect();
        assert_eq!(points, vec![(0.0, 0.0), (3.0, 0.0), (3.0, 5.0)]);
    }

    #[test]
    fn test_svg_document_import() {
        let svg = br#"<svg xmlns="http://www.w3.org/2000/svg" width="20" height="20">
            <g transform="translate(5,5)"><path d="M0 0 L10 0 L10 10 Z"/></g>
        </svg>"#;
        let path = Path::from_svg_document(svg).unwrap();
        let (x1, y1, x2, y2) = path.bounding_box().unwrap();
        assert!((x1 - 5.0).abs() < 1e-4 && (y1 - 5.0).abs() < 1e-4);
        assert!((x2 - 15.0).abs() < 1e-4 && (y2 - 15.0).abs() < 1e-4);
    }

    #[test]
    fn test_to_skia() {
        let mut path = Path::new();
        path.add_polygon(&[(0.0, 0.0), (4.0, 0.0), (4.0, 4.0)]);
        let skia = path.to_skia().unwrap();
        assert_eq!(skia.bounds().width(), 4.0);
        assert!(Path::new().to_skia().is_none());
    }
}
