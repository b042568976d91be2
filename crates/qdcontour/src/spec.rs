//! Contour and shape specifications built up by script commands.
//!
//! Specs are appended in script order. Configuration commands that follow a
//! `param` or `shape` apply to the spec it created, which the registry tracks
//! with an explicit cursor.

use std::sync::Arc;

use qd_common::{BlendRule, Color};
use renderer::{Alignment, Canvas, Interpolation};

use crate::smoothing::{Smoother, SmootherKind};

/// A filled band `[lo, hi)`. `None` bounds are open.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourRange {
    pub lo: Option<f32>,
    pub hi: Option<f32>,
    pub color: Color,
    pub rule: BlendRule,
}

/// A band filled with a repeated image.
#[derive(Debug, Clone)]
pub struct ContourPattern {
    pub lo: Option<f32>,
    pub hi: Option<f32>,
    pub pattern: Arc<Canvas>,
    pub rule: BlendRule,
    pub alpha: f32,
}

/// An isoline. A `None` value strokes the outline of the missing area.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourLine {
    pub value: Option<f32>,
    pub color: Color,
    pub rule: BlendRule,
}

/// A point where a value label is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelPoint {
    pub lon: f64,
    pub lat: f64,
    /// Fixed pixel position overriding the projected one.
    pub pixel: Option<(f64, f64)>,
}

impl LabelPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat, pixel: None }
    }

    pub fn at_pixel(lon: f64, lat: f64, x: f64, y: f64) -> Self {
        Self {
            lon,
            lat,
            pixel: Some((x, y)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LabelMarker {
    pub image: Arc<Canvas>,
    pub rule: BlendRule,
    pub alpha: f32,
}

/// How the labels of one parameter look.
#[derive(Debug, Clone)]
pub struct LabelStyle {
    pub marker: Option<LabelMarker>,
    pub font: String,
    pub size: f32,
    pub stroke_color: Color,
    pub stroke_rule: BlendRule,
    pub fill_color: Color,
    pub fill_rule: BlendRule,
    pub align: Alignment,
    /// printf-style format, empty disables text.
    pub format: String,
    /// Text for missing values, empty skips the label.
    pub missing: String,
    pub offset: (f64, f64),
    pub angle: f32,
    pub caption: String,
    pub caption_offset: (f64, f64),
    pub caption_align: Alignment,
}

impl Default for LabelStyle {
    fn default() -> Self {
        Self {
            marker: None,
            font: String::new(),
            size: 12.0,
            stroke_color: Color::TRANSPARENT,
            stroke_rule: BlendRule::Copy,
            fill_color: Color::BLACK,
            fill_rule: BlendRule::Over,
            align: Alignment::Center,
            format: "%.1f".to_string(),
            missing: "-".to_string(),
            offset: (0.0, 0.0),
            angle: 0.0,
            caption: String::new(),
            caption_offset: (0.0, 0.0),
            caption_align: Alignment::West,
        }
    }
}

/// Settings copied into every new [`ContourSpec`].
#[derive(Debug, Clone, PartialEq)]
pub struct SpecDefaults {
    pub depth: u32,
    pub interpolation: String,
    pub smoother: SmootherKind,
    pub smoother_radius: f64,
    pub smoother_factor: f64,
}

impl Default for SpecDefaults {
    fn default() -> Self {
        Self {
            depth: 0,
            interpolation: Interpolation::Linear.name().to_string(),
            smoother: SmootherKind::None,
            smoother_radius: 1.0,
            smoother_factor: 1.0,
        }
    }
}

/// Everything drawn for one parameter.
#[derive(Debug, Clone)]
pub struct ContourSpec {
    pub param: String,
    /// Interpolation name, validated when contours are drawn.
    pub interpolation: String,
    pub smoother: Smoother,
    pub depth: u32,
    /// Upper limit at which the top band includes its upper edge.
    pub exact_hi: Option<f32>,
    pub data_lo: Option<f32>,
    pub data_hi: Option<f32>,
    /// Value substitution applied to every retrieved field.
    pub replace: Option<(Option<f32>, Option<f32>)>,

    pub fills: Vec<ContourRange>,
    pub patterns: Vec<ContourPattern>,
    pub lines: Vec<ContourLine>,

    pub label: LabelStyle,
    pub label_points: Vec<LabelPoint>,
    /// Values sampled for `label_points` in the frame being drawn.
    pub label_values: Vec<Option<f32>>,
    /// Grid stride for automatic label points, 0 disables.
    pub label_dx: usize,
    pub label_dy: usize,
    /// Set once the grid label points have been appended.
    pub grid_labels_added: bool,
}

impl ContourSpec {
    pub fn new(param: &str, defaults: &SpecDefaults) -> Self {
        Self {
            param: param.to_string(),
            interpolation: defaults.interpolation.clone(),
            smoother: Smoother::new(defaults.smoother, defaults.smoother_radius, defaults.smoother_factor),
            depth: defaults.depth,
            exact_hi: None,
            data_lo: None,
            data_hi: None,
            replace: None,
            fills: Vec::new(),
            patterns: Vec::new(),
            lines: Vec::new(),
            label: LabelStyle::default(),
            label_points: Vec::new(),
            label_values: Vec::new(),
            label_dx: 0,
            label_dy: 0,
            grid_labels_added: false,
        }
    }

    pub fn add_label(&mut self, point: LabelPoint) {
        self.label_points.push(point);
    }

    /// Forget every label point, including grid points.
    pub fn clear_labels(&mut self) {
        self.label_points.clear();
        self.label_values.clear();
        self.grid_labels_added = false;
    }

    pub fn has_labels(&self) -> bool {
        !self.label_points.is_empty()
    }
}

/// How a shapefile is drawn.
#[derive(Debug, Clone)]
pub enum ShapeStyle {
    Fill {
        fill: Color,
        stroke: Color,
        fill_rule: BlendRule,
        stroke_rule: BlendRule,
    },
    Marker {
        image: Arc<Canvas>,
        rule: BlendRule,
        alpha: f32,
    },
}

#[derive(Debug, Clone)]
pub struct ShapeSpec {
    pub file: String,
    pub style: ShapeStyle,
}

/// Ordered contour and shape specs with a cursor on the last added one.
#[derive(Debug, Default)]
pub struct SpecRegistry {
    specs: Vec<ContourSpec>,
    shapes: Vec<ShapeSpec>,
    current: Option<usize>,
}

impl SpecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a spec and move the cursor to it.
    pub fn push(&mut self, spec: ContourSpec) {
        self.specs.push(spec);
        self.current = Some(self.specs.len() - 1);
    }

    /// The spec configuration commands apply to.
    pub fn current_mut(&mut self) -> Option<&mut ContourSpec> {
        self.current.and_then(|i| self.specs.get_mut(i))
    }

    pub fn specs(&self) -> &[ContourSpec] {
        &self.specs
    }

    pub fn specs_mut(&mut self) -> &mut [ContourSpec] {
        &mut self.specs
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn clear_specs(&mut self) {
        self.specs.clear();
        self.current = None;
    }

    pub fn push_shape(&mut self, shape: ShapeSpec) {
        self.shapes.push(shape);
    }

    pub fn shapes(&self) -> &[ShapeSpec] {
        &self.shapes
    }

    pub fn last_shape_mut(&mut self) -> Option<&mut ShapeSpec> {
        self.shapes.last_mut()
    }

    pub fn clear_shapes(&mut self) {
        self.shapes.clear();
    }

    pub fn clear_labels(&mut self) {
        for spec in &mut self.specs {
            spec.clear_labels();
        }
    }
}
