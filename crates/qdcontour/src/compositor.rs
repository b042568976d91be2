//! Frame rendering: drives field resolution, contouring and all overlay
//! layers for every accepted frame time.
//!
//! Layers are painted in a fixed order:
//!
//! ```text
//! background -> fills -> patterns -> lines (per spec)
//!            -> foreground -> arrows -> markers, texts (per spec)
//!            -> combine -> time stamp
//! ```

use std::path::PathBuf;

use projection::{Area, MapArea};
use qd_common::{Field, GridSpec, QdError, QdResult};
use querydata::GridSource;
use renderer::arrows::{place_arrow, screen_angle};
use renderer::{ArrowShape, Canvas, ContourCache, ContourEngine, ContourRequest, FontLibrary, ImageWriter, Interpolation};

use crate::aligner::{FrameRequest, SourceFrame, TemporalAligner};
use crate::context::{RenderContext, Settings};
use crate::labels::{draw_markers, draw_texts, grid_label_points, is_masked, sample_labels};
use crate::resolver::{locate, FieldResolver, ParameterId};
use crate::smoothing::world_points;
use crate::spec::{ContourSpec, SpecRegistry};
use crate::timestamp::{draw_stamp, origin_time, output_path, stamp_text};

/// Point reduction tolerance for isolines, in pixels.
pub const LINE_SIMPLIFY_TOLERANCE: f64 = 10.0;

/// Outcome of one `draw contours` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrawSummary {
    pub written: Vec<PathBuf>,
    /// Frames left alone because their file already existed.
    pub skipped: Vec<PathBuf>,
}

/// Render every accepted frame of the active sources.
pub fn draw_contours<E, W>(ctx: &mut RenderContext, engine: &E, writer: &mut W) -> QdResult<DrawSummary>
where
    E: ContourEngine,
    W: ImageWriter + ?Sized,
{
    if ctx.sources.is_empty() {
        return Err(QdError::NoQueryData);
    }
    let area = ctx.area.as_ref().ok_or(QdError::NoProjection)?;

    if let Some(background) = &ctx.settings.background {
        tracing::info!("Contouring for background {}", background.name);
    }
    let (bl, tr) = (area.bottom_left_lat_lon(), area.top_right_lat_lon());
    tracing::debug!(
        bottom_left = ?bl,
        top_right = ?tr,
        width = area.width(),
        height = area.height(),
        "Area corners"
    );

    let aligner = TemporalAligner::from_sources(&ctx.sources, ctx.settings.zone, ctx.settings.time);
    if let Some((start, end)) = aligner.interval() {
        tracing::debug!(start = %start, end = %end, "Data time interval");
    }

    let mut compositor = FrameCompositor {
        settings: &ctx.settings,
        area,
        sources: &ctx.sources,
        cache: &mut ctx.cache,
        fonts: &mut ctx.fonts,
        engine,
    };

    let mut summary = DrawSummary::default();
    for frame in aligner.frames() {
        tracing::debug!(time = %frame.time, "Frame time");
        let file = output_path(compositor.settings, &frame.time, compositor.sources);

        let exists = std::fs::metadata(&file).map(|m| m.len() > 0).unwrap_or(false);
        if !compositor.settings.force && exists {
            tracing::debug!(file = %file.display(), "Not overwriting");
            summary.skipped.push(file);
            continue;
        }

        let canvas = compositor.render(&mut ctx.specs, &frame)?;
        tracing::info!("Writing {}", file.display());
        writer.write(&canvas, &file, &compositor.settings.image)?;
        summary.written.push(file);
    }
    Ok(summary)
}

/// Paints single frames. Holds the parts of the [`RenderContext`] a frame
/// reads, plus the mutable contour cache and font library.
pub struct FrameCompositor<'a, E: ContourEngine> {
    pub settings: &'a Settings,
    pub area: &'a MapArea,
    pub sources: &'a [Box<dyn GridSource>],
    pub cache: &'a mut ContourCache,
    pub fonts: &'a mut FontLibrary,
    pub engine: &'a E,
}

impl<E: ContourEngine> FrameCompositor<'_, E> {
    pub fn render(&mut self, specs: &mut SpecRegistry, frame: &FrameRequest) -> QdResult<Canvas> {
        let settings = self.settings;
        let mut canvas = match &settings.background {
            Some(background) => (*background.image).clone(),
            None => {
                let (w, h) = self.area.pixel_size();
                let mut canvas = Canvas::new(w, h)?;
                canvas.erase(settings.erase);
                canvas
            }
        };

        let resolver = FieldResolver::new(settings.level, settings.time.filter);
        let mut last_field: Option<Field> = None;
        for spec in specs.specs_mut() {
            let field = self.draw_spec(&mut canvas, spec, &resolver, frame)?;
            last_field = Some(field);
        }

        if let Some(foreground) = &settings.foreground {
            canvas.composite(&foreground.image, 0, 0, settings.foreground_rule, 1.0);
        }

        self.draw_arrows(&mut canvas, &resolver, frame, last_field.as_ref())?;

        let mask = settings.mask.as_ref().map(|m| m.image.as_ref());
        for spec in specs.specs() {
            draw_markers(&mut canvas, spec, self.area, mask);
            draw_texts(&mut canvas, spec, self.area, mask, self.fonts)?;
        }

        if let Some(combine) = &settings.combine {
            canvas.composite(&combine.overlay.image, combine.x, combine.y, combine.rule, combine.factor);
        }

        if let Some(origin) = origin_time(self.sources, settings.zone) {
            if let Some(text) = stamp_text(settings.stamp, &frame.time, &origin, settings.time.step) {
                draw_stamp(&mut canvas, self.fonts, &text, settings.stamp_xy)?;
            }
        }
        Ok(canvas)
    }

    /// Resolve, contour and paint one spec. Returns the processed field.
    fn draw_spec(
        &mut self,
        canvas: &mut Canvas,
        spec: &mut ContourSpec,
        resolver: &FieldResolver,
        frame: &FrameRequest,
    ) -> QdResult<Field> {
        let param = ParameterId::parse(&spec.param)?;
        let index = locate(self.sources, &param)?;
        let area = self.area;
        tracing::debug!("Param {} from queryfile number {}", spec.param, index + 1);

        let interpolation = Interpolation::parse(&spec.interpolation)?;
        let sources = self.sources;
        let source = sources[index].as_ref();
        let grid = source.grid();
        let window = frame_window(frame, index)?;

        let mut field = resolver.resolve(source, &param, window, spec.replace)?;
        if spec.smoother.is_active() {
            field = spec.smoother.smoothen(&field, &world_points(grid, area));
        }

        let range = field.min_max();
        match range {
            Some((min, max)) => tracing::debug!(param = %spec.param, min, max, "Data range"),
            None => tracing::debug!(param = %spec.param, "Data range is missing"),
        }

        if !spec.grid_labels_added && spec.label_dx > 0 && spec.label_dy > 0 {
            let points = grid_label_points(grid, spec.label_dx, spec.label_dy);
            spec.label_points.extend(points);
            spec.grid_labels_added = true;
        }
        sample_labels(spec, &field, grid);

        for fill in &spec.fills {
            if band_outside(range, fill.lo, fill.hi) {
                continue;
            }
            let request = contour_request(spec, fill.lo, fill.hi, interpolation, self.settings.keep_triangles);
            let path = self.trace(&field, grid, &request);
            canvas.fill_path(&path, fill.color, fill.rule);
        }

        for pattern in &spec.patterns {
            if band_outside(range, pattern.lo, pattern.hi) {
                continue;
            }
            let request = contour_request(spec, pattern.lo, pattern.hi, interpolation, self.settings.keep_triangles);
            let path = self.trace(&field, grid, &request);
            canvas.pattern_fill(&path, &pattern.pattern, pattern.rule, pattern.alpha);
        }

        for line in &spec.lines {
            if line_outside(range, line.value) {
                continue;
            }
            let mut request = contour_request(spec, None, None, interpolation, self.settings.keep_triangles);
            if let Some(value) = line.value {
                request.lo = Some(value);
                request.isoline = true;
            }
            let mut path = self.trace(&field, grid, &request);
            path.simplify_lines(LINE_SIMPLIFY_TOLERANCE);
            canvas.stroke_path(&path, line.color, line.rule, 1.0);
        }

        Ok(field)
    }

    /// Contour through the cache and project the result to pixels.
    fn trace(&mut self, field: &Field, grid: &GridSpec, request: &ContourRequest) -> renderer::Path {
        let path = self.cache.contour(self.engine, field, grid, request);
        if self.cache.was_cached() {
            tracing::debug!(lo = ?request.lo, hi = ?request.hi, "Using cached contour");
        }
        let mut path = (*path).clone();
        path.project(self.area);
        path
    }

    fn draw_arrows(
        &mut self,
        canvas: &mut Canvas,
        resolver: &FieldResolver,
        frame: &FrameRequest,
        last_field: Option<&Field>,
    ) -> QdResult<()> {
        let settings = self.settings;
        let arrows = &settings.arrows;
        let Some(shape) = &arrows.shape else {
            return Ok(());
        };
        if !arrows.has_anchors() {
            return Ok(());
        }

        let direction = match ParameterId::parse(&arrows.direction_param)? {
            ParameterId::Native(name) => name,
            ParameterId::Meta(meta) => return Err(QdError::UnusableParameter(meta.name().to_string())),
        };
        let sources = self.sources;
        let index = locate(sources, &ParameterId::Native(direction.clone()))?;
        let source = sources[index].as_ref();
        let time_index = frame_window(frame, index)?.found;
        let speed = source
            .has_param(&arrows.speed_param)
            .then_some(arrows.speed_param.as_str());
        let level = resolver.level;
        let mask = settings.mask.as_ref().map(|m| m.image.as_ref());

        for &(lon, lat) in &arrows.points {
            let (x, y) = self.area.to_xy(lon, lat);
            if is_masked(mask, x, y) {
                continue;
            }
            let Some(dir) = source.interpolated_value(&direction, level, time_index, lon, lat)? else {
                continue;
            };
            let speed = match speed {
                Some(name) => source.interpolated_value(name, level, time_index, lon, lat)?,
                None => None,
            };
            self.draw_arrow(canvas, shape, (lon, lat), (x, y), dir, speed);
        }

        if arrows.dx == 0 || arrows.dy == 0 {
            return Ok(());
        }
        let grid = source.grid();
        let own = source.values(&direction, level, time_index)?;
        // Grid arrows read directions from the last contoured field when it
        // lies on the same grid
        let directions = match last_field {
            Some(field) if field.shape() == own.shape() => {
                tracing::debug!("Arrow directions taken from the last contoured parameter");
                field
            }
            _ => &own,
        };
        let speeds = match speed {
            Some(name) => Some(source.values(name, level, time_index)?),
            None => None,
        };

        for j in (0..grid.ny).step_by(arrows.dy) {
            for i in (0..grid.nx).step_by(arrows.dx) {
                let (lon, lat) = grid.lon_lat(i, j);
                let (x, y) = self.area.to_xy(lon, lat);
                if is_masked(mask, x, y) {
                    continue;
                }
                let Some(dir) = directions.get(i, j) else {
                    continue;
                };
                let speed = speeds.as_ref().and_then(|f| f.get(i, j));
                self.draw_arrow(canvas, shape, (lon, lat), (x, y), dir, speed);
            }
        }
        Ok(())
    }

    fn draw_arrow(
        &self,
        canvas: &mut Canvas,
        shape: &ArrowShape,
        lonlat: (f64, f64),
        xy: (f64, f64),
        direction: f32,
        speed: Option<f32>,
    ) {
        let arrows = &self.settings.arrows;
        let angle = screen_angle(self.area, lonlat.0, lonlat.1, direction as f64);
        let path = place_arrow(
            shape,
            speed.map(f64::from),
            &arrows.speed_scale,
            arrows.scale,
            angle,
            xy.0,
            xy.1,
        );
        canvas.fill_path(&path, arrows.fill.0, arrows.fill.1);
        canvas.stroke_path(&path, arrows.stroke.0, arrows.stroke.1, 1.0);
    }
}

fn frame_window(frame: &FrameRequest, index: usize) -> QdResult<&SourceFrame> {
    frame
        .sources
        .get(index)
        .ok_or_else(|| QdError::QueryData {
            path: format!("source {}", index + 1),
            message: "no frame window".to_string(),
        })
}

/// Contouring arguments shared by every range of a spec.
pub fn contour_request(
    spec: &ContourSpec,
    lo: Option<f32>,
    hi: Option<f32>,
    interpolation: Interpolation,
    keep_triangles: bool,
) -> ContourRequest {
    ContourRequest {
        exact_hi: hi.is_some() && spec.exact_hi == hi,
        data_lo: spec.data_lo,
        data_hi: spec.data_hi,
        depth: spec.depth,
        interpolation,
        keep_triangles,
        ..ContourRequest::band(lo, hi)
    }
}

/// True when a band cannot intersect the data range. An all-missing field
/// only admits the missing band itself.
pub fn band_outside(range: Option<(f32, f32)>, lo: Option<f32>, hi: Option<f32>) -> bool {
    match range {
        None => lo.is_some() || hi.is_some(),
        Some((min, max)) => lo.is_some_and(|lo| max < lo) || hi.is_some_and(|hi| min > hi),
    }
}

/// True when an isoline value lies outside the data range.
pub fn line_outside(range: Option<(f32, f32)>, value: Option<f32>) -> bool {
    match (range, value) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some((min, max)), Some(v)) => v < min || v > max,
    }
}
