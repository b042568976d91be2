//! Command script interpreter.
//!
//! A script is a stream of whitespace separated tokens. Each command name is
//! followed by its arguments, which may continue on later lines. A command
//! position token starting with `#` or `//` comments out the rest of its line.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use qd_common::{BlendRule, Color, QdError, QdResult, TimeZoneSpec};
use renderer::arrows::METEOROLOGICAL;
use renderer::png::parse_intent;
use renderer::{Alignment, ArrowShape, ContourEngine, DefaultContourEngine, FileImageWriter, ImageFormat, ImageWriter};

use crate::aligner::{FilterPolicy, MAX_TIME_MINUTES};
use crate::compositor::{draw_contours, DrawSummary};
use crate::context::{Combine, RenderContext, SearchPaths, TimestampMode};
use crate::preprocess::Preprocessor;
use crate::resolver::is_valid_name;
use crate::shapes::{draw_shapes, write_imagemap};
use crate::smoothing::SmootherKind;
use crate::spec::{
    ContourLine, ContourPattern, ContourRange, ContourSpec, LabelMarker, LabelPoint, ShapeSpec, ShapeStyle,
};

/// Script tokens with the line each came from.
#[derive(Debug, Default)]
pub struct Tokens {
    tokens: VecDeque<(usize, String)>,
}

impl Tokens {
    pub fn new(text: &str) -> Self {
        let tokens = text
            .lines()
            .enumerate()
            .flat_map(|(line, s)| s.split_whitespace().map(move |t| (line, t.to_string())))
            .collect();
        Self { tokens }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Next command name, skipping comments.
    pub fn next_command(&mut self) -> Option<String> {
        loop {
            let (line, token) = self.tokens.pop_front()?;
            if token.starts_with('#') || token.starts_with("//") {
                while self.tokens.front().is_some_and(|(l, _)| *l == line) {
                    self.tokens.pop_front();
                }
                continue;
            }
            return Some(token);
        }
    }

    pub fn word(&mut self, command: &str) -> QdResult<String> {
        self.tokens
            .pop_front()
            .map(|(_, t)| t)
            .ok_or_else(|| QdError::MissingArgument(command.to_string()))
    }

    pub fn number<T: FromStr>(&mut self, command: &str) -> QdResult<T> {
        let token = self.word(command)?;
        token
            .parse()
            .map_err(|_| QdError::invalid(command, format!("'{}' is not a valid number", token)))
    }

    /// A number or `-` for missing.
    pub fn value(&mut self, command: &str) -> QdResult<Option<f32>> {
        let token = self.word(command)?;
        if token == "-" {
            return Ok(None);
        }
        token
            .parse()
            .map(Some)
            .map_err(|_| QdError::invalid(command, format!("'{}' is not a valid value", token)))
    }

    pub fn flag(&mut self, command: &str) -> QdResult<bool> {
        Ok(self.number::<i64>(command)? != 0)
    }

    pub fn color(&mut self, command: &str) -> QdResult<Color> {
        Color::parse(&self.word(command)?)
    }

    pub fn rule(&mut self, command: &str) -> QdResult<BlendRule> {
        BlendRule::parse(&self.word(command)?)
    }
}

/// Every script command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    QueryData,
    QueryDataLevel,
    Projection,
    TimeStep,
    TimeInterval,
    TimeSteps,
    TimeStepSkip,
    TimeStepRounding,
    Filter,
    Timestamp,
    TimestampZone,
    TimestampImage,
    TimestampImageXY,
    SavePath,
    Prefix,
    Suffix,
    Format,
    Gamma,
    Intent,
    PngQuality,
    JpegQuality,
    SaveAlpha,
    WantPalette,
    ForcePalette,
    AlphaLimit,
    Erase,
    FillRule,
    StrokeRule,
    ForegroundRule,
    Background,
    Foreground,
    Mask,
    Combine,
    DirectionParam,
    SpeedParam,
    ArrowScale,
    WindArrowScale,
    ArrowFill,
    ArrowStroke,
    ArrowPath,
    WindArrow,
    WindArrows,
    Cache,
    Clear,
    Param,
    HiLimit,
    DataLoLimit,
    DataHiLimit,
    DataReplace,
    ContourDepth,
    ContourInterpolation,
    ContourTriangles,
    Smoother,
    SmootherRadius,
    SmootherFactor,
    Shape,
    ContourFill,
    ContourPattern,
    ContourLine,
    ContourFills,
    ContourLines,
    LabelMarker,
    LabelFont,
    LabelSize,
    LabelStroke,
    LabelFill,
    LabelAlign,
    LabelFormat,
    LabelMissing,
    LabelOffset,
    LabelAngle,
    LabelCaption,
    Label,
    LabelXY,
    Labels,
    LabelFile,
    Draw,
}

const COMMANDS: &[(&str, Command)] = &[
    ("querydata", Command::QueryData),
    ("querydatalevel", Command::QueryDataLevel),
    ("projection", Command::Projection),
    ("timestep", Command::TimeStep),
    ("timeinterval", Command::TimeInterval),
    ("timesteps", Command::TimeSteps),
    ("timestepskip", Command::TimeStepSkip),
    ("timesteprounding", Command::TimeStepRounding),
    ("filter", Command::Filter),
    ("timestamp", Command::Timestamp),
    ("timestampzone", Command::TimestampZone),
    ("timestampimage", Command::TimestampImage),
    ("timestampimagexy", Command::TimestampImageXY),
    ("savepath", Command::SavePath),
    ("prefix", Command::Prefix),
    ("suffix", Command::Suffix),
    ("format", Command::Format),
    ("gamma", Command::Gamma),
    ("intent", Command::Intent),
    ("pngquality", Command::PngQuality),
    ("jpegquality", Command::JpegQuality),
    ("savealpha", Command::SaveAlpha),
    ("wantpalette", Command::WantPalette),
    ("forcepalette", Command::ForcePalette),
    ("alphalimit", Command::AlphaLimit),
    ("erase", Command::Erase),
    ("fillrule", Command::FillRule),
    ("strokerule", Command::StrokeRule),
    ("foregroundrule", Command::ForegroundRule),
    ("background", Command::Background),
    ("foreground", Command::Foreground),
    ("mask", Command::Mask),
    ("combine", Command::Combine),
    ("directionparam", Command::DirectionParam),
    ("speedparam", Command::SpeedParam),
    ("arrowscale", Command::ArrowScale),
    ("windarrowscale", Command::WindArrowScale),
    ("arrowfill", Command::ArrowFill),
    ("arrowstroke", Command::ArrowStroke),
    ("arrowpath", Command::ArrowPath),
    ("windarrow", Command::WindArrow),
    ("windarrows", Command::WindArrows),
    ("cache", Command::Cache),
    ("clear", Command::Clear),
    ("param", Command::Param),
    ("hilimit", Command::HiLimit),
    ("datalolimit", Command::DataLoLimit),
    ("datahilimit", Command::DataHiLimit),
    ("datareplace", Command::DataReplace),
    ("contourdepth", Command::ContourDepth),
    ("contourinterpolation", Command::ContourInterpolation),
    ("contourtriangles", Command::ContourTriangles),
    ("smoother", Command::Smoother),
    ("smootherradius", Command::SmootherRadius),
    ("smootherfactor", Command::SmootherFactor),
    ("shape", Command::Shape),
    ("contourfill", Command::ContourFill),
    ("contourpattern", Command::ContourPattern),
    ("contourline", Command::ContourLine),
    ("contourfills", Command::ContourFills),
    ("contourlines", Command::ContourLines),
    ("labelmarker", Command::LabelMarker),
    ("labelfont", Command::LabelFont),
    ("labelsize", Command::LabelSize),
    ("labelstroke", Command::LabelStroke),
    ("labelfill", Command::LabelFill),
    ("labelalign", Command::LabelAlign),
    ("labelformat", Command::LabelFormat),
    ("labelmissing", Command::LabelMissing),
    ("labeloffset", Command::LabelOffset),
    ("labelangle", Command::LabelAngle),
    ("labelcaption", Command::LabelCaption),
    ("label", Command::Label),
    ("labelxy", Command::LabelXY),
    ("labels", Command::Labels),
    ("labelfile", Command::LabelFile),
    ("draw", Command::Draw),
];

impl Command {
    pub fn lookup(name: &str) -> Option<Command> {
        COMMANDS.iter().find(|(n, _)| *n == name).map(|(_, c)| *c)
    }
}

/// A time setting in minutes, `0..=MAX_TIME_MINUTES`.
fn minutes(tokens: &mut Tokens, command: &str) -> QdResult<i64> {
    let value: i64 = tokens.number(command)?;
    if !(0..=MAX_TIME_MINUTES).contains(&value) {
        return Err(QdError::invalid(
            command,
            format!("{} is outside the range 0-{}", value, MAX_TIME_MINUTES),
        ));
    }
    Ok(value)
}

fn stride(tokens: &mut Tokens, command: &str) -> QdResult<usize> {
    let value: i64 = tokens.number(command)?;
    usize::try_from(value).map_err(|_| QdError::invalid(command, "the values must be nonnegative"))
}

fn parameter_name(tokens: &mut Tokens, command: &str) -> QdResult<String> {
    let name = tokens.word(command)?;
    if !is_valid_name(&name) {
        return Err(QdError::UnknownParameter(name));
    }
    Ok(name)
}

/// Runs scripts against one [`RenderContext`].
///
/// The contour engine and the image writer are type parameters so that
/// tests can observe tracing and output without touching the pipeline.
pub struct ScriptInterpreter<E: ContourEngine = DefaultContourEngine, W: ImageWriter = FileImageWriter> {
    ctx: RenderContext,
    engine: E,
    writer: W,
    drawn: DrawSummary,
}

impl ScriptInterpreter {
    pub fn new(paths: SearchPaths) -> Self {
        Self::with_parts(RenderContext::new(paths), DefaultContourEngine, FileImageWriter)
    }
}

impl<E: ContourEngine, W: ImageWriter> ScriptInterpreter<E, W> {
    pub fn with_parts(ctx: RenderContext, engine: E, writer: W) -> Self {
        Self {
            ctx,
            engine,
            writer,
            drawn: DrawSummary::default(),
        }
    }

    pub fn context(&self) -> &RenderContext {
        &self.ctx
    }

    pub fn context_mut(&mut self) -> &mut RenderContext {
        &mut self.ctx
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn writer(&self) -> &W {
        &self.writer
    }

    /// Frames written and skipped by every `draw contours` so far.
    pub fn drawn(&self) -> &DrawSummary {
        &self.drawn
    }

    /// Preprocess and run a script file.
    pub fn run_file(&mut self, path: &Path) -> QdResult<()> {
        tracing::debug!(file = %path.display(), "Running script");
        let text = Preprocessor::new().read_file(path)?;
        self.run(&text)
    }

    /// Run script text. The first failing command aborts the run.
    pub fn run(&mut self, text: &str) -> QdResult<()> {
        let mut tokens = Tokens::new(text);
        while let Some(name) = tokens.next_command() {
            let command = Command::lookup(&name).ok_or_else(|| QdError::UnknownCommand(name.clone()))?;
            self.execute(command, &name, &mut tokens)?;
        }
        Ok(())
    }

    fn execute(&mut self, command: Command, name: &str, tokens: &mut Tokens) -> QdResult<()> {
        let ctx = &mut self.ctx;
        let settings = &mut ctx.settings;
        match command {
            Command::QueryData => {
                let list = tokens.word(name)?;
                ctx.load_querydata(&list)?;
            }
            Command::QueryDataLevel => {
                let level: i64 = tokens.number(name)?;
                settings.level = if level > 0 { (level - 1) as usize } else { 0 };
            }
            Command::Projection => {
                let description = tokens.word(name)?;
                ctx.set_projection(&description)?;
            }

            Command::TimeStep => {
                let step = minutes(tokens, name)?;
                settings.time.step = step;
                settings.time.interval = step;
            }
            Command::TimeInterval => settings.time.interval = minutes(tokens, name)?,
            Command::TimeSteps => settings.time.steps = minutes(tokens, name)?,
            Command::TimeStepSkip => settings.time.skip = minutes(tokens, name)?,
            Command::TimeStepRounding => settings.time.rounding = tokens.flag(name)?,
            Command::Filter => settings.time.filter = FilterPolicy::parse(&tokens.word(name)?)?,
            Command::Timestamp => settings.timestamp_files = tokens.flag(name)?,
            Command::TimestampZone => settings.zone = TimeZoneSpec::parse(&tokens.word(name)?)?,
            Command::TimestampImage => settings.stamp = TimestampMode::parse(&tokens.word(name)?)?,
            Command::TimestampImageXY => {
                settings.stamp_xy = (tokens.number(name)?, tokens.number(name)?);
            }

            Command::SavePath => {
                let path = PathBuf::from(tokens.word(name)?);
                if !path.is_dir() {
                    return Err(QdError::invalid(
                        name,
                        format!("'{}' is not a directory", path.display()),
                    ));
                }
                settings.savepath = path;
            }
            Command::Prefix => settings.prefix = tokens.word(name)?,
            Command::Suffix => settings.suffix = tokens.word(name)?,
            Command::Format => settings.image.format = ImageFormat::parse(&tokens.word(name)?)?,
            Command::Gamma => settings.image.gamma = Some(tokens.number(name)?),
            Command::Intent => settings.image.intent = Some(parse_intent(&tokens.word(name)?)?),
            Command::PngQuality => settings.image.png_quality = tokens.number(name)?,
            Command::JpegQuality => settings.image.jpeg_quality = tokens.number(name)?,
            Command::SaveAlpha => settings.image.save_alpha = tokens.flag(name)?,
            Command::WantPalette => settings.image.want_palette = tokens.flag(name)?,
            Command::ForcePalette => settings.image.force_palette = tokens.flag(name)?,
            Command::AlphaLimit => settings.image.alpha_limit = tokens.number(name)?,

            Command::Erase => settings.erase = tokens.color(name)?,
            Command::FillRule => {
                let rule = tokens.rule(name)?;
                settings.fill_rule = rule;
                if let Some(ShapeStyle::Fill { fill_rule, .. }) = ctx.specs.last_shape_mut().map(|s| &mut s.style) {
                    *fill_rule = rule;
                }
            }
            Command::StrokeRule => {
                let rule = tokens.rule(name)?;
                settings.stroke_rule = rule;
                if let Some(ShapeStyle::Fill { stroke_rule, .. }) = ctx.specs.last_shape_mut().map(|s| &mut s.style) {
                    *stroke_rule = rule;
                }
            }
            Command::ForegroundRule => settings.foreground_rule = tokens.rule(name)?,
            Command::Background => {
                let image = tokens.word(name)?;
                ctx.settings.background = if image == "none" { None } else { Some(ctx.map_image(&image)?) };
            }
            Command::Foreground => {
                let image = tokens.word(name)?;
                ctx.settings.foreground = if image == "none" { None } else { Some(ctx.map_image(&image)?) };
            }
            Command::Mask => {
                let image = tokens.word(name)?;
                ctx.settings.mask = if image == "none" { None } else { Some(ctx.map_image(&image)?) };
            }
            Command::Combine => {
                let image = tokens.word(name)?;
                if image == "none" {
                    ctx.settings.combine = None;
                } else {
                    let x = tokens.number(name)?;
                    let y = tokens.number(name)?;
                    let rule = tokens.rule(name)?;
                    let factor: f32 = tokens.number(name)?;
                    if !(0.0..=1.0).contains(&factor) {
                        return Err(QdError::invalid(name, "combine blending factor must be in range 0-1"));
                    }
                    let overlay = ctx.map_image(&image)?;
                    ctx.settings.combine = Some(Combine {
                        overlay,
                        x,
                        y,
                        rule,
                        factor,
                    });
                }
            }

            Command::DirectionParam => settings.arrows.direction_param = parameter_name(tokens, name)?,
            Command::SpeedParam => settings.arrows.speed_param = parameter_name(tokens, name)?,
            Command::ArrowScale => settings.arrows.scale = tokens.number(name)?,
            Command::WindArrowScale => {
                let a = tokens.number(name)?;
                let b: f64 = tokens.number(name)?;
                let c = tokens.number(name)?;
                if b < 0.0 {
                    return Err(QdError::invalid(name, "the second parameter must be nonnegative"));
                }
                settings.arrows.speed_scale = renderer::SpeedScale { a, b, c };
            }
            Command::ArrowFill => settings.arrows.fill = (tokens.color(name)?, tokens.rule(name)?),
            Command::ArrowStroke => settings.arrows.stroke = (tokens.color(name)?, tokens.rule(name)?),
            Command::ArrowPath => {
                let file = tokens.word(name)?;
                if file != METEOROLOGICAL && !Path::new(&file).exists() {
                    return Err(QdError::invalid(
                        name,
                        format!("the arrowpath file '{}' does not exist", file),
                    ));
                }
                settings.arrows.shape = Some(ArrowShape::load(&file)?);
            }
            Command::WindArrow => {
                let lon = tokens.number(name)?;
                let lat = tokens.number(name)?;
                settings.arrows.points.push((lon, lat));
            }
            Command::WindArrows => {
                settings.arrows.dx = stride(tokens, name)?;
                settings.arrows.dy = stride(tokens, name)?;
            }

            Command::Cache => {
                let enabled = tokens.flag(name)?;
                ctx.cache.set_enabled(enabled);
            }
            Command::Clear => {
                let what = tokens.word(name)?;
                match what.as_str() {
                    "contours" => ctx.specs.clear_specs(),
                    "shapes" => ctx.specs.clear_shapes(),
                    "cache" => ctx.cache.clear(),
                    "arrows" => ctx.settings.arrows.clear(),
                    "labels" => ctx.specs.clear_labels(),
                    other => return Err(QdError::invalid(name, format!("unknown clear target '{}'", other))),
                }
            }

            Command::Param => {
                let param = tokens.word(name)?;
                let spec = ContourSpec::new(&param, &ctx.settings.defaults);
                ctx.specs.push(spec);
            }
            Command::HiLimit => {
                let limit = tokens.number(name)?;
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.exact_hi = Some(limit);
                }
            }
            Command::DataLoLimit => {
                let limit = tokens.number(name)?;
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.data_lo = Some(limit);
                }
            }
            Command::DataHiLimit => {
                let limit = tokens.number(name)?;
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.data_hi = Some(limit);
                }
            }
            Command::DataReplace => {
                let src = tokens.value(name)?;
                let dst = tokens.value(name)?;
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.replace = Some((src, dst));
                }
            }
            Command::ContourDepth => {
                let depth: i64 = tokens.number(name)?;
                let depth = u32::try_from(depth).map_err(|_| QdError::invalid(name, "depth must be nonnegative"))?;
                ctx.settings.defaults.depth = depth;
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.depth = depth;
                }
            }
            Command::ContourInterpolation => {
                let interpolation = tokens.word(name)?;
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.interpolation = interpolation.clone();
                }
                ctx.settings.defaults.interpolation = interpolation;
            }
            Command::ContourTriangles => settings.keep_triangles = tokens.flag(name)?,
            Command::Smoother => {
                let kind = SmootherKind::parse(&tokens.word(name)?)?;
                ctx.settings.defaults.smoother = kind;
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.smoother.kind = kind;
                }
            }
            Command::SmootherRadius => {
                let radius = tokens.number(name)?;
                ctx.settings.defaults.smoother_radius = radius;
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.smoother.radius = radius;
                }
            }
            Command::SmootherFactor => {
                let factor = tokens.number(name)?;
                ctx.settings.defaults.smoother_factor = factor;
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.smoother.factor = factor;
                }
            }

            Command::Shape => {
                let file = tokens.word(name)?;
                let first = tokens.word(name)?;
                let style = if first == "mark" {
                    let marker = tokens.word(name)?;
                    let rule = tokens.rule(name)?;
                    let alpha = tokens.number(name)?;
                    ShapeStyle::Marker {
                        image: ctx.images.get(&marker, None)?,
                        rule,
                        alpha,
                    }
                } else {
                    ShapeStyle::Fill {
                        fill: Color::parse(&first)?,
                        stroke: tokens.color(name)?,
                        fill_rule: ctx.settings.fill_rule,
                        stroke_rule: ctx.settings.stroke_rule,
                    }
                };
                ctx.specs.push_shape(ShapeSpec { file, style });
            }
            Command::ContourFill => {
                let lo = tokens.value(name)?;
                let hi = tokens.value(name)?;
                let color = tokens.color(name)?;
                let rule = ctx.settings.fill_rule;
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.fills.push(ContourRange { lo, hi, color, rule });
                }
            }
            Command::ContourPattern => {
                let lo = tokens.value(name)?;
                let hi = tokens.value(name)?;
                let file = tokens.word(name)?;
                let rule = tokens.rule(name)?;
                let alpha = tokens.number(name)?;
                let pattern = ctx.images.get(&file, ctx.settings.paths.maps.as_deref())?;
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.patterns.push(ContourPattern {
                        lo,
                        hi,
                        pattern,
                        rule,
                        alpha,
                    });
                }
            }
            Command::ContourLine => {
                let value = tokens.value(name)?;
                let color = tokens.color(name)?;
                let rule = ctx.settings.stroke_rule;
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.lines.push(ContourLine { value, color, rule });
                }
            }
            Command::ContourFills => {
                let (lo, hi, step): (f32, f32, f32) = (tokens.number(name)?, tokens.number(name)?, tokens.number(name)?);
                let (c1, c2) = (tokens.color(name)?, tokens.color(name)?);
                let rule = ctx.settings.fill_rule;
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.fills.extend(fill_bands(lo, hi, step, c1, c2, rule));
                }
            }
            Command::ContourLines => {
                let (lo, hi, step): (f32, f32, f32) = (tokens.number(name)?, tokens.number(name)?, tokens.number(name)?);
                let (c1, c2) = (tokens.color(name)?, tokens.color(name)?);
                let rule = ctx.settings.stroke_rule;
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.lines.extend(line_levels(lo, hi, step, c1, c2, rule));
                }
            }

            Command::LabelMarker => {
                let file = tokens.word(name)?;
                let rule = tokens.rule(name)?;
                let alpha = tokens.number(name)?;
                let image = ctx.images.get(&file, None)?;
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.label.marker = Some(LabelMarker { image, rule, alpha });
                }
            }
            Command::LabelFont => {
                let font = tokens.word(name)?;
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.label.font = font;
                }
            }
            Command::LabelSize => {
                let size = tokens.number(name)?;
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.label.size = size;
                }
            }
            Command::LabelStroke => {
                let (color, rule) = (tokens.color(name)?, tokens.rule(name)?);
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.label.stroke_color = color;
                    spec.label.stroke_rule = rule;
                }
            }
            Command::LabelFill => {
                let (color, rule) = (tokens.color(name)?, tokens.rule(name)?);
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.label.fill_color = color;
                    spec.label.fill_rule = rule;
                }
            }
            Command::LabelAlign => {
                let align = Alignment::parse(&tokens.word(name)?)?;
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.label.align = align;
                }
            }
            Command::LabelFormat => {
                let mut format = tokens.word(name)?;
                if format == "-" {
                    format.clear();
                }
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.label.format = format;
                }
            }
            Command::LabelMissing => {
                let mut missing = tokens.word(name)?;
                if missing == "none" {
                    missing.clear();
                }
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.label.missing = missing;
                }
            }
            Command::LabelOffset => {
                let offset = (tokens.number(name)?, tokens.number(name)?);
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.label.offset = offset;
                }
            }
            Command::LabelAngle => {
                let angle = tokens.number(name)?;
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.label.angle = angle;
                }
            }
            Command::LabelCaption => {
                let caption = tokens.word(name)?;
                let offset = (tokens.number(name)?, tokens.number(name)?);
                let align = Alignment::parse(&tokens.word(name)?)?;
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.label.caption = caption;
                    spec.label.caption_offset = offset;
                    spec.label.caption_align = align;
                }
            }
            Command::Label => {
                let (lon, lat) = (tokens.number(name)?, tokens.number(name)?);
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.add_label(LabelPoint::new(lon, lat));
                }
            }
            Command::LabelXY => {
                let (lon, lat) = (tokens.number(name)?, tokens.number(name)?);
                let (x, y): (i64, i64) = (tokens.number(name)?, tokens.number(name)?);
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.add_label(LabelPoint::at_pixel(lon, lat, x as f64, y as f64));
                }
            }
            Command::Labels => {
                let (dx, dy) = (stride(tokens, name)?, stride(tokens, name)?);
                if let Some(spec) = ctx.specs.current_mut() {
                    spec.label_dx = dx;
                    spec.label_dy = dy;
                }
            }
            Command::LabelFile => {
                let file = tokens.word(name)?;
                let points = read_label_file(Path::new(&file))?;
                if let Some(spec) = ctx.specs.current_mut() {
                    for point in points {
                        spec.add_label(point);
                    }
                }
            }

            Command::Draw => {
                let what = tokens.word(name)?;
                match what.as_str() {
                    "shapes" => {
                        let file = tokens.word("draw shapes")?;
                        draw_shapes(&self.ctx, &mut self.writer, &file)?;
                    }
                    "imagemap" => {
                        let field = tokens.word("draw imagemap")?;
                        let file = tokens.word("draw imagemap")?;
                        write_imagemap(&self.ctx, &field, &file)?;
                    }
                    "contours" => {
                        let summary = draw_contours(&mut self.ctx, &self.engine, &mut self.writer)?;
                        self.drawn.written.extend(summary.written);
                        self.drawn.skipped.extend(summary.skipped);
                    }
                    other => {
                        return Err(QdError::invalid(name, format!("draw {} not implemented", other)));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Equal width fill bands from `lo` to `hi` with colours interpolated from
/// `c1` to `c2`.
pub fn fill_bands(lo: f32, hi: f32, step: f32, c1: Color, c2: Color, rule: BlendRule) -> Vec<ContourRange> {
    if step <= 0.0 {
        return Vec::new();
    }
    let steps = ((hi - lo) / step).trunc() as i32;
    (0..steps.max(0))
        .map(|i| {
            let color = if steps == 1 {
                c1
            } else {
                c1.interpolate(&c2, i as f64 / (steps - 1) as f64)
            };
            ContourRange {
                lo: Some(lo + i as f32 * step),
                hi: Some(lo + (i + 1) as f32 * step),
                color,
                rule,
            }
        })
        .collect()
}

/// Isolines at `lo, lo + step, ..` up to `hi`.
pub fn line_levels(lo: f32, hi: f32, step: f32, c1: Color, c2: Color, rule: BlendRule) -> Vec<ContourLine> {
    if step <= 0.0 {
        return Vec::new();
    }
    let steps = ((hi - lo) / step).trunc() as i32;
    (0..=steps.max(0))
        .map(|i| {
            let color = if steps == 0 {
                c1
            } else {
                c1.interpolate(&c2, i as f64 / steps as f64)
            };
            ContourLine {
                value: Some(lo + i as f32 * step),
                color,
                rule,
            }
        })
        .collect()
}

/// Read `label lon lat` lines. `#` and `//` start comment lines.
pub fn read_label_file(path: &Path) -> QdResult<Vec<LabelPoint>> {
    if !path.is_file() {
        return Err(QdError::FileNotFound(path.display().to_string()));
    }
    let text = std::fs::read_to_string(path)?;
    let mut tokens = Tokens::new(&text);
    let mut points = Vec::new();
    while let Some(command) = tokens.next_command() {
        if command != "label" {
            return Err(QdError::invalid("labelfile", format!("Unknown datacommand {}", command)));
        }
        let lon = tokens.number("labelfile")?;
        let lat = tokens.number("labelfile")?;
        points.push(LabelPoint::new(lon, lat));
    }
    Ok(points)
}
