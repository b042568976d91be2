//! Script state shared by the interpreter and the frame compositor.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use projection::{parse_area, MapArea};
use qd_common::{BlendRule, Color, QdError, QdResult, TimeZoneSpec};
use querydata::{GridSource, QueryData};
use renderer::image_io::{read_image, resolve};
use renderer::{ArrowShape, Canvas, ContourCache, FontLibrary, ImageOptions, SpeedScale};

use crate::aligner::TimeSettings;
use crate::spec::{SpecDefaults, SpecRegistry};

/// Directories searched for files named in scripts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPaths {
    /// Querydata files.
    pub data: Option<PathBuf>,
    /// Background, foreground, mask and combine images.
    pub maps: Option<PathBuf>,
    /// TrueType fonts.
    pub fonts: Option<PathBuf>,
}

/// What the `timestampimage` stamp shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampMode {
    #[default]
    None,
    /// Valid time of the frame.
    Obs,
    /// Forecast origin time.
    For,
    /// Origin time with the elapsed time to the frame.
    ForObs,
}

impl TimestampMode {
    pub fn parse(s: &str) -> QdResult<Self> {
        match s {
            "none" => Ok(TimestampMode::None),
            "obs" => Ok(TimestampMode::Obs),
            "for" => Ok(TimestampMode::For),
            "forobs" => Ok(TimestampMode::ForObs),
            other => Err(QdError::UnknownTimestampMode(other.to_string())),
        }
    }
}

/// A named image from the maps directory.
#[derive(Debug, Clone)]
pub struct Overlay {
    pub name: String,
    pub image: Arc<Canvas>,
}

/// Image blended over the finished frame at a fixed position.
#[derive(Debug, Clone)]
pub struct Combine {
    pub overlay: Overlay,
    pub x: i32,
    pub y: i32,
    pub rule: BlendRule,
    pub factor: f32,
}

/// Wind arrow configuration.
#[derive(Debug, Clone)]
pub struct ArrowSettings {
    pub direction_param: String,
    pub speed_param: String,
    pub scale: f64,
    pub speed_scale: SpeedScale,
    pub fill: (Color, BlendRule),
    pub stroke: (Color, BlendRule),
    /// Glyph, `None` until `arrowpath` is given.
    pub shape: Option<ArrowShape>,
    /// Explicit anchor points as `(lon, lat)`.
    pub points: Vec<(f64, f64)>,
    /// Grid stride, 0 disables.
    pub dx: usize,
    pub dy: usize,
}

impl Default for ArrowSettings {
    fn default() -> Self {
        Self {
            direction_param: "WindDirection".to_string(),
            speed_param: "WindSpeedMS".to_string(),
            scale: 1.0,
            speed_scale: SpeedScale::default(),
            fill: (Color::WHITE, BlendRule::Over),
            stroke: (Color::BLACK, BlendRule::Over),
            shape: None,
            points: Vec::new(),
            dx: 0,
            dy: 0,
        }
    }
}

impl ArrowSettings {
    pub fn has_anchors(&self) -> bool {
        !self.points.is_empty() || (self.dx > 0 && self.dy > 0)
    }

    pub fn clear(&mut self) {
        self.points.clear();
        self.dx = 0;
        self.dy = 0;
    }
}

/// Global settings changed by script commands.
#[derive(Debug, Clone)]
pub struct Settings {
    pub paths: SearchPaths,
    pub force: bool,
    pub time: TimeSettings,
    pub zone: TimeZoneSpec,
    /// Append querydata modification stamps to file names.
    pub timestamp_files: bool,
    pub stamp: TimestampMode,
    pub stamp_xy: (i32, i32),
    pub level: usize,

    pub savepath: PathBuf,
    pub prefix: String,
    pub suffix: String,
    pub image: ImageOptions,

    pub erase: Color,
    pub fill_rule: BlendRule,
    pub stroke_rule: BlendRule,
    pub foreground_rule: BlendRule,
    pub background: Option<Overlay>,
    pub foreground: Option<Overlay>,
    pub mask: Option<Overlay>,
    pub combine: Option<Combine>,

    pub defaults: SpecDefaults,
    pub keep_triangles: bool,
    pub arrows: ArrowSettings,
}

impl Settings {
    pub fn new(paths: SearchPaths) -> Self {
        Self {
            paths,
            force: false,
            time: TimeSettings::default(),
            zone: TimeZoneSpec::Local,
            timestamp_files: false,
            stamp: TimestampMode::None,
            stamp_xy: (0, 0),
            level: 0,
            savepath: PathBuf::from("."),
            prefix: String::new(),
            suffix: String::new(),
            image: ImageOptions::default(),
            erase: Color::TRANSPARENT,
            fill_rule: BlendRule::Atop,
            stroke_rule: BlendRule::Atop,
            foreground_rule: BlendRule::Over,
            background: None,
            foreground: None,
            mask: None,
            combine: None,
            defaults: SpecDefaults::default(),
            keep_triangles: true,
            arrows: ArrowSettings::default(),
        }
    }
}

/// Images read during a run, keyed by resolved path.
#[derive(Debug, Default)]
pub struct ImageStore {
    images: HashMap<PathBuf, Arc<Canvas>>,
}

impl ImageStore {
    /// Read an image by name, as given or under `search_dir`.
    pub fn get(&mut self, name: &str, search_dir: Option<&Path>) -> QdResult<Arc<Canvas>> {
        let path = resolve(name, search_dir);
        if let Some(image) = self.images.get(&path) {
            return Ok(Arc::clone(image));
        }
        let image = Arc::new(read_image(&path)?);
        self.images.insert(path, Arc::clone(&image));
        Ok(image)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

/// All state of one script run.
pub struct RenderContext {
    pub settings: Settings,
    pub specs: SpecRegistry,
    pub cache: ContourCache,
    pub fonts: FontLibrary,
    pub images: ImageStore,
    pub(crate) area: Option<MapArea>,
    pub(crate) sources: Vec<Box<dyn GridSource>>,
    query_list: String,
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("settings", &self.settings)
            .field("specs", &self.specs.specs().len())
            .field("shapes", &self.specs.shapes().len())
            .field("sources", &self.query_list)
            .field("projection", &self.area.is_some())
            .finish()
    }
}

impl RenderContext {
    pub fn new(paths: SearchPaths) -> Self {
        let fonts = FontLibrary::new(paths.fonts.clone());
        Self {
            settings: Settings::new(paths),
            specs: SpecRegistry::new(),
            cache: ContourCache::new(),
            fonts,
            images: ImageStore::default(),
            area: None,
            sources: Vec::new(),
            query_list: String::new(),
        }
    }

    pub fn area(&self) -> Option<&MapArea> {
        self.area.as_ref()
    }

    pub fn set_projection(&mut self, description: &str) -> QdResult<()> {
        self.area = Some(parse_area(description)?);
        Ok(())
    }

    pub fn sources(&self) -> &[Box<dyn GridSource>] {
        &self.sources
    }

    /// Replace the source set. The contour cache is cleared with it.
    pub fn set_sources(&mut self, list: &str, sources: Vec<Box<dyn GridSource>>) {
        self.sources = sources;
        self.query_list = list.to_string();
        self.cache.clear();
    }

    /// Open a comma separated list of querydata files. Nothing is read
    /// when the list equals the active one.
    pub fn load_querydata(&mut self, list: &str) -> QdResult<bool> {
        if list == self.query_list {
            return Ok(false);
        }
        let mut sources: Vec<Box<dyn GridSource>> = Vec::new();
        for name in list.split(',').filter(|n| !n.is_empty()) {
            let path = self.data_file(name);
            if !path.exists() {
                return Err(QdError::FileNotFound(name.to_string()));
            }
            tracing::debug!(file = %path.display(), "Reading querydata");
            sources.push(Box::new(QueryData::open(&path)?));
        }
        self.set_sources(list, sources);
        Ok(true)
    }

    /// A querydata file as given, else under the data directory.
    fn data_file(&self, name: &str) -> PathBuf {
        let direct = PathBuf::from(name);
        match &self.settings.paths.data {
            Some(dir) if !direct.exists() => dir.join(name),
            _ => direct,
        }
    }

    /// An image from the maps directory.
    pub fn map_image(&mut self, name: &str) -> QdResult<Overlay> {
        let image = self.images.get(name, self.settings.paths.maps.as_deref())?;
        Ok(Overlay {
            name: name.to_string(),
            image,
        })
    }
}
