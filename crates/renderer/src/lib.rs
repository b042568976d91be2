//! Raster rendering for qdcontour.
//!
//! Everything the frame compositor draws with lives here:
//! - Vector paths and SVG path data ([`path`])
//! - Contour tracing and the contour result cache ([`contour`], [`cache`])
//! - The RGBA canvas and blending rules ([`canvas`])
//! - Wind arrows and barbs ([`arrows`])
//! - Label text and printf-style number formatting ([`text`])
//! - Image input, PNG/JPEG/GIF output ([`image_io`], [`png`], [`codec`])
//! - Shapefile geometry for map overlays ([`shapefile`])

pub mod arrows;
pub mod cache;
pub mod canvas;
pub mod codec;
pub mod contour;
pub mod image_io;
pub mod path;
pub mod png;
pub mod shapefile;
pub mod text;

pub use arrows::{ArrowShape, SpeedScale};
pub use cache::ContourCache;
pub use canvas::Canvas;
pub use codec::{FileImageWriter, ImageFormat, ImageOptions, ImageWriter, RecordingWriter};
pub use contour::{ContourEngine, ContourRequest, DefaultContourEngine, Interpolation};
pub use path::Path;
pub use shapefile::ShapeFile;
pub use text::{Alignment, FontLibrary, TextStyle};
