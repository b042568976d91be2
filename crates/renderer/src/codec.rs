//! Image output: format selection, encoder options and the writer seam.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use qd_common::{QdError, QdResult};

use crate::canvas::Canvas;
use crate::png::{encode_png, PngOptions};

/// Output image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Gif,
}

impl ImageFormat {
    pub fn parse(name: &str) -> QdResult<Self> {
        match name {
            "png" => Ok(ImageFormat::Png),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            "gif" => Ok(ImageFormat::Gif),
            other => Err(QdError::UnknownFormat(other.to_string())),
        }
    }

    /// File name extension.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
        }
    }
}

/// Encoder settings collected from the script.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageOptions {
    pub format: ImageFormat,
    pub gamma: Option<f64>,
    pub intent: Option<u8>,
    /// zlib level, -1 = default.
    pub png_quality: i32,
    pub jpeg_quality: i32,
    pub save_alpha: bool,
    pub want_palette: bool,
    pub force_palette: bool,
    /// Binary transparency threshold, -1 = off.
    pub alpha_limit: i32,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            format: ImageFormat::Png,
            gamma: None,
            intent: None,
            png_quality: -1,
            jpeg_quality: 75,
            save_alpha: true,
            want_palette: false,
            force_palette: false,
            alpha_limit: -1,
        }
    }
}

impl ImageOptions {
    pub fn png_options(&self) -> PngOptions {
        PngOptions {
            want_palette: self.want_palette,
            force_palette: self.force_palette,
            save_alpha: self.save_alpha,
            alpha_limit: (self.alpha_limit >= 0).then(|| self.alpha_limit.min(127) as u8),
            gamma: self.gamma.filter(|g| *g > 0.0),
            intent: self.intent,
            level: (self.png_quality >= 0).then(|| self.png_quality.min(9) as u32),
        }
    }
}

/// Sink for finished frames.
pub trait ImageWriter {
    fn write(&mut self, canvas: &Canvas, path: &Path, options: &ImageOptions) -> QdResult<()>;
}

/// Encodes canvases to files on disk.
#[derive(Debug, Default, Clone, Copy)]
pub struct FileImageWriter;

impl ImageWriter for FileImageWriter {
    fn write(&mut self, canvas: &Canvas, path: &Path, options: &ImageOptions) -> QdResult<()> {
        let bytes = encode(canvas, options)?;
        let file = File::create(path)?;
        let mut out = BufWriter::new(file);
        out.write_all(&bytes)?;
        out.flush()?;
        tracing::debug!(file = %path.display(), bytes = bytes.len(), "Image written");
        Ok(())
    }
}

/// Records the target of every frame without encoding it.
#[derive(Debug, Default, Clone)]
pub struct RecordingWriter {
    pub written: Vec<PathBuf>,
}

impl ImageWriter for RecordingWriter {
    fn write(&mut self, _canvas: &Canvas, path: &Path, _options: &ImageOptions) -> QdResult<()> {
        self.written.push(path.to_path_buf());
        Ok(())
    }
}

/// Encode a canvas in memory.
pub fn encode(canvas: &Canvas, options: &ImageOptions) -> QdResult<Vec<u8>> {
    let (width, height) = (canvas.width(), canvas.height());
    let rgba = canvas.to_rgba8();
    let mut out = Vec::new();
    match options.format {
        ImageFormat::Png => {
            return encode_png(&rgba, width as usize, height as usize, &options.png_options());
        }
        ImageFormat::Jpeg => {
            let rgb: Vec<u8> = rgba
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect();
            let quality = options.jpeg_quality.clamp(1, 100) as u8;
            JpegEncoder::new_with_quality(&mut out, quality)
                .encode(&rgb, width, height, ColorType::Rgb8)
                .map_err(|e| QdError::Encode(e.to_string()))?;
        }
        ImageFormat::Gif => {
            let mut encoder = GifEncoder::new(&mut out);
            encoder
                .encode(&rgba, width, height, ColorType::Rgba8)
                .map_err(|e| QdError::Encode(e.to_string()))?;
            drop(encoder);
        }
    }
    Ok(out)
}
