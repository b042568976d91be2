//! PNG encoding for RGBA image data.
//!
//! Supports three encoding modes:
//! - **Indexed PNG (color type 3)**: when a palette is wanted and the image has
//!   ≤256 unique colors, or when a palette is forced by quantizing.
//! - **RGBA PNG (color type 6)**: full color with alpha.
//! - **RGB PNG (color type 2)**: full color when alpha is not saved.

use rayon::prelude::*;
use std::collections::HashMap;
use std::io::Write;

use qd_common::{QdError, QdResult};

/// Maximum colors for indexed PNG (PNG8)
const MAX_PALETTE_SIZE: usize = 256;

/// Minimum pixels to benefit from parallel palette extraction
const PARALLEL_THRESHOLD: usize = 4096; // 64x64 or larger

/// zlib level used when none is configured
const DEFAULT_LEVEL: u32 = 6;

/// Encoder settings, mirroring the output commands of a script.
#[derive(Debug, Clone, PartialEq)]
pub struct PngOptions {
    /// Write an indexed image when the colors fit in a palette.
    pub want_palette: bool,
    /// Quantize to a palette when the colors do not fit.
    pub force_palette: bool,
    /// Keep the alpha channel.
    pub save_alpha: bool,
    /// Binary transparency threshold on the 0-127 transparency scale, `None` = off.
    pub alpha_limit: Option<u8>,
    /// File gamma written as a gAMA chunk.
    pub gamma: Option<f64>,
    /// Rendering intent written as an sRGB chunk.
    pub intent: Option<u8>,
    /// zlib level 0-9, `None` = default.
    pub level: Option<u32>,
}

impl Default for PngOptions {
    fn default() -> Self {
        Self {
            want_palette: false,
            force_palette: false,
            save_alpha: true,
            alpha_limit: None,
            gamma: None,
            intent: None,
            level: None,
        }
    }
}

/// Parse an sRGB rendering intent name.
pub fn parse_intent(name: &str) -> QdResult<u8> {
    match name {
        "Perceptual" => Ok(0),
        "Relative" | "RelativeColorimetric" => Ok(1),
        "Saturation" => Ok(2),
        "Absolute" | "AbsoluteColorimetric" => Ok(3),
        other => Err(QdError::invalid("intent", format!("unknown rendering intent '{}'", other))),
    }
}

/// Encode straight-alpha RGBA pixels.
pub fn encode_png(pixels: &[u8], width: usize, height: usize, options: &PngOptions) -> QdResult<Vec<u8>> {
    if pixels.len() != width * height * 4 {
        return Err(QdError::Encode(format!(
            "expected {} bytes for a {}x{} image, got {}",
            width * height * 4,
            width,
            height,
            pixels.len()
        )));
    }

    let mut pixels = pixels.to_vec();
    if let Some(limit) = options.alpha_limit {
        apply_alpha_limit(&mut pixels, limit);
    }
    if !options.save_alpha {
        for px in pixels.chunks_exact_mut(4) {
            px[3] = 255;
        }
    }

    let level = options.level.unwrap_or(DEFAULT_LEVEL).min(9);

    if options.want_palette || options.force_palette {
        if let Some((palette, indices)) = extract_palette(&pixels) {
            return create_png_indexed(width, height, &palette, &indices, level, options);
        }
        if options.force_palette {
            quantize(&mut pixels);
            if let Some((palette, indices)) = extract_palette(&pixels) {
                return create_png_indexed(width, height, &palette, &indices, level, options);
            }
        }
    }

    if options.save_alpha {
        create_png(&pixels, width, height, 4, level, options)
    } else {
        let rgb: Vec<u8> = pixels
            .chunks_exact(4)
            .flat_map(|px| [px[0], px[1], px[2]])
            .collect();
        create_png(&rgb, width, height, 3, level, options)
    }
}

/// Pixels more transparent than `limit` become fully transparent, the rest opaque.
fn apply_alpha_limit(pixels: &mut [u8], limit: u8) {
    for px in pixels.chunks_exact_mut(4) {
        let transparency = 127 - (px[3] as u32 * 127 / 255);
        px[3] = if transparency > limit as u32 { 0 } else { 255 };
    }
}

/// Reduce to a 6x6x6 color cube plus a single transparent entry.
fn quantize(pixels: &mut [u8]) {
    let level = |c: u8| ((c as u32 + 25) / 51 * 51) as u8;
    for px in pixels.chunks_exact_mut(4) {
        if px[3] < 128 {
            px.copy_from_slice(&[0, 0, 0, 0]);
        } else {
            px[0] = level(px[0]);
            px[1] = level(px[1]);
            px[2] = level(px[2]);
            px[3] = 255;
        }
    }
}

fn extract_palette(pixels: &[u8]) -> Option<(Vec<(u8, u8, u8, u8)>, Vec<u8>)> {
    if pixels.len() / 4 >= PARALLEL_THRESHOLD {
        extract_palette_parallel(pixels)
    } else {
        extract_palette_sequential(pixels)
    }
}

/// Pack RGBA bytes into a u32 for faster hashing and comparison
#[inline(always)]
fn pack_color(r: u8, g: u8, b: u8, a: u8) -> u32 {
    (r as u32) | ((g as u32) << 8) | ((b as u32) << 16) | ((a as u32) << 24)
}

#[inline(always)]
fn unpack_color(packed: u32) -> (u8, u8, u8, u8) {
    (
        packed as u8,
        (packed >> 8) as u8,
        (packed >> 16) as u8,
        (packed >> 24) as u8,
    )
}

/// Sequential palette extraction for small images.
fn extract_palette_sequential(pixels: &[u8]) -> Option<(Vec<(u8, u8, u8, u8)>, Vec<u8>)> {
    let mut color_to_index: HashMap<u32, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette: Vec<(u8, u8, u8, u8)> = Vec::with_capacity(MAX_PALETTE_SIZE);
    let mut indices: Vec<u8> = Vec::with_capacity(pixels.len() / 4);

    for chunk in pixels.chunks_exact(4) {
        let packed = pack_color(chunk[0], chunk[1], chunk[2], chunk[3]);

        let index = match color_to_index.get(&packed) {
            Some(&idx) => idx,
            None => {
                if palette.len() >= MAX_PALETTE_SIZE {
                    return None;
                }
                let idx = palette.len() as u8;
                palette.push((chunk[0], chunk[1], chunk[2], chunk[3]));
                color_to_index.insert(packed, idx);
                idx
            }
        };
        indices.push(index);
    }

    Some((palette, indices))
}

/// Parallel palette extraction for larger images.
///
/// Unique colors are collected per chunk on the rayon pool, merged, and then
/// every pixel is mapped to its index in a second parallel pass.
fn extract_palette_parallel(pixels: &[u8]) -> Option<(Vec<(u8, u8, u8, u8)>, Vec<u8>)> {
    let chunk_size = (pixels.len() / 4 / rayon::current_num_threads()).max(256) * 4;

    let unique_colors: Vec<u32> = pixels
        .par_chunks(chunk_size)
        .flat_map(|chunk| {
            let mut local_colors: HashMap<u32, ()> = HashMap::with_capacity(MAX_PALETTE_SIZE);
            for pixel in chunk.chunks_exact(4) {
                local_colors.insert(pack_color(pixel[0], pixel[1], pixel[2], pixel[3]), ());
                // Early exit if we definitely have too many colors
                if local_colors.len() > MAX_PALETTE_SIZE {
                    break;
                }
            }
            local_colors.into_keys().collect::<Vec<_>>()
        })
        .collect();

    let mut global_colors: HashMap<u32, u8> = HashMap::with_capacity(MAX_PALETTE_SIZE);
    let mut palette: Vec<(u8, u8, u8, u8)> = Vec::with_capacity(MAX_PALETTE_SIZE);
    for packed in unique_colors {
        if !global_colors.contains_key(&packed) {
            if palette.len() >= MAX_PALETTE_SIZE {
                return None;
            }
            global_colors.insert(packed, palette.len() as u8);
            palette.push(unpack_color(packed));
        }
    }

    let indices: Vec<u8> = pixels
        .par_chunks_exact(4)
        .map(|p| {
            global_colors
                .get(&pack_color(p[0], p[1], p[2], p[3]))
                .copied()
                .unwrap_or(0)
        })
        .collect();

    Some((palette, indices))
}

fn write_header(png: &mut Vec<u8>, width: usize, height: usize, color_type: u8, options: &PngOptions) {
    // PNG signature
    png.extend_from_slice(&[137, 80, 78, 71, 13, 10, 26, 10]);

    let mut ihdr_data = Vec::with_capacity(13);
    ihdr_data.extend_from_slice(&(width as u32).to_be_bytes());
    ihdr_data.extend_from_slice(&(height as u32).to_be_bytes());
    ihdr_data.push(8); // bit depth
    ihdr_data.push(color_type);
    ihdr_data.push(0); // compression method
    ihdr_data.push(0); // filter method
    ihdr_data.push(0); // interlace method
    write_chunk(png, b"IHDR", &ihdr_data);

    if let Some(gamma) = options.gamma {
        let value = (gamma * 100_000.0).round() as u32;
        write_chunk(png, b"gAMA", &value.to_be_bytes());
    }
    if let Some(intent) = options.intent {
        write_chunk(png, b"sRGB", &[intent]);
    }
}

/// Create an indexed PNG (color type 3) from palette and indices.
fn create_png_indexed(
    width: usize,
    height: usize,
    palette: &[(u8, u8, u8, u8)],
    indices: &[u8],
    level: u32,
    options: &PngOptions,
) -> QdResult<Vec<u8>> {
    let mut png = Vec::new();
    write_header(&mut png, width, height, 3, options);

    let mut plte_data = Vec::with_capacity(palette.len() * 3);
    for (r, g, b, _) in palette {
        plte_data.extend_from_slice(&[*r, *g, *b]);
    }
    write_chunk(&mut png, b"PLTE", &plte_data);

    // tRNS only when some entry is not opaque
    if palette.iter().any(|(_, _, _, a)| *a < 255) {
        let trns_data: Vec<u8> = palette.iter().map(|(_, _, _, a)| *a).collect();
        write_chunk(&mut png, b"tRNS", &trns_data);
    }

    let idat_data = deflate_idat(indices, width, height, 1, level)?;
    write_chunk(&mut png, b"IDAT", &idat_data);
    write_chunk(&mut png, b"IEND", &[]);

    Ok(png)
}

/// Create a truecolor PNG with 3 (RGB) or 4 (RGBA) channels.
fn create_png(
    pixels: &[u8],
    width: usize,
    height: usize,
    channels: usize,
    level: u32,
    options: &PngOptions,
) -> QdResult<Vec<u8>> {
    let mut png = Vec::new();
    let color_type = if channels == 4 { 6 } else { 2 };
    write_header(&mut png, width, height, color_type, options);

    let idat_data = deflate_idat(pixels, width, height, channels, level)?;
    write_chunk(&mut png, b"IDAT", &idat_data);
    write_chunk(&mut png, b"IEND", &[]);

    Ok(png)
}

/// Write a PNG chunk
fn write_chunk(png: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    png.extend_from_slice(&(data.len() as u32).to_be_bytes());
    png.extend_from_slice(chunk_type);
    png.extend_from_slice(data);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(chunk_type);
    hasher.update(data);
    png.extend_from_slice(&hasher.finalize().to_be_bytes());
}

/// Deflate scanlines for the IDAT chunk.
fn deflate_idat(data: &[u8], width: usize, height: usize, bytes_per_pixel: usize, level: u32) -> QdResult<Vec<u8>> {
    let row = width * bytes_per_pixel;
    let mut uncompressed = Vec::with_capacity(height * (1 + row));
    for y in 0..height {
        uncompressed.push(0); // filter type: none
        uncompressed.extend_from_slice(&data[y * row..(y + 1) * row]);
    }

    let mut encoder = flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::new(level));
    encoder
        .write_all(&uncompressed)
        .and_then(|_| encoder.finish())
        .map_err(|e| QdError::Encode(format!("IDAT compression failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_types(png: &[u8]) -> Vec<String> {
        let mut types = Vec::new();
        let mut pos = 8;
        while pos + 8 <= png.len() {
            let len = u32::from_be_bytes([png[pos], png[pos + 1], png[pos + 2], png[pos + 3]]) as usize;
            types.push(String::from_utf8_lossy(&png[pos + 4..pos + 8]).to_string());
            pos += 12 + len;
        }
        types
    }

    fn two_colors() -> Vec<u8> {
        vec![255, 0, 0, 255, 0, 0, 255, 128, 255, 0, 0, 255, 0, 0, 255, 128]
    }

    #[test]
    fn test_extract_palette_simple() {
        let pixels = two_colors();
        let (palette, indices) = extract_palette_sequential(&pixels).unwrap();
        assert_eq!(palette.len(), 2);
        assert_eq!(indices, vec![0, 1, 0, 1]);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let pixels: Vec<u8> = (0..PARALLEL_THRESHOLD * 4).map(|i| ((i / 4) % 7) as u8 * 30).collect();
        let (seq_palette, seq_indices) = extract_palette_sequential(&pixels).unwrap();
        let (par_palette, par_indices) = extract_palette_parallel(&pixels).unwrap();
        assert_eq!(seq_palette.len(), par_palette.len());
        for (k, (s, p)) in seq_indices.iter().zip(&par_indices).enumerate() {
            assert_eq!(seq_palette[*s as usize], par_palette[*p as usize], "pixel {}", k);
        }
    }

    #[test]
    fn test_rgba_default() {
        let png = encode_png(&two_colors(), 2, 2, &PngOptions::default()).unwrap();
        assert_eq!(&png[..8], &[137, 80, 78, 71, 13, 10, 26, 10]);
        assert_eq!(png[25], 6);
        assert_eq!(chunk_types(&png), vec!["IHDR", "IDAT", "IEND"]);
    }

    #[test]
    fn test_palette_gamma_and_intent() {
        let options = PngOptions {
            want_palette: true,
            gamma: Some(2.2),
            intent: Some(0),
            ..PngOptions::default()
        };
        let png = encode_png(&two_colors(), 2, 2, &options).unwrap();
        assert_eq!(png[25], 3);
        assert_eq!(chunk_types(&png), vec!["IHDR", "gAMA", "sRGB", "PLTE", "tRNS", "IDAT", "IEND"]);
    }

    #[test]
    fn test_without_alpha_is_rgb() {
        let options = PngOptions {
            save_alpha: false,
            ..PngOptions::default()
        };
        let png = encode_png(&two_colors(), 2, 2, &options).unwrap();
        assert_eq!(png[25], 2);
    }

    #[test]
    fn test_force_palette_quantizes() {
        let pixels: Vec<u8> = (0..1000u32).flat_map(|i| [(i % 256) as u8, (i / 4 % 256) as u8, 7, 255]).collect();
        assert!(extract_palette_sequential(&pixels).is_none());
        let options = PngOptions {
            force_palette: true,
            ..PngOptions::default()
        };
        let png = encode_png(&pixels, 1000, 1, &options).unwrap();
        assert_eq!(png[25], 3);
    }

    #[test]
    fn test_alpha_limit() {
        let mut pixels = vec![0, 0, 0, 255, 0, 0, 0, 200, 0, 0, 0, 10];
        apply_alpha_limit(&mut pixels, 40);
        assert_eq!([pixels[3], pixels[7], pixels[11]], [255, 255, 0]);
    }

    #[test]
    fn test_size_mismatch() {
        assert!(encode_png(&[0, 0, 0], 1, 1, &PngOptions::default()).is_err());
    }

    #[test]
    fn test_intent_names() {
        assert_eq!(parse_intent("Saturation").unwrap(), 2);
        assert!(parse_intent("Vivid").is_err());
    }

    #[test]
    fn test_decodes_with_image_crate() {
        let png = encode_png(&two_colors(), 2, 2, &PngOptions::default()).unwrap();
        let img = image::load_from_memory(&png).unwrap().to_rgba8();
        assert_eq!(img.get_pixel(1, 0).0, [0, 0, 255, 128]);
    }
}
