//! Text rendering with TrueType fonts and printf-style number formatting.

use std::collections::HashMap;
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_text_mut;
use qd_common::{BlendRule, Color, QdError, QdResult};
use rusttype::{point, Font, Scale};

use crate::canvas::Canvas;

/// Fonts tried when a named font cannot be found.
const FALLBACK_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu-sans-fonts/DejaVuSans.ttf",
    "/usr/local/share/fonts/DejaVuSans.ttf",
    "/Library/Fonts/DejaVuSans.ttf",
];

/// Where the anchor point lies on the text box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Alignment {
    #[default]
    Center,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Alignment {
    pub fn parse(s: &str) -> QdResult<Self> {
        let align = match s {
            "Center" => Alignment::Center,
            "North" => Alignment::North,
            "NorthEast" => Alignment::NorthEast,
            "East" => Alignment::East,
            "SouthEast" => Alignment::SouthEast,
            "South" => Alignment::South,
            "SouthWest" => Alignment::SouthWest,
            "West" => Alignment::West,
            "NorthWest" => Alignment::NorthWest,
            other => return Err(QdError::invalid("labelalign", format!("unknown alignment '{}'", other))),
        };
        Ok(align)
    }

    /// Offset of the text box top left corner from the anchor.
    fn offset(&self, width: f32, height: f32) -> (f32, f32) {
        let x = match self {
            Alignment::West | Alignment::NorthWest | Alignment::SouthWest => 0.0,
            Alignment::East | Alignment::NorthEast | Alignment::SouthEast => -width,
            _ => -width / 2.0,
        };
        let y = match self {
            Alignment::North | Alignment::NorthEast | Alignment::NorthWest => 0.0,
            Alignment::South | Alignment::SouthEast | Alignment::SouthWest => -height,
            _ => -height / 2.0,
        };
        (x, y)
    }
}

/// Resolves font names to loaded fonts, caching each file once.
#[derive(Default)]
pub struct FontLibrary {
    fonts_path: Option<PathBuf>,
    fonts: HashMap<String, Arc<Font<'static>>>,
}

impl std::fmt::Debug for FontLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontLibrary")
            .field("fonts_path", &self.fonts_path)
            .field("loaded", &self.fonts.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl FontLibrary {
    pub fn new(fonts_path: Option<PathBuf>) -> Self {
        Self {
            fonts_path,
            fonts: HashMap::new(),
        }
    }

    /// Load a font by file path or by name under the fonts directory,
    /// falling back to a system DejaVu font.
    pub fn font(&mut self, name: &str) -> QdResult<Arc<Font<'static>>> {
        if let Some(font) = self.fonts.get(name) {
            return Ok(Arc::clone(font));
        }

        let mut candidates: Vec<PathBuf> = Vec::new();
        if !name.is_empty() {
            candidates.push(PathBuf::from(name));
            if let Some(dir) = &self.fonts_path {
                candidates.push(dir.join(format!("{}.ttf", name)));
            }
        }
        candidates.extend(FALLBACK_FONTS.iter().map(PathBuf::from));

        let file = candidates
            .into_iter()
            .find(|p| p.is_file())
            .ok_or_else(|| QdError::Font(format!("font '{}' not found", name)))?;
        let font = Arc::new(load_font(&file)?);
        tracing::debug!(font = name, file = %file.display(), "Font loaded");
        self.fonts.insert(name.to_string(), Arc::clone(&font));
        Ok(font)
    }
}

pub fn load_font(file: &FsPath) -> QdResult<Font<'static>> {
    let data = std::fs::read(file)?;
    Font::try_from_vec(data).ok_or_else(|| QdError::Font(format!("'{}' is not a usable font", file.display())))
}

/// Style of one piece of text.
#[derive(Clone)]
pub struct TextStyle {
    pub font: Arc<Font<'static>>,
    pub size: f32,
    pub color: Color,
    pub rule: BlendRule,
    pub align: Alignment,
    /// Clockwise rotation in degrees around the anchor.
    pub angle: f32,
}

/// Width and height in pixels of a text line.
pub fn measure(font: &Font<'_>, size: f32, text: &str) -> (f32, f32) {
    let scale = Scale::uniform(size);
    let metrics = font.v_metrics(scale);
    let width = font
        .layout(text, scale, point(0.0, metrics.ascent))
        .filter_map(|g| g.pixel_bounding_box().map(|bb| bb.max.x as f32))
        .fold(0.0f32, f32::max);
    (width, metrics.ascent - metrics.descent)
}

/// Rasterize a text line into its own image.
fn rasterize(style: &TextStyle, text: &str) -> Option<Canvas> {
    let (width, height) = measure(&style.font, style.size, text);
    let w = width.ceil() as u32 + 1;
    let h = height.ceil() as u32 + 1;
    let c = style.color;
    // Glyph coverage only changes alpha when drawn over the same colour
    let mut img = RgbaImage::from_pixel(w, h, Rgba([c.r, c.g, c.b, 0]));
    draw_text_mut(
        &mut img,
        Rgba([c.r, c.g, c.b, c.a]),
        0,
        0,
        Scale::uniform(style.size),
        &style.font,
        text,
    );
    Canvas::from_rgba8(w, h, img.into_raw()).ok()
}

/// Draw text anchored at `(x, y)`. Returns the text box as `(left, top, width, height)`.
pub fn draw_text(canvas: &mut Canvas, style: &TextStyle, text: &str, x: f32, y: f32) -> Option<(f32, f32, f32, f32)> {
    if text.is_empty() {
        return None;
    }
    let image = rasterize(style, text)?;
    let (width, height) = measure(&style.font, style.size, text);
    let (dx, dy) = style.align.offset(width, height);

    if style.angle == 0.0 {
        canvas.composite(&image, (x + dx).round() as i32, (y + dy).round() as i32, style.rule, 1.0);
    } else {
        let transform = tiny_skia::Transform::from_translate(x, y)
            .pre_rotate(style.angle)
            .pre_translate(dx, dy);
        canvas.composite_transformed(&image, transform, style.rule);
    }
    Some((x + dx, y + dy, width, height))
}

/// Draw text with a one pixel halo behind it, painted with its own colour and rule.
pub fn draw_text_with_halo(
    canvas: &mut Canvas,
    style: &TextStyle,
    halo: Option<(Color, BlendRule)>,
    text: &str,
    x: f32,
    y: f32,
) {
    if let Some((color, rule)) = halo {
        let halo_style = TextStyle {
            color,
            rule,
            ..style.clone()
        };
        for (ox, oy) in [(-1.0, -1.0), (0.0, -1.0), (1.0, -1.0), (-1.0, 0.0), (1.0, 0.0), (-1.0, 1.0), (0.0, 1.0), (1.0, 1.0)] {
            draw_text(canvas, &halo_style, text, x + ox, y + oy);
        }
    }
    draw_text(canvas, style, text, x, y);
}

/// Format a value with a printf-style format such as `%.1f` or `%+5d`.
///
/// Literal text around the conversion is kept and `%%` prints a percent sign.
pub fn format_value(format: &str, value: f64) -> String {
    let mut out = String::new();
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut spec = FormatSpec::default();
        while let Some(&f) = chars.peek() {
            match f {
                '-' => spec.left = true,
                '+' => spec.plus = true,
                ' ' => spec.space = true,
                '0' => spec.zero = true,
                '#' => spec.alternate = true,
                _ => break,
            }
            chars.next();
        }
        let mut width = String::new();
        while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
            width.push(d);
            chars.next();
        }
        spec.width = width.parse().unwrap_or(0);
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut precision = String::new();
            while let Some(&d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                precision.push(d);
                chars.next();
            }
            spec.precision = Some(precision.parse().unwrap_or(0));
        }
        // Length modifiers carry no meaning here
        while matches!(chars.peek(), Some('l') | Some('h') | Some('L')) {
            chars.next();
        }
        match chars.next() {
            Some(conv) => out.push_str(&spec.render(conv, value)),
            None => out.push('%'),
        }
    }
    out
}

#[derive(Debug, Default)]
struct FormatSpec {
    left: bool,
    plus: bool,
    space: bool,
    zero: bool,
    alternate: bool,
    width: usize,
    precision: Option<usize>,
}

impl FormatSpec {
    fn render(&self, conv: char, value: f64) -> String {
        if !value.is_finite() {
            let body = if value.is_nan() { "nan" } else { "inf" };
            return self.pad(body.to_string(), value < 0.0, false);
        }
        let magnitude = value.abs();
        let (body, negative) = match conv {
            'd' | 'i' | 'u' => {
                let rounded = value.round() as i64;
                (rounded.unsigned_abs().to_string(), rounded < 0)
            }
            'f' | 'F' => (
                format!("{:.*}", self.precision.unwrap_or(6), magnitude),
                value.is_sign_negative(),
            ),
            'e' | 'E' => {
                let s = exponential(magnitude, self.precision.unwrap_or(6));
                let s = if conv == 'E' { s.to_uppercase() } else { s };
                (s, value.is_sign_negative())
            }
            'g' | 'G' => {
                let s = general(magnitude, self.precision.unwrap_or(6), self.alternate);
                let s = if conv == 'G' { s.to_uppercase() } else { s };
                (s, value.is_sign_negative())
            }
            _ => return format!("%{}", conv),
        };
        self.pad(body, negative, true)
    }

    fn pad(&self, body: String, negative: bool, numeric: bool) -> String {
        let sign = if negative {
            "-"
        } else if self.plus {
            "+"
        } else if self.space {
            " "
        } else {
            ""
        };
        let len = sign.len() + body.len();
        if len >= self.width {
            return format!("{}{}", sign, body);
        }
        let fill = self.width - len;
        if self.left {
            format!("{}{}{}", sign, body, " ".repeat(fill))
        } else if self.zero && numeric {
            format!("{}{}{}", sign, "0".repeat(fill), body)
        } else {
            format!("{}{}{}", " ".repeat(fill), sign, body)
        }
    }
}

/// C-style `%e` body for a non-negative value.
fn exponential(value: f64, precision: usize) -> String {
    let s = format!("{:.*e}", precision, value);
    let (mantissa, exp) = s.split_once('e').unwrap_or((&s, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    format!("{}e{}{:02}", mantissa, if exp < 0 { '-' } else { '+' }, exp.abs())
}

/// C-style `%g` body for a non-negative value.
fn general(value: f64, precision: usize, alternate: bool) -> String {
    let p = if precision == 0 { 1 } else { precision };
    if value == 0.0 {
        return if alternate { format!("{:.*}", p - 1, 0.0) } else { "0".to_string() };
    }
    // Exponent after rounding to p significant digits
    let rounded = format!("{:.*e}", p - 1, value);
    let exp: i32 = rounded
        .split_once('e')
        .and_then(|(_, e)| e.parse().ok())
        .unwrap_or(0);

    let s = if exp < -4 || exp >= p as i32 {
        exponential(value, p - 1)
    } else {
        format!("{:.*}", (p as i32 - 1 - exp).max(0) as usize, value)
    };
    if alternate {
        return s;
    }
    strip_trailing_zeros(&s)
}

fn strip_trailing_zeros(s: &str) -> String {
    let (mantissa, exp) = match s.find('e') {
        Some(k) => (&s[..k], &s[k..]),
        None => (s, ""),
    };
    let mantissa = if mantissa.contains('.') {
        mantissa.trim_end_matches('0').trim_end_matches('.')
    } else {
        mantissa
    };
    format!("{}{}", mantissa, exp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_fixed() {
        assert_eq!(format_value("%.1f", 3.14159), "3.1");
        assert_eq!(format_value("%.0f", 2.5001), "3");
        assert_eq!(format_value("%f", 1.0), "1.000000");
        assert_eq!(format_value("%6.2f", -1.5), " -1.50");
        assert_eq!(format_value("%-6.1f|", 1.0), "1.0   |");
        assert_eq!(format_value("%06.1f", -1.0), "-001.0");
        assert_eq!(format_value("%+.1f", 2.0), "+2.0");
    }

    #[test]
    fn test_format_integer_and_literals() {
        assert_eq!(format_value("%d", 12.6), "13");
        assert_eq!(format_value("%i C", -3.2), "-3 C");
        assert_eq!(format_value("%3d%%", 7.0), "  7%");
        assert_eq!(format_value("%.0f", -0.2), "-0");
        assert_eq!(format_value("%d", -0.2), "0");
    }

    #[test]
    fn test_format_exponential_and_general() {
        assert_eq!(format_value("%e", 1500.0), "1.500000e+03");
        assert_eq!(format_value("%.2E", 0.00123), "1.23E-03");
        assert_eq!(format_value("%g", 0.0001), "0.0001");
        assert_eq!(format_value("%g", 0.00001), "1e-05");
        assert_eq!(format_value("%g", 123456.0), "123456");
        assert_eq!(format_value("%g", 1234567.0), "1.23457e+06");
        assert_eq!(format_value("%.3g", 2.5), "2.5");
        assert_eq!(format_value("%g", 0.0), "0");
    }

    #[test]
    fn test_alignment_offsets() {
        assert_eq!(Alignment::parse("Center").unwrap().offset(10.0, 4.0), (-5.0, -2.0));
        assert_eq!(Alignment::parse("NorthWest").unwrap().offset(10.0, 4.0), (0.0, 0.0));
        assert_eq!(Alignment::parse("SouthEast").unwrap().offset(10.0, 4.0), (-10.0, -4.0));
        assert!(Alignment::parse("Middle").is_err());
    }

    #[test]
    fn test_missing_font_is_an_error_without_fallbacks() {
        let mut fonts = FontLibrary::new(None);
        let available = FALLBACK_FONTS.iter().any(|p| FsPath::new(p).is_file());
        let result = fonts.font("surely-not-a-font");
        assert_eq!(result.is_ok(), available);
    }

    #[test]
    fn test_draw_text_when_a_font_is_available() {
        let mut fonts = FontLibrary::new(None);
        let Ok(font) = fonts.font("") else {
            return;
        };
        let mut canvas = Canvas::new(100, 40).unwrap();
        let style = TextStyle {
            font,
            size: 14.0,
            color: Color::BLACK,
            rule: BlendRule::Over,
            align: Alignment::Center,
            angle: 0.0,
        };
        let (left, top, width, height) = draw_text(&mut canvas, &style, "12.5", 50.0, 20.0).unwrap();
        assert!(width > 0.0 && height > 0.0);
        assert!((left + width / 2.0 - 50.0).abs() < 0.01);
        assert!((top + height / 2.0 - 20.0).abs() < 0.01);
        assert!(canvas.to_rgba8().chunks(4).any(|p| p[3] > 0));
        assert!(draw_text(&mut canvas, &style, "", 0.0, 0.0).is_none());
    }
}
