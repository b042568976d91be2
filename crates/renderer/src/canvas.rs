//! Raster canvas backed by a tiny-skia pixmap.

use qd_common::{BlendRule, Color, QdError, QdResult};
use tiny_skia::{
    BlendMode, FillRule, FilterQuality, IntSize, Paint, Pattern, Pixmap, PixmapPaint, Rect,
    SpreadMode, Stroke, Transform,
};

use crate::path::Path;

/// Map a script blending rule to a tiny-skia blend mode.
pub fn blend_mode(rule: BlendRule) -> BlendMode {
    match rule {
        BlendRule::Clear => BlendMode::Clear,
        BlendRule::Copy => BlendMode::Source,
        BlendRule::Keep => BlendMode::Destination,
        BlendRule::Over => BlendMode::SourceOver,
        BlendRule::Under => BlendMode::DestinationOver,
        BlendRule::In => BlendMode::SourceIn,
        BlendRule::KeepIn => BlendMode::DestinationIn,
        BlendRule::Out => BlendMode::SourceOut,
        BlendRule::KeepOut => BlendMode::DestinationOut,
        BlendRule::Atop | BlendRule::OnOpaque => BlendMode::SourceAtop,
        BlendRule::KeepAtop => BlendMode::DestinationAtop,
        BlendRule::Xor => BlendMode::Xor,
        BlendRule::Plus => BlendMode::Plus,
        BlendRule::Multiply => BlendMode::Multiply,
        BlendRule::Screen => BlendMode::Screen,
        BlendRule::Overlay => BlendMode::Overlay,
        BlendRule::Darken => BlendMode::Darken,
        BlendRule::Lighten => BlendMode::Lighten,
        BlendRule::Difference => BlendMode::Difference,
        BlendRule::Exclusion => BlendMode::Exclusion,
        BlendRule::ColorDodge => BlendMode::ColorDodge,
        BlendRule::ColorBurn => BlendMode::ColorBurn,
        BlendRule::HardLight => BlendMode::HardLight,
        BlendRule::SoftLight => BlendMode::SoftLight,
        BlendRule::OnTransparent => BlendMode::DestinationOver,
    }
}

fn paint_for(color: Color, rule: BlendRule) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color_rgba8(color.r, color.g, color.b, color.a);
    paint.anti_alias = true;
    paint.blend_mode = blend_mode(rule);
    paint
}

/// An RGBA drawing surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    pixmap: Pixmap,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> QdResult<Self> {
        let pixmap = Pixmap::new(width, height).ok_or_else(|| {
            QdError::Encode(format!("cannot create a {}x{} canvas", width, height))
        })?;
        Ok(Self { pixmap })
    }

    pub fn from_pixmap(pixmap: Pixmap) -> Self {
        Self { pixmap }
    }

    /// Build a canvas from straight (non-premultiplied) RGBA bytes.
    pub fn from_rgba8(width: u32, height: u32, mut data: Vec<u8>) -> QdResult<Self> {
        for px in data.chunks_exact_mut(4) {
            let a = px[3] as u32;
            for c in &mut px[..3] {
                *c = ((*c as u32 * a + 127) / 255) as u8;
            }
        }
        let size = IntSize::from_wh(width, height)
            .ok_or_else(|| QdError::Encode(format!("invalid image size {}x{}", width, height)))?;
        let pixmap = Pixmap::from_vec(data, size)
            .ok_or_else(|| QdError::Encode("image data does not match its size".to_string()))?;
        Ok(Self { pixmap })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    /// Set every pixel to `color`.
    pub fn erase(&mut self, color: Color) {
        self.pixmap
            .fill(tiny_skia::Color::from_rgba8(color.r, color.g, color.b, color.a));
    }

    pub fn fill_path(&mut self, path: &Path, color: Color, rule: BlendRule) {
        if let Some(path) = path.to_skia() {
            let paint = paint_for(color, rule);
            self.pixmap
                .fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
        }
    }

    pub fn stroke_path(&mut self, path: &Path, color: Color, rule: BlendRule, width: f32) {
        if let Some(path) = path.to_skia() {
            let paint = paint_for(color, rule);
            let stroke = Stroke {
                width,
                ..Stroke::default()
            };
            self.pixmap
                .stroke_path(&path, &paint, &stroke, Transform::identity(), None);
        }
    }

    /// Fill a path with a repeating image. `alpha` scales the pattern opacity.
    pub fn pattern_fill(&mut self, path: &Path, pattern: &Canvas, rule: BlendRule, alpha: f32) {
        let Some(path) = path.to_skia() else {
            return;
        };
        let mut paint = Paint::default();
        paint.anti_alias = true;
        paint.blend_mode = blend_mode(rule);
        paint.shader = Pattern::new(
            pattern.pixmap.as_ref(),
            SpreadMode::Repeat,
            FilterQuality::Nearest,
            alpha.clamp(0.0, 1.0),
            Transform::identity(),
        );
        self.pixmap
            .fill_path(&path, &paint, FillRule::Winding, Transform::identity(), None);
    }

    pub fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Color, rule: BlendRule) {
        if let Some(rect) = Rect::from_xywh(x, y, width, height) {
            let paint = paint_for(color, rule);
            self.pixmap.fill_rect(rect, &paint, Transform::identity(), None);
        }
    }

    /// Draw another image with its top left corner at `(x, y)`.
    pub fn composite(&mut self, image: &Canvas, x: i32, y: i32, rule: BlendRule, alpha: f32) {
        let paint = PixmapPaint {
            opacity: alpha.clamp(0.0, 1.0),
            blend_mode: blend_mode(rule),
            quality: FilterQuality::Nearest,
        };
        self.pixmap
            .draw_pixmap(x, y, image.pixmap.as_ref(), &paint, Transform::identity(), None);
    }

    /// Draw another image through an arbitrary transform.
    pub fn composite_transformed(&mut self, image: &Canvas, transform: Transform, rule: BlendRule) {
        let paint = PixmapPaint {
            opacity: 1.0,
            blend_mode: blend_mode(rule),
            quality: FilterQuality::Bilinear,
        };
        self.pixmap
            .draw_pixmap(0, 0, image.pixmap.as_ref(), &paint, transform, None);
    }

    /// Draw another image centred at `(x, y)`.
    pub fn composite_centered(&mut self, image: &Canvas, x: f64, y: f64, rule: BlendRule, alpha: f32) {
        let left = (x - image.width() as f64 / 2.0).round() as i32;
        let top = (y - image.height() as f64 / 2.0).round() as i32;
        self.composite(image, left, top, rule, alpha);
    }

    /// Straight-alpha color of a pixel, `None` outside the canvas.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Color> {
        self.pixmap.pixel(x, y).map(|p| {
            let c = p.demultiply();
            Color::rgba(c.red(), c.green(), c.blue(), c.alpha())
        })
    }

    /// Straight-alpha RGBA bytes, row-major.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixmap.data().len());
        for p in self.pixmap.pixels() {
            let c = p.demultiply();
            out.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(x: f64, y: f64, size: f64) -> Path {
        let mut path = Path::new();
        path.add_polygon(&[(x, y), (x + size, y), (x + size, y + size), (x, y + size)]);
        path
    }

    #[test]
    fn test_erase_and_pixel() {
        let mut canvas = Canvas::new(4, 3).unwrap();
        assert_eq!(canvas.pixel(0, 0), Some(Color::TRANSPARENT));
        canvas.erase(Color::rgb(10, 20, 30));
        assert_eq!(canvas.pixel(3, 2), Some(Color::rgb(10, 20, 30)));
        assert_eq!(canvas.pixel(4, 0), None);
        assert_eq!(canvas.to_rgba8().len(), 4 * 3 * 4);
    }

    #[test]
    fn test_fill_path_respects_rule() {
        let mut canvas = Canvas::new(10, 10).unwrap();
        canvas.fill_path(&square(0.0, 0.0, 10.0), Color::rgb(255, 0, 0), BlendRule::Atop);
        // Atop paints nothing over a transparent canvas
        assert_eq!(canvas.pixel(5, 5), Some(Color::TRANSPARENT));

        canvas.fill_path(&square(0.0, 0.0, 10.0), Color::rgb(255, 0, 0), BlendRule::Over);
        assert_eq!(canvas.pixel(5, 5), Some(Color::rgb(255, 0, 0)));
        canvas.fill_path(&square(0.0, 0.0, 5.0), Color::rgb(0, 0, 255), BlendRule::Atop);
        assert_eq!(canvas.pixel(2, 2), Some(Color::rgb(0, 0, 255)));
        assert_eq!(canvas.pixel(7, 7), Some(Color::rgb(255, 0, 0)));
    }

    #[test]
    fn test_composite_and_copy() {
        let mut marker = Canvas::new(2, 2).unwrap();
        marker.erase(Color::WHITE);
        let mut canvas = Canvas::new(10, 10).unwrap();
        canvas.erase(Color::BLACK);
        canvas.composite_centered(&marker, 5.0, 5.0, BlendRule::Over, 1.0);
        assert_eq!(canvas.pixel(4, 4), Some(Color::WHITE));
        assert_eq!(canvas.pixel(6, 6), Some(Color::BLACK));

        canvas.fill_rect(0.0, 0.0, 2.0, 2.0, Color::TRANSPARENT, BlendRule::Copy);
        assert_eq!(canvas.pixel(0, 0), Some(Color::TRANSPARENT));
    }

    #[test]
    fn test_rgba_round_trip() {
        let data = vec![255, 0, 0, 255, 0, 0, 0, 0];
        let canvas = Canvas::from_rgba8(2, 1, data.clone()).unwrap();
        assert_eq!(canvas.to_rgba8(), data);
        assert!(Canvas::from_rgba8(3, 1, data).is_err());
    }

    #[test]
    fn test_blend_mode_mapping() {
        assert_eq!(blend_mode(BlendRule::Copy), BlendMode::Source);
        assert_eq!(blend_mode(BlendRule::Under), BlendMode::DestinationOver);
        assert_eq!(blend_mode(BlendRule::OnTransparent), BlendMode::DestinationOver);
    }
}
