//! Reading raster and SVG images into canvases.

use std::path::Path;

use qd_common::{QdError, QdResult};

use crate::canvas::Canvas;

/// Read an image file. PNG, JPEG and GIF go through the image crate,
/// `.svg` files are rasterized at their intrinsic size.
pub fn read_image(path: &Path) -> QdResult<Canvas> {
    let shown = path.display().to_string();
    if !path.exists() {
        return Err(QdError::FileNotFound(shown));
    }

    let is_svg = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("svg"));
    if is_svg {
        let data = std::fs::read(path)?;
        return rasterize_svg(&data).map_err(|message| QdError::Image {
            path: shown,
            message,
        });
    }

    let img = image::open(path).map_err(|e| QdError::Image {
        path: shown.clone(),
        message: e.to_string(),
    })?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    tracing::debug!(path = %shown, width, height, "Image read");
    Canvas::from_rgba8(width, height, rgba.into_raw())
}

fn rasterize_svg(data: &[u8]) -> Result<Canvas, String> {
    let tree = usvg::Tree::from_data(data, &usvg::Options::default()).map_err(|e| e.to_string())?;
    let size = tree.size().to_int_size();
    let mut pixmap = tiny_skia::Pixmap::new(size.width(), size.height())
        .ok_or_else(|| "SVG image has no size".to_string())?;
    resvg::render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());
    Ok(Canvas::from_pixmap(pixmap))
}

/// Resolve an image name: as given, else relative to `search_dir`.
pub fn resolve(name: &str, search_dir: Option<&Path>) -> std::path::PathBuf {
    let direct = Path::new(name);
    if direct.exists() {
        return direct.to_path_buf();
    }
    match search_dir {
        Some(dir) if dir.join(name).exists() => dir.join(name),
        _ => direct.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qd_common::Color;

    #[test]
    fn test_read_png() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("marker.png");
        let mut img = image::RgbaImage::new(3, 2);
        img.put_pixel(1, 1, image::Rgba([255, 0, 0, 255]));
        img.save(&file).unwrap();

        let canvas = read_image(&file).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (3, 2));
        assert_eq!(canvas.pixel(1, 1), Some(Color::rgb(255, 0, 0)));
        assert_eq!(canvas.pixel(0, 0), Some(Color::TRANSPARENT));
    }

    #[test]
    fn test_read_svg() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("pattern.svg");
        std::fs::write(
            &file,
            r##"<svg xmlns="http://www.w3.org/2000/svg" width="8" height="4"><rect width="8" height="4" fill="#0000ff"/></svg>"##,
        )
        .unwrap();
        let canvas = read_image(&file).unwrap();
        assert_eq!((canvas.width(), canvas.height()), (8, 4));
        assert_eq!(canvas.pixel(4, 2), Some(Color::rgb(0, 0, 255)));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            read_image(Path::new("/no/such/image.png")),
            Err(QdError::FileNotFound(_))
        ));
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("broken.png");
        std::fs::write(&file, b"not an image").unwrap();
        assert!(matches!(read_image(&file), Err(QdError::Image { .. })));
    }

    #[test]
    fn test_resolve_uses_search_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("map.png"), b"x").unwrap();
        assert_eq!(resolve("map.png", Some(dir.path())), dir.path().join("map.png"));
        assert_eq!(resolve("other.png", Some(dir.path())), Path::new("other.png"));
    }
}
