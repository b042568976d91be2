//! Shapefile rendering and HTML image maps.

use std::fmt::Write as _;
use std::path::PathBuf;

use projection::Area;
use qd_common::{QdError, QdResult};
use renderer::shapefile::ShapeKind;
use renderer::{Canvas, ImageWriter, ShapeFile};

use crate::context::RenderContext;
use crate::spec::{ShapeSpec, ShapeStyle};

/// Draw every shape spec on an erased canvas and write it as
/// `<name>.<format>`.
pub fn draw_shapes<W: ImageWriter + ?Sized>(ctx: &RenderContext, writer: &mut W, name: &str) -> QdResult<PathBuf> {
    let area = ctx.area().ok_or(QdError::NoProjection)?;
    let (w, h) = area.pixel_size();
    tracing::debug!(
        bottom_left = ?area.bottom_left_lat_lon(),
        top_right = ?area.top_right_lat_lon(),
        "Area corners"
    );

    let mut canvas = Canvas::new(w, h)?;
    canvas.erase(ctx.settings.erase);
    for spec in ctx.specs.shapes() {
        draw_shape(&mut canvas, spec, area)?;
    }

    let file = PathBuf::from(format!("{}.{}", name, ctx.settings.image.format.extension()));
    tracing::info!("Writing {}", file.display());
    writer.write(&canvas, &file, &ctx.settings.image)?;
    Ok(file)
}

fn draw_shape(canvas: &mut Canvas, spec: &ShapeSpec, area: &dyn Area) -> QdResult<()> {
    let shapes = ShapeFile::open(&spec.file)?;
    match &spec.style {
        ShapeStyle::Fill {
            fill,
            stroke,
            fill_rule,
            stroke_rule,
        } => {
            let mut path = shapes.to_path();
            path.project(area);
            canvas.fill_path(&path, *fill, *fill_rule);
            canvas.stroke_path(&path, *stroke, *stroke_rule, 1.0);
        }
        ShapeStyle::Marker { image, rule, alpha } => {
            for &(lon, lat) in shapes.shapes.iter().flat_map(|s| s.vertices()) {
                let (x, y) = area.to_xy(lon, lat);
                canvas.composite_centered(image, x, y, *rule, *alpha);
            }
        }
    }
    Ok(())
}

/// Write `<name>.map` with one `<area>` element per polygon ring of every
/// shape spec. Link and alt text come from the attribute `field`.
pub fn write_imagemap(ctx: &RenderContext, field: &str, name: &str) -> QdResult<PathBuf> {
    let area = ctx.area().ok_or(QdError::NoProjection)?;

    let mut out = String::new();
    for spec in ctx.specs.shapes() {
        let shapes = ShapeFile::open(&spec.file)?;
        imagemap_areas(&shapes, field, area, &mut out);
    }

    let file = PathBuf::from(format!("{}.map", name));
    tracing::info!("Writing {}", file.display());
    std::fs::write(&file, out)?;
    Ok(file)
}

fn imagemap_areas(shapes: &ShapeFile, field: &str, area: &dyn Area, out: &mut String) {
    for (record, shape) in shapes.shapes.iter().enumerate() {
        if shape.kind != ShapeKind::Polygon {
            continue;
        }
        let value = shapes.attributes.get(record, field).unwrap_or("");
        for ring in &shape.parts {
            let coords: Vec<String> = ring
                .iter()
                .map(|&(lon, lat)| {
                    let (x, y) = area.to_xy(lon, lat);
                    format!("{},{}", x.round() as i64, y.round() as i64)
                })
                .collect();
            // Writing to a String cannot fail
            let _ = writeln!(
                out,
                "<area shape=\"poly\" href=\"{}\" alt=\"{}\" coords=\"{}\">",
                value,
                value,
                coords.join(",")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::areas;
    use test_utils::fixtures::write_square_shapefile;

    #[test]
    fn test_imagemap_lines() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("regions");
        write_square_shapefile(&base, &[(20.0, 60.0, 2.0, "north")]);
        let shapes = ShapeFile::open(base.to_str().unwrap()).unwrap();
        let area = projection::parse_area(areas::SMALL_LATLON).unwrap();

        let mut out = String::new();
        imagemap_areas(&shapes, "NAME", &area, &mut out);
        assert_eq!(out.lines().count(), 1);
        assert!(out.starts_with("<area shape=\"poly\" href=\"north\" alt=\"north\" coords=\""));
        assert!(out.contains("0,100,0,75,25,75,25,100,0,100"), "{}", out);
    }
}
