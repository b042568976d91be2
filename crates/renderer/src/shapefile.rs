//! ESRI shapefile reading.
//!
//! Only the geometry (`.shp`) and the attribute table (`.dbf`) are read.
//! Coordinates are kept as stored, which for map data means lon/lat.
//!
//! # Record layout
//!
//! ```text
//! .shp  100 byte header  | record header (BE) | shape type (LE) | geometry (LE) ...
//! .dbf  32 byte header   | 32 byte field descriptors ... 0x0D | records ...
//! ```

use std::path::{Path as FsPath, PathBuf};

use qd_common::{QdError, QdResult};

use crate::path::Path;

const FILE_CODE: i32 = 9994;
const HEADER_LEN: usize = 100;

/// Geometry class of one record; Z and M variants map to their base class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Null,
    Point,
    MultiPoint,
    PolyLine,
    Polygon,
}

impl ShapeKind {
    fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ShapeKind::Null),
            1 | 11 | 21 => Some(ShapeKind::Point),
            8 | 18 | 28 => Some(ShapeKind::MultiPoint),
            3 | 13 | 23 => Some(ShapeKind::PolyLine),
            5 | 15 | 25 => Some(ShapeKind::Polygon),
            _ => None,
        }
    }
}

/// One feature: a kind and its parts (rings, lines or single points).
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub kind: ShapeKind,
    pub parts: Vec<Vec<(f64, f64)>>,
}

impl Shape {
    /// Geometry as a path. Polygons are closed, points contribute nothing.
    pub fn to_path(&self) -> Path {
        let mut path = Path::new();
        for part in &self.parts {
            match self.kind {
                ShapeKind::Polygon => path.add_polygon(part),
                ShapeKind::PolyLine => path.add_polyline(part),
                _ => {}
            }
        }
        path
    }

    pub fn vertices(&self) -> impl Iterator<Item = &(f64, f64)> {
        self.parts.iter().flatten()
    }
}

/// Attribute table of a shapefile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Attributes {
    fields: Vec<String>,
    records: Vec<Vec<String>>,
}

impl Attributes {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Trimmed value of a field in a record.
    pub fn get(&self, record: usize, field: &str) -> Option<&str> {
        let column = self.fields.iter().position(|f| f == field)?;
        self.records.get(record)?.get(column).map(String::as_str)
    }
}

/// Geometry plus attributes of one shapefile.
#[derive(Debug, Clone, PartialEq)]
pub struct ShapeFile {
    pub name: String,
    pub shapes: Vec<Shape>,
    pub attributes: Attributes,
}

impl ShapeFile {
    /// Open `<name>.shp` (and `<name>.dbf` when present). `name` may carry
    /// the `.shp` extension.
    pub fn open(name: &str) -> QdResult<Self> {
        let base = name.strip_suffix(".shp").unwrap_or(name);
        let shp = PathBuf::from(format!("{}.shp", base));
        let dbf = PathBuf::from(format!("{}.dbf", base));

        if !shp.exists() {
            return Err(QdError::FileNotFound(shp.display().to_string()));
        }
        let data = std::fs::read(&shp)?;
        let shapes = parse_shp(&data).map_err(|message| QdError::Shape {
            path: shp.display().to_string(),
            message,
        })?;

        let attributes = if dbf.exists() {
            let data = std::fs::read(&dbf)?;
            parse_dbf(&data).map_err(|message| QdError::Shape {
                path: dbf.display().to_string(),
                message,
            })?
        } else {
            Attributes::default()
        };

        tracing::debug!(file = %shp.display(), shapes = shapes.len(), "Shapefile read");
        Ok(Self {
            name: name.to_string(),
            shapes,
            attributes,
        })
    }

    /// All line and polygon geometry as one path.
    pub fn to_path(&self) -> Path {
        let mut path = Path::new();
        for shape in &self.shapes {
            path.add(&shape.to_path());
        }
        path
    }
}

/// Check that a shapefile exists without reading it.
pub fn shapefile_exists(name: &str) -> bool {
    let base = name.strip_suffix(".shp").unwrap_or(name);
    FsPath::new(&format!("{}.shp", base)).exists()
}

fn be_i32(data: &[u8], pos: usize) -> Result<i32, String> {
    data.get(pos..pos + 4)
        .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| format!("truncated at byte {}", pos))
}

fn le_i32(data: &[u8], pos: usize) -> Result<i32, String> {
    data.get(pos..pos + 4)
        .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| format!("truncated at byte {}", pos))
}

fn le_f64(data: &[u8], pos: usize) -> Result<f64, String> {
    data.get(pos..pos + 8)
        .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
        .ok_or_else(|| format!("truncated at byte {}", pos))
}

fn parse_shp(data: &[u8]) -> Result<Vec<Shape>, String> {
    if data.len() < HEADER_LEN {
        return Err("file is shorter than the shapefile header".to_string());
    }
    if be_i32(data, 0)? != FILE_CODE {
        return Err("not a shapefile".to_string());
    }
    let file_len = (be_i32(data, 24)? as usize * 2).min(data.len());

    let mut shapes = Vec::new();
    let mut pos = HEADER_LEN;
    while pos + 8 <= file_len {
        let content_len = be_i32(data, pos + 4)? as usize * 2;
        let content = pos + 8;
        if content + content_len > data.len() {
            return Err(format!("record at byte {} overruns the file", pos));
        }
        shapes.push(parse_record(&data[content..content + content_len])?);
        pos = content + content_len;
    }
    Ok(shapes)
}

fn parse_record(rec: &[u8]) -> Result<Shape, String> {
    let code = le_i32(rec, 0)?;
    let kind = ShapeKind::from_code(code).ok_or_else(|| format!("unsupported shape type {}", code))?;

    let point = |pos: usize| -> Result<(f64, f64), String> { Ok((le_f64(rec, pos)?, le_f64(rec, pos + 8)?)) };

    let parts = match kind {
        ShapeKind::Null => Vec::new(),
        ShapeKind::Point => vec![vec![point(4)?]],
        ShapeKind::MultiPoint => {
            let n = le_i32(rec, 36)?.max(0) as usize;
            (0..n)
                .map(|k| point(40 + 16 * k).map(|p| vec![p]))
                .collect::<Result<_, _>>()?
        }
        ShapeKind::PolyLine | ShapeKind::Polygon => {
            let num_parts = le_i32(rec, 36)?.max(0) as usize;
            let num_points = le_i32(rec, 40)?.max(0) as usize;
            let mut starts = (0..num_parts)
                .map(|k| le_i32(rec, 44 + 4 * k).map(|s| s.max(0) as usize))
                .collect::<Result<Vec<_>, _>>()?;
            starts.push(num_points);
            let points_at = 44 + 4 * num_parts;

            let mut parts = Vec::with_capacity(num_parts);
            for w in starts.windows(2) {
                let (first, last) = (w[0], w[1].min(num_points));
                let part = (first..last)
                    .map(|k| point(points_at + 16 * k))
                    .collect::<Result<Vec<_>, _>>()?;
                parts.push(part);
            }
            parts
        }
    };
    Ok(Shape { kind, parts })
}

fn parse_dbf(data: &[u8]) -> Result<Attributes, String> {
    if data.len() < 32 {
        return Err("file is shorter than the dbf header".to_string());
    }
    let num_records = u32::from_le_bytes([data[4], data[5], data[6], data[7]]) as usize;
    let header_len = u16::from_le_bytes([data[8], data[9]]) as usize;
    let record_len = u16::from_le_bytes([data[10], data[11]]) as usize;

    let mut fields = Vec::new();
    let mut widths = Vec::new();
    let mut pos = 32;
    while pos + 32 <= data.len() && data[pos] != 0x0D {
        let name_bytes = &data[pos..pos + 11];
        let end = name_bytes.iter().position(|b| *b == 0).unwrap_or(11);
        fields.push(String::from_utf8_lossy(&name_bytes[..end]).trim().to_string());
        widths.push(data[pos + 16] as usize);
        pos += 32;
    }

    let mut records = Vec::with_capacity(num_records);
    for r in 0..num_records {
        let start = header_len + r * record_len;
        let Some(record) = data.get(start..start + record_len) else {
            return Err(format!("record {} is truncated", r));
        };
        // First byte is the deletion flag
        let mut offset = 1;
        let mut values = Vec::with_capacity(widths.len());
        for width in &widths {
            let raw = record.get(offset..offset + width).unwrap_or(&[]);
            values.push(String::from_utf8_lossy(raw).trim().to_string());
            offset += width;
        }
        records.push(values);
    }

    Ok(Attributes { fields, records })
}
