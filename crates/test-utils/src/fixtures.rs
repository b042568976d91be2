//! Common test fixtures for qdcontour tests.
//!
//! This module provides pre-defined grids and areas, and helpers that write
//! input files (querydata, shapefiles, scripts) into a scratch directory.

use std::path::{Path, PathBuf};

use qd_common::GridSpec;
use querydata::QueryData;

/// Common projection descriptions for testing.
pub mod areas {
    /// Lat/lon area exactly covering [`super::small_grid`], 100x100 pixels.
    pub const SMALL_LATLON: &str = "latlon:20,60,28,68:100,100";

    /// Polar stereographic area over Finland.
    pub const FINLAND_STEREO: &str = "stereographic,20,90,60:18,58,34,71:200,-1";

    /// Mercator area over Scandinavia.
    pub const SCANDINAVIA_MERCATOR: &str = "mercator:5,54,32,71:300,300";
}

/// 5x5 grid with 2 degree spacing covering lon 20..28, lat 60..68.
pub fn small_grid() -> GridSpec {
    GridSpec::new(5, 5, 2.0, 2.0, 20.0, 60.0)
}

/// 17x17 grid with 0.5 degree spacing over the same extent.
pub fn dense_grid() -> GridSpec {
    GridSpec::new(17, 17, 0.5, 0.5, 20.0, 60.0)
}

/// Save a source as a querydata file in `dir`.
pub fn write_querydata(dir: &Path, name: &str, qd: &QueryData) -> PathBuf {
    let path = dir.join(name);
    qd.save(&path).expect("querydata fixture written");
    path
}

/// Write a command script into `dir`.
pub fn write_script(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).expect("script fixture written");
    path
}

/// Write `<base>.shp` and `<base>.dbf` holding one square polygon per entry
/// `(x, y, size, name)`, with the name in a `NAME` column.
pub fn write_square_shapefile(base: &Path, squares: &[(f64, f64, f64, &str)]) {
    const FILE_CODE: i32 = 9994;
    const HEADER_LEN: usize = 100;
    const POLYGON: i32 = 5;

    let mut records = Vec::new();
    for (k, (x, y, size, _)) in squares.iter().enumerate() {
        let ring = [(*x, *y), (*x, y + size), (x + size, y + size), (x + size, *y), (*x, *y)];
        let mut content = Vec::new();
        content.extend_from_slice(&POLYGON.to_le_bytes());
        for v in [*x, *y, x + size, y + size] {
            content.extend_from_slice(&v.to_le_bytes());
        }
        content.extend_from_slice(&1i32.to_le_bytes());
        content.extend_from_slice(&(ring.len() as i32).to_le_bytes());
        content.extend_from_slice(&0i32.to_le_bytes());
        for (px, py) in ring {
            content.extend_from_slice(&px.to_le_bytes());
            content.extend_from_slice(&py.to_le_bytes());
        }
        records.extend_from_slice(&(k as i32 + 1).to_be_bytes());
        records.extend_from_slice(&((content.len() / 2) as i32).to_be_bytes());
        records.extend_from_slice(&content);
    }

    let mut shp = vec![0u8; HEADER_LEN];
    shp[0..4].copy_from_slice(&FILE_CODE.to_be_bytes());
    shp[24..28].copy_from_slice(&(((HEADER_LEN + records.len()) / 2) as i32).to_be_bytes());
    shp[28..32].copy_from_slice(&1000i32.to_le_bytes());
    shp[32..36].copy_from_slice(&POLYGON.to_le_bytes());
    shp.extend_from_slice(&records);
    std::fs::write(base.with_extension("shp"), shp).expect("shp fixture written");

    let width = 10u8;
    let mut dbf = vec![0u8; 32];
    dbf[0] = 3;
    dbf[4..8].copy_from_slice(&(squares.len() as u32).to_le_bytes());
    dbf[8..10].copy_from_slice(&(32u16 + 32 + 1).to_le_bytes());
    dbf[10..12].copy_from_slice(&(1 + width as u16).to_le_bytes());
    let mut descriptor = [0u8; 32];
    descriptor[..4].copy_from_slice(b"NAME");
    descriptor[11] = b'C';
    descriptor[16] = width;
    dbf.extend_from_slice(&descriptor);
    dbf.push(0x0D);
    for (_, _, _, name) in squares {
        dbf.push(b' ');
        dbf.extend_from_slice(format!("{:<10}", name).as_bytes());
    }
    std::fs::write(base.with_extension("dbf"), dbf).expect("dbf fixture written");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generators::{at, create_series_source, create_ramp_field, time_series};

    #[test]
    fn test_grid_extents() {
        let bbox = small_grid().bbox();
        assert_eq!((bbox.min_x, bbox.max_x), (20.0, 28.0));
        assert_eq!(dense_grid().bbox().max_y, 68.0);
    }

    #[test]
    fn test_write_querydata_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let qd = create_series_source("t.json", &small_grid(), "Temperature", time_series(at(0, 0), 2, 60), |_| {
            create_ramp_field(5, 5)
        });
        let path = write_querydata(dir.path(), "t.json", &qd);
        assert!(QueryData::open(&path).is_ok());
    }

    #[test]
    fn test_write_square_shapefile() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("squares");
        write_square_shapefile(&base, &[(0.0, 0.0, 1.0, "a")]);
        assert!(base.with_extension("shp").exists());
        assert!(base.with_extension("dbf").exists());
    }
}
