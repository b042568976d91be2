//! Grid specifications for querydata.

use serde::{Deserialize, Serialize};

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min_x && x <= self.max_x && y >= self.min_y && y <= self.max_y
    }
}

/// Specification of a regular lat/lon grid.
///
/// Node `(i, j)` lies at `(first_x + i * dx, first_y + j * dy)`. Values are
/// stored row-major with `j` as the row index, so row 0 is the row of the
/// first grid point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    /// Number of points in X (longitude) direction
    pub nx: usize,
    /// Number of points in Y (latitude) direction
    pub ny: usize,
    /// Grid resolution in X direction (degrees)
    pub dx: f64,
    /// Grid resolution in Y direction (degrees)
    pub dy: f64,
    /// First grid point longitude
    #[serde(rename = "lon0")]
    pub first_x: f64,
    /// First grid point latitude
    #[serde(rename = "lat0")]
    pub first_y: f64,
}

impl GridSpec {
    /// Create a new grid specification.
    pub fn new(nx: usize, ny: usize, dx: f64, dy: f64, first_x: f64, first_y: f64) -> Self {
        Self {
            nx,
            ny,
            dx,
            dy,
            first_x,
            first_y,
        }
    }

    /// Calculate the bounding box of this grid.
    pub fn bbox(&self) -> BoundingBox {
        let last_x = self.first_x + (self.nx.saturating_sub(1)) as f64 * self.dx;
        let last_y = self.first_y + (self.ny.saturating_sub(1)) as f64 * self.dy;

        BoundingBox {
            min_x: self.first_x.min(last_x),
            min_y: self.first_y.min(last_y),
            max_x: self.first_x.max(last_x),
            max_y: self.first_y.max(last_y),
        }
    }

    /// Geographic coordinate of node `(i, j)`.
    pub fn lon_lat(&self, i: usize, j: usize) -> (f64, f64) {
        (
            self.first_x + i as f64 * self.dx,
            self.first_y + j as f64 * self.dy,
        )
    }

    /// Geographic coordinate of a fractional grid position.
    pub fn grid_to_lon_lat(&self, x: f64, y: f64) -> (f64, f64) {
        (self.first_x + x * self.dx, self.first_y + y * self.dy)
    }

    /// Fractional grid position of a geographic coordinate. The result may lie
    /// outside the grid.
    pub fn lon_lat_to_grid(&self, lon: f64, lat: f64) -> (f64, f64) {
        ((lon - self.first_x) / self.dx, (lat - self.first_y) / self.dy)
    }

    /// Get the 1D array index for a 2D grid position.
    pub fn flat_index(&self, i: usize, j: usize) -> usize {
        j * self.nx + i
    }

    /// Total number of grid points.
    pub fn len(&self) -> usize {
        self.nx * self.ny
    }

    /// Check if grid is empty.
    pub fn is_empty(&self) -> bool {
        self.nx == 0 || self.ny == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scandinavia() -> GridSpec {
        GridSpec::new(41, 31, 0.5, 0.5, 5.0, 55.0)
    }

    #[test]
    fn test_bbox() {
        let bbox = scandinavia().bbox();
        assert!((bbox.min_x - 5.0).abs() < 1e-9);
        assert!((bbox.max_x - 25.0).abs() < 1e-9);
        assert!((bbox.min_y - 55.0).abs() < 1e-9);
        assert!((bbox.max_y - 70.0).abs() < 1e-9);
    }

    #[test]
    fn test_grid_round_trip_at_node() {
        let grid = scandinavia();
        let (lon, lat) = grid.lon_lat(4, 7);
        let (x, y) = grid.lon_lat_to_grid(lon, lat);
        assert!((x - 4.0).abs() < 1e-9);
        assert!((y - 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_flat_index_row_major() {
        let grid = scandinavia();
        assert_eq!(grid.flat_index(0, 0), 0);
        assert_eq!(grid.flat_index(1, 0), 1);
        assert_eq!(grid.flat_index(0, 1), 41);
    }
}
