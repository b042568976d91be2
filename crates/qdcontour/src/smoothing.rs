//! Spatial smoothing of fields in projected world coordinates.
//!
//! Distances are measured between the grid points' world coordinates, so a
//! radius is given in metres and the result does not depend on the size of
//! the output image.

use projection::Area;
use qd_common::{Field, GridSpec, QdError, QdResult};
use rayon::prelude::*;

/// Smoothing method selected with the `smoother` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SmootherKind {
    #[default]
    None,
    /// Weighted mean with weights decreasing linearly with distance.
    Neighbourhood,
    /// Weighted mean with gaussian-like weights.
    PseudoGaussian,
}

impl SmootherKind {
    pub fn parse(s: &str) -> QdResult<Self> {
        match s {
            "None" => Ok(SmootherKind::None),
            "Neighbourhood" => Ok(SmootherKind::Neighbourhood),
            "PseudoGaussian" => Ok(SmootherKind::PseudoGaussian),
            other => Err(QdError::UnknownSmoother(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Smoother {
    pub kind: SmootherKind,
    /// Search radius in metres.
    pub radius: f64,
    /// Sharpness of the weighting.
    pub factor: f64,
}

impl Smoother {
    pub fn new(kind: SmootherKind, radius: f64, factor: f64) -> Self {
        Self { kind, radius, factor }
    }

    pub fn is_active(&self) -> bool {
        self.kind != SmootherKind::None && self.radius > 0.0
    }

    fn weight(&self, distance: f64) -> f64 {
        let d = distance / self.radius;
        match self.kind {
            SmootherKind::None => 1.0,
            SmootherKind::Neighbourhood => 1.0 + self.factor * (1.0 - d),
            SmootherKind::PseudoGaussian => (-self.factor * d * d).exp(),
        }
    }

    /// Smoothen a field whose node `(i, j)` lies at `world[j * nx + i]`.
    ///
    /// Missing cells stay missing and never contribute to their neighbours.
    pub fn smoothen(&self, field: &Field, world: &[(f64, f64)]) -> Field {
        let (nx, ny) = field.shape();
        if !self.is_active() || world.len() != nx * ny {
            return field.clone();
        }

        let (reach_i, reach_j) = search_reach(world, nx, ny, self.radius);
        let values: Vec<Option<f32>> = (0..nx * ny)
            .into_par_iter()
            .map(|k| {
                let (i, j) = (k % nx, k / nx);
                field.get(i, j)?;
                let (x0, y0) = world[k];

                let mut sum = 0.0;
                let mut weights = 0.0;
                for jj in j.saturating_sub(reach_j)..(j + reach_j + 1).min(ny) {
                    for ii in i.saturating_sub(reach_i)..(i + reach_i + 1).min(nx) {
                        let Some(v) = field.get(ii, jj) else {
                            continue;
                        };
                        let (x, y) = world[jj * nx + ii];
                        let d = ((x - x0).powi(2) + (y - y0).powi(2)).sqrt();
                        if d > self.radius {
                            continue;
                        }
                        let w = self.weight(d).max(0.0);
                        sum += w * v as f64;
                        weights += w;
                    }
                }
                if weights > 0.0 {
                    Some((sum / weights) as f32)
                } else {
                    field.get(i, j)
                }
            })
            .collect();

        Field::from_values(nx, ny, values).unwrap_or_else(|_| field.clone())
    }
}

/// World coordinates of every grid node, row-major.
pub fn world_points(grid: &GridSpec, area: &dyn Area) -> Vec<(f64, f64)> {
    let mut points = Vec::with_capacity(grid.len());
    for j in 0..grid.ny {
        for i in 0..grid.nx {
            let (lon, lat) = grid.lon_lat(i, j);
            points.push(area.lat_lon_to_world_xy(lon, lat));
        }
    }
    points
}

/// Index distances that cover the radius, from the smallest node spacing.
fn search_reach(world: &[(f64, f64)], nx: usize, ny: usize, radius: f64) -> (usize, usize) {
    let dist = |a: (f64, f64), b: (f64, f64)| ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt();
    let mut min_di = f64::INFINITY;
    let mut min_dj = f64::INFINITY;
    for j in 0..ny {
        for i in 0..nx {
            let k = j * nx + i;
            if i + 1 < nx {
                min_di = min_di.min(dist(world[k], world[k + 1]));
            }
            if j + 1 < ny {
                min_dj = min_dj.min(dist(world[k], world[k + nx]));
            }
        }
    }
    let reach = |spacing: f64, n: usize| {
        if spacing.is_finite() && spacing > 0.0 {
            ((radius / spacing).ceil() as usize).min(n)
        } else {
            n
        }
    };
    (reach(min_di, nx), reach(min_dj, ny))
}
