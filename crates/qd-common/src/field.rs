//! Dense 2-D scalar fields with explicit missing values.

use serde::{Deserialize, Serialize};

use crate::error::{QdError, QdResult};

/// Dense matrix of scalar samples over a source's native grid.
///
/// A cell is `None` when its value is missing. Arithmetic helpers on this
/// type propagate missing values explicitly, so no sentinel comparisons are
/// needed anywhere downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    nx: usize,
    ny: usize,
    values: Vec<Option<f32>>,
}

impl Field {
    /// Create a field with every cell set to `fill`.
    pub fn filled(nx: usize, ny: usize, fill: Option<f32>) -> Self {
        Self {
            nx,
            ny,
            values: vec![fill; nx * ny],
        }
    }

    /// Create a field from row-major values.
    pub fn from_values(nx: usize, ny: usize, values: Vec<Option<f32>>) -> QdResult<Self> {
        if values.len() != nx * ny {
            return Err(QdError::ShapeMismatch {
                expected: (nx, ny),
                actual: (values.len(), 1),
            });
        }
        Ok(Self { nx, ny, values })
    }

    /// Create a field from row-major values where NaN marks a missing cell.
    pub fn from_f32(nx: usize, ny: usize, values: &[f32]) -> QdResult<Self> {
        Self::from_values(
            nx,
            ny,
            values
                .iter()
                .map(|v| if v.is_nan() { None } else { Some(*v) })
                .collect(),
        )
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    pub fn values(&self) -> &[Option<f32>] {
        &self.values
    }

    /// Value at node `(i, j)`. Panics when out of range.
    pub fn get(&self, i: usize, j: usize) -> Option<f32> {
        self.values[j * self.nx + i]
    }

    /// Value at a possibly out-of-range node; outside cells read as missing.
    pub fn at(&self, i: i64, j: i64) -> Option<f32> {
        if i < 0 || j < 0 || i >= self.nx as i64 || j >= self.ny as i64 {
            return None;
        }
        self.get(i as usize, j as usize)
    }

    pub fn set(&mut self, i: usize, j: usize, value: Option<f32>) {
        self.values[j * self.nx + i] = value;
    }

    /// Element-wise minimum and maximum ignoring missing cells.
    /// Returns `None` when every cell is missing.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.values.iter().flatten().fold(None, |acc, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
    }

    /// Replace every occurrence of `src` with `dst`. `None` may be used on
    /// either side to map from or to missing.
    pub fn replace(&mut self, src: Option<f32>, dst: Option<f32>) {
        for v in self.values.iter_mut() {
            if *v == src {
                *v = dst;
            }
        }
    }

    /// Apply a function to every cell.
    pub fn map(&self, f: impl Fn(Option<f32>) -> Option<f32>) -> Field {
        Field {
            nx: self.nx,
            ny: self.ny,
            values: self.values.iter().map(|v| f(*v)).collect(),
        }
    }

    /// Combine two fields of equal shape cell by cell.
    pub fn zip_with(
        &self,
        other: &Field,
        f: impl Fn(Option<f32>, Option<f32>) -> Option<f32>,
    ) -> QdResult<Field> {
        self.check_shape(other)?;
        Ok(Field {
            nx: self.nx,
            ny: self.ny,
            values: self
                .values
                .iter()
                .zip(other.values.iter())
                .map(|(a, b)| f(*a, *b))
                .collect(),
        })
    }

    /// `self * self_weight + other * other_weight`, missing if either cell is missing.
    pub fn linear_combination(
        &self,
        other: &Field,
        self_weight: f32,
        other_weight: f32,
    ) -> QdResult<Field> {
        self.zip_with(other, |a, b| match (a, b) {
            (Some(a), Some(b)) => Some(a * self_weight + b * other_weight),
            _ => None,
        })
    }

    pub fn check_shape(&self, other: &Field) -> QdResult<()> {
        if self.shape() != other.shape() {
            return Err(QdError::ShapeMismatch {
                expected: self.shape(),
                actual: other.shape(),
            });
        }
        Ok(())
    }

    /// Number of cells holding a value.
    pub fn valid_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_min_max_ignores_missing() {
        let f = Field::from_values(3, 1, vec![Some(2.0), None, Some(-1.0)]).unwrap();
        assert_eq!(f.min_max(), Some((-1.0, 2.0)));
    }

    #[test]
    fn test_min_max_all_missing() {
        let f = Field::filled(2, 2, None);
        assert_eq!(f.min_max(), None);
    }

    #[test]
    fn test_linear_combination_missing_absorbs() {
        let a = Field::from_values(2, 1, vec![Some(10.0), Some(4.0)]).unwrap();
        let b = Field::from_values(2, 1, vec![Some(20.0), None]).unwrap();
        let c = a.linear_combination(&b, 0.5, 0.5).unwrap();
        assert_eq!(c.get(0, 0), Some(15.0));
        assert_eq!(c.get(1, 0), None);
    }

    #[test]
    fn test_replace_to_and_from_missing() {
        let mut f = Field::from_values(3, 1, vec![Some(-99.0), Some(1.0), None]).unwrap();
        f.replace(Some(-99.0), None);
        assert_eq!(f.get(0, 0), None);
        f.replace(None, Some(0.0));
        assert_eq!(f.get(0, 0), Some(0.0));
        assert_eq!(f.get(2, 0), Some(0.0));
    }

    #[test]
    fn test_at_outside_is_missing() {
        let f = Field::filled(2, 2, Some(1.0));
        assert_eq!(f.at(-1, 0), None);
        assert_eq!(f.at(2, 0), None);
        assert_eq!(f.at(1, 1), Some(1.0));
    }

    #[test]
    fn test_shape_mismatch() {
        let a = Field::filled(2, 2, Some(1.0));
        let b = Field::filled(3, 2, Some(1.0));
        assert!(a.linear_combination(&b, 1.0, 0.0).is_err());
    }
}
