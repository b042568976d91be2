//! Test data generators for creating synthetic weather-like data.
//!
//! These generators create predictable, verifiable test data patterns
//! that can be used across the test suite.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use qd_common::{Field, GridSpec};
use querydata::{QueryData, QueryDataBuilder};

/// A fixed reference day for tests (2024-01-15), at `hour:minute` UTC.
pub fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 15)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .expect("valid reference time")
}

/// `count` times starting at `start`, `step_minutes` apart.
pub fn time_series(start: NaiveDateTime, count: usize, step_minutes: i64) -> Vec<NaiveDateTime> {
    (0..count)
        .map(|k| start + Duration::minutes(step_minutes * k as i64))
        .collect()
}

/// Creates a field with predictable values.
///
/// Each cell value is `i + 10 * j`, so `field.get(i, j)` identifies the
/// cell it came from.
pub fn create_ramp_field(nx: usize, ny: usize) -> Field {
    let mut field = Field::filled(nx, ny, None);
    for j in 0..ny {
        for i in 0..nx {
            field.set(i, j, Some((i + 10 * j) as f32));
        }
    }
    field
}

/// Creates a field filled with a constant value.
pub fn create_constant_field(nx: usize, ny: usize, value: f32) -> Field {
    Field::filled(nx, ny, Some(value))
}

/// Creates a constant field with missing values at `(i, j)` positions.
pub fn create_field_with_missing(nx: usize, ny: usize, value: f32, missing: &[(usize, usize)]) -> Field {
    let mut field = create_constant_field(nx, ny, value);
    for &(i, j) in missing {
        if i < nx && j < ny {
            field.set(i, j, None);
        }
    }
    field
}

/// Build an in-memory source with one single-level parameter whose field at
/// time index `k` is `field_at(k)`.
pub fn create_series_source(
    path: &str,
    grid: &GridSpec,
    param: &str,
    times: Vec<NaiveDateTime>,
    field_at: impl Fn(usize) -> Field,
) -> QueryData {
    let fields = (0..times.len()).map(field_at).collect();
    QueryDataBuilder::new(path, grid.clone())
        .times(times)
        .param(param, fields)
        .build()
        .expect("valid synthetic querydata")
}

#[cfg(test)]
mod tests {
    use super::*;
    use querydata::GridSource;

    #[test]
    fn test_ramp_field_identifies_cells() {
        let field = create_ramp_field(4, 3);
        assert_eq!(field.get(0, 0), Some(0.0));
        assert_eq!(field.get(3, 2), Some(23.0));
    }

    #[test]
    fn test_field_with_missing() {
        let field = create_field_with_missing(3, 3, 1.0, &[(1, 1), (9, 9)]);
        assert_eq!(field.get(1, 1), None);
        assert_eq!(field.valid_count(), 8);
    }

    #[test]
    fn test_time_series() {
        let times = time_series(at(6, 0), 3, 30);
        assert_eq!(times[2], at(7, 0));
    }

    #[test]
    fn test_series_source() {
        let grid = GridSpec::new(3, 2, 1.0, 1.0, 20.0, 60.0);
        let qd = create_series_source("memory:t", &grid, "Temperature", time_series(at(0, 0), 4, 60), |k| {
            create_constant_field(3, 2, k as f32)
        });
        assert_eq!(qd.times().len(), 4);
        assert_eq!(qd.values("Temperature", 0, 3).unwrap().get(0, 0), Some(3.0));
    }
}
