//! In-memory construction of querydata.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use qd_common::{Field, GridSpec, QdError, QdResult};

use crate::QueryData;

/// Builder for a [`QueryData`] held in memory.
///
/// ```ignore
/// let qd = QueryDataBuilder::new("memory:t2m", grid)
///     .times(times)
///     .param("Temperature", fields)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct QueryDataBuilder {
    path: String,
    producer: String,
    origin_time: Option<NaiveDateTime>,
    grid: GridSpec,
    levels: Vec<f64>,
    times: Vec<NaiveDateTime>,
    params: BTreeMap<String, Vec<Vec<Field>>>,
}

impl QueryDataBuilder {
    pub fn new(path: impl Into<String>, grid: GridSpec) -> Self {
        Self {
            path: path.into(),
            producer: String::new(),
            origin_time: None,
            grid,
            levels: vec![0.0],
            times: Vec::new(),
            params: BTreeMap::new(),
        }
    }

    pub fn producer(mut self, producer: impl Into<String>) -> Self {
        self.producer = producer.into();
        self
    }

    /// Origin time; defaults to the first valid time.
    pub fn origin_time(mut self, time: NaiveDateTime) -> Self {
        self.origin_time = Some(time);
        self
    }

    pub fn levels(mut self, levels: Vec<f64>) -> Self {
        self.levels = levels;
        self
    }

    pub fn times(mut self, times: Vec<NaiveDateTime>) -> Self {
        self.times = times;
        self
    }

    /// Single-level parameter, one field per valid time.
    pub fn param(mut self, name: impl Into<String>, fields: Vec<Field>) -> Self {
        self.params
            .insert(name.into(), fields.into_iter().map(|f| vec![f]).collect());
        self
    }

    /// Multi-level parameter indexed `[time][level]`.
    pub fn param_levels(mut self, name: impl Into<String>, fields: Vec<Vec<Field>>) -> Self {
        self.params.insert(name.into(), fields);
        self
    }

    pub fn build(self) -> QdResult<QueryData> {
        let invalid = |message: String| QdError::QueryData {
            path: self.path.clone(),
            message,
        };

        if self.times.is_empty() {
            return Err(invalid("no valid times".to_string()));
        }
        if self.times.windows(2).any(|w| w[0] >= w[1]) {
            return Err(invalid("valid times must be strictly ascending".to_string()));
        }
        for (name, per_time) in &self.params {
            if per_time.len() != self.times.len() {
                return Err(invalid(format!("parameter {} has the wrong number of times", name)));
            }
            for per_level in per_time {
                if per_level.len() != self.levels.len() {
                    return Err(invalid(format!("parameter {} has the wrong number of levels", name)));
                }
                for field in per_level {
                    if field.shape() != (self.grid.nx, self.grid.ny) {
                        return Err(invalid(format!("parameter {} does not match the grid", name)));
                    }
                }
            }
        }

        let origin_time = self.origin_time.unwrap_or(self.times[0]);
        Ok(QueryData::from_parts(
            self.path,
            self.producer,
            origin_time,
            self.grid,
            self.levels,
            self.times,
            self.params,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GridSource;
    use chrono::NaiveDate;

    fn hour(h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_build() {
        let grid = GridSpec::new(2, 1, 1.0, 1.0, 0.0, 0.0);
        let qd = QueryDataBuilder::new("memory", grid)
            .times(vec![hour(0), hour(1)])
            .param("Temperature", vec![Field::filled(2, 1, Some(1.0)), Field::filled(2, 1, Some(2.0))])
            .build()
            .unwrap();
        assert_eq!(qd.origin_time(), hour(0));
        assert_eq!(qd.values("Temperature", 0, 1).unwrap().get(1, 0), Some(2.0));
    }

    #[test]
    fn test_build_rejects_wrong_shape() {
        let grid = GridSpec::new(2, 1, 1.0, 1.0, 0.0, 0.0);
        let result = QueryDataBuilder::new("memory", grid)
            .times(vec![hour(0)])
            .param("Temperature", vec![Field::filled(3, 1, Some(1.0))])
            .build();
        assert!(result.is_err());
    }
}
