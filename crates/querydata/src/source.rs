//! File-backed querydata.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::SystemTime;

use chrono::{DateTime, NaiveDateTime, Utc};
use qd_common::{Field, GridSpec, QdError, QdResult};
use serde::{Deserialize, Serialize};

use crate::GridSource;

/// On-disk layout of a querydata file.
///
/// `params` maps a parameter name to its values indexed
/// `[time][level][row-major cell]`, with `null` for missing cells.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryDataFile {
    #[serde(default)]
    pub producer: String,
    pub origin_time: DateTime<Utc>,
    pub grid: GridSpec,
    #[serde(default)]
    pub levels: Vec<f64>,
    pub times: Vec<DateTime<Utc>>,
    pub params: BTreeMap<String, Vec<Vec<Vec<Option<f32>>>>>,
}

/// A loaded, validated grid dataset.
#[derive(Debug, Clone)]
pub struct QueryData {
    path: String,
    producer: String,
    origin_time: NaiveDateTime,
    grid: GridSpec,
    levels: Vec<f64>,
    times: Vec<NaiveDateTime>,
    /// name -> [time][level]
    params: BTreeMap<String, Vec<Vec<Field>>>,
    modified: Option<SystemTime>,
}

impl QueryData {
    /// Read and validate a querydata file.
    pub fn open(path: impl AsRef<Path>) -> QdResult<Self> {
        let path = path.as_ref();
        let shown = path.display().to_string();

        if !path.exists() {
            return Err(QdError::FileNotFound(shown));
        }

        let text = std::fs::read_to_string(path)?;
        let file: QueryDataFile = serde_json::from_str(&text).map_err(|e| QdError::QueryData {
            path: shown.clone(),
            message: e.to_string(),
        })?;
        let modified = std::fs::metadata(path).and_then(|m| m.modified()).ok();

        let mut data = Self::from_file(&shown, file)?;
        data.modified = modified;

        tracing::debug!(
            path = %shown,
            producer = %data.producer,
            times = data.times.len(),
            params = data.params.len(),
            "Querydata loaded"
        );

        Ok(data)
    }

    /// Validate a parsed file and convert it into a source.
    pub fn from_file(path: &str, file: QueryDataFile) -> QdResult<Self> {
        let invalid = |message: String| QdError::QueryData {
            path: path.to_string(),
            message,
        };

        let level_count = file.levels.len().max(1);
        let levels = if file.levels.is_empty() {
            vec![0.0]
        } else {
            file.levels
        };

        let times: Vec<NaiveDateTime> = file.times.iter().map(|t| t.naive_utc()).collect();
        if times.is_empty() {
            return Err(invalid("no valid times".to_string()));
        }
        if times.windows(2).any(|w| w[0] >= w[1]) {
            return Err(invalid("valid times must be strictly ascending".to_string()));
        }
        if file.grid.is_empty() {
            return Err(invalid("empty grid".to_string()));
        }

        let nx = file.grid.nx;
        let ny = file.grid.ny;
        let mut params = BTreeMap::new();
        for (name, per_time) in file.params {
            if per_time.len() != times.len() {
                return Err(invalid(format!(
                    "parameter {} has {} time steps, expected {}",
                    name,
                    per_time.len(),
                    times.len()
                )));
            }
            let mut fields = Vec::with_capacity(per_time.len());
            for per_level in per_time {
                if per_level.len() != level_count {
                    return Err(invalid(format!(
                        "parameter {} has {} levels, expected {}",
                        name,
                        per_level.len(),
                        level_count
                    )));
                }
                let level_fields = per_level
                    .into_iter()
                    .map(|values| {
                        Field::from_values(nx, ny, values)
                            .map_err(|_| invalid(format!("parameter {} does not match the grid size", name)))
                    })
                    .collect::<QdResult<Vec<_>>>()?;
                fields.push(level_fields);
            }
            params.insert(name, fields);
        }

        Ok(Self {
            path: path.to_string(),
            producer: file.producer,
            origin_time: file.origin_time.naive_utc(),
            grid: file.grid,
            levels,
            times,
            params,
            modified: None,
        })
    }

    /// Assemble a source from parts already in memory.
    pub(crate) fn from_parts(
        path: String,
        producer: String,
        origin_time: NaiveDateTime,
        grid: GridSpec,
        levels: Vec<f64>,
        times: Vec<NaiveDateTime>,
        params: BTreeMap<String, Vec<Vec<Field>>>,
    ) -> Self {
        Self {
            path,
            producer,
            origin_time,
            grid,
            levels,
            times,
            params,
            modified: None,
        }
    }

    pub fn producer(&self) -> &str {
        &self.producer
    }

    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    /// Convert back to the on-disk layout.
    pub fn to_file(&self) -> QueryDataFile {
        QueryDataFile {
            producer: self.producer.clone(),
            origin_time: self.origin_time.and_utc(),
            grid: self.grid.clone(),
            levels: self.levels.clone(),
            times: self.times.iter().map(|t| t.and_utc()).collect(),
            params: self
                .params
                .iter()
                .map(|(name, per_time)| {
                    let values = per_time
                        .iter()
                        .map(|per_level| per_level.iter().map(|f| f.values().to_vec()).collect())
                        .collect();
                    (name.clone(), values)
                })
                .collect(),
        }
    }

    /// Write the source as a querydata file.
    pub fn save(&self, path: impl AsRef<Path>) -> QdResult<()> {
        let text = serde_json::to_string(&self.to_file())?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

impl GridSource for QueryData {
    fn path(&self) -> &str {
        &self.path
    }

    fn grid(&self) -> &GridSpec {
        &self.grid
    }

    fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    fn origin_time(&self) -> NaiveDateTime {
        self.origin_time
    }

    fn level_count(&self) -> usize {
        self.levels.len()
    }

    fn has_param(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    fn values(&self, name: &str, level: usize, time_index: usize) -> QdResult<Field> {
        let per_time = self
            .params
            .get(name)
            .ok_or_else(|| QdError::UnusableParameter(name.to_string()))?;
        per_time
            .get(time_index)
            .and_then(|per_level| per_level.get(level))
            .cloned()
            .ok_or_else(|| {
                QdError::UnusableParameter(format!(
                    "{} (level {}, time index {})",
                    name, level, time_index
                ))
            })
    }

    fn modified(&self) -> Option<SystemTime> {
        self.modified
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "producer": "HIRLAM",
        "origin_time": "2024-03-05T00:00:00Z",
        "grid": { "nx": 2, "ny": 2, "lon0": 20.0, "lat0": 60.0, "dx": 1.0, "dy": 1.0 },
        "times": ["2024-03-05T06:00:00Z", "2024-03-05T07:00:00Z"],
        "params": {
            "Temperature": [
                [[1.0, 2.0, 3.0, null]],
                [[5.0, 6.0, 7.0, 8.0]]
            ]
        }
    }"#;

    fn sample() -> QueryData {
        let file: QueryDataFile = serde_json::from_str(SAMPLE).unwrap();
        QueryData::from_file("sample.json", file).unwrap()
    }

    #[test]
    fn test_parse_sample() {
        let qd = sample();
        assert_eq!(qd.producer(), "HIRLAM");
        assert_eq!(qd.times().len(), 2);
        assert_eq!(qd.level_count(), 1);
        assert!(qd.has_param("Temperature"));
        assert!(!qd.has_param("Pressure"));

        let field = qd.values("Temperature", 0, 0).unwrap();
        assert_eq!(field.get(1, 1), None);
        assert_eq!(field.get(0, 1), Some(3.0));
    }

    #[test]
    fn test_values_out_of_range() {
        let qd = sample();
        assert!(qd.values("Temperature", 1, 0).is_err());
        assert!(qd.values("Temperature", 0, 5).is_err());
        assert!(matches!(
            qd.values("Pressure", 0, 0),
            Err(QdError::UnusableParameter(_))
        ));
    }

    #[test]
    fn test_rejects_bad_sizes() {
        let mut file: QueryDataFile = serde_json::from_str(SAMPLE).unwrap();
        file.grid.nx = 3;
        assert!(QueryData::from_file("bad.json", file).is_err());
    }

    #[test]
    fn test_rejects_unordered_times() {
        let mut file: QueryDataFile = serde_json::from_str(SAMPLE).unwrap();
        file.times.reverse();
        assert!(QueryData::from_file("bad.json", file).is_err());
    }

    #[test]
    fn test_interpolated_value() {
        let qd = sample();
        let v = qd
            .interpolated_value("Temperature", 0, 1, 20.5, 60.5)
            .unwrap()
            .unwrap();
        assert!((v - 6.5).abs() < 1e-6);
        assert_eq!(
            qd.interpolated_value("Temperature", 0, 0, 20.5, 60.5).unwrap(),
            None
        );
    }
}
