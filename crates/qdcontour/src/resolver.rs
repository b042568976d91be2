//! Parameter lookup and per-frame field retrieval.

use qd_common::{Field, QdError, QdResult};
use querydata::{GridSource, MetaParameter};

use crate::aligner::{FilterPolicy, SourceFrame, Window};

/// A parameter name resolved to a stored or derived parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterId {
    Native(String),
    Meta(MetaParameter),
}

impl ParameterId {
    /// Parse a parameter name. Unknown meta names and malformed names fail.
    pub fn parse(name: &str) -> QdResult<Self> {
        if let Some(meta) = MetaParameter::parse(name) {
            return Ok(ParameterId::Meta(meta));
        }
        if name.starts_with("Meta") || !is_valid_name(name) {
            return Err(QdError::UnknownParameter(name.to_string()));
        }
        Ok(ParameterId::Native(name.to_string()))
    }

    pub fn name(&self) -> &str {
        match self {
            ParameterId::Native(name) => name,
            ParameterId::Meta(meta) => meta.name(),
        }
    }
}

/// Parameter names start with a letter and contain letters, digits and underscores.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Index of the source that provides a parameter. Meta parameters always
/// come from the first source.
pub fn locate(sources: &[Box<dyn GridSource>], param: &ParameterId) -> QdResult<usize> {
    if sources.is_empty() {
        return Err(QdError::NoQueryData);
    }
    match param {
        ParameterId::Meta(_) => Ok(0),
        ParameterId::Native(name) => sources
            .iter()
            .position(|s| s.has_param(name))
            .ok_or_else(|| QdError::UnknownParameter(name.clone())),
    }
}

/// Builds the field of a parameter for one frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldResolver {
    pub level: usize,
    pub filter: FilterPolicy,
}

impl FieldResolver {
    pub fn new(level: usize, filter: FilterPolicy) -> Self {
        Self { level, filter }
    }

    /// Field of `param` at one data time, after value substitution.
    pub fn raw(
        &self,
        source: &dyn GridSource,
        param: &ParameterId,
        time_index: usize,
        replace: Option<(Option<f32>, Option<f32>)>,
    ) -> QdResult<Field> {
        let mut field = match param {
            ParameterId::Native(name) => source.values(name, self.level, time_index)?,
            ParameterId::Meta(meta) => meta.compute(source, self.level, time_index)?,
        };
        if let Some((src, dst)) = replace {
            field.replace(src, dst);
        }
        Ok(field)
    }

    /// Field of `param` for a frame window.
    pub fn resolve(
        &self,
        source: &dyn GridSource,
        param: &ParameterId,
        frame: &SourceFrame,
        replace: Option<(Option<f32>, Option<f32>)>,
    ) -> QdResult<Field> {
        match &frame.window {
            Window::Exact(index) => self.raw(source, param, *index, replace),
            Window::Blend { previous, next, weight } => {
                let prev = self.raw(source, param, *previous, replace)?;
                let next = self.raw(source, param, *next, replace)?;
                next.linear_combination(&prev, *weight, 1.0 - *weight)
            }
            Window::Aggregate(indices) => {
                let fields = indices
                    .iter()
                    .map(|i| self.raw(source, param, *i, replace))
                    .collect::<QdResult<Vec<_>>>()?;
                aggregate(&fields, self.filter)
            }
        }
    }
}

/// Combine fields cell by cell. Missing inputs are skipped; a cell missing
/// in every field stays missing.
pub fn aggregate(fields: &[Field], policy: FilterPolicy) -> QdResult<Field> {
    let Some(first) = fields.first() else {
        return Err(QdError::InvalidValue {
            command: "filter".to_string(),
            message: "no data times to aggregate".to_string(),
        });
    };
    for field in &fields[1..] {
        first.check_shape(field)?;
    }

    let (nx, ny) = first.shape();
    let values = (0..nx * ny)
        .map(|k| {
            let mut present = fields.iter().filter_map(|f| f.values()[k]);
            let init = present.next()?;
            let (acc, count) = present.fold((init, 1u32), |(acc, n), v| {
                let acc = match policy {
                    FilterPolicy::Min => acc.min(v),
                    FilterPolicy::Max => acc.max(v),
                    FilterPolicy::Mean | FilterPolicy::Sum => acc + v,
                    // Non-aggregating policies keep the latest value
                    FilterPolicy::None | FilterPolicy::Linear => acc,
                };
                (acc, n + 1)
            });
            Some(match policy {
                FilterPolicy::Mean => acc / count as f32,
                _ => acc,
            })
        })
        .collect();
    Field::from_values(nx, ny, values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(values: &[Option<f32>]) -> Field {
        Field::from_values(values.len(), 1, values.to_vec()).unwrap()
    }

    #[test]
    fn test_parse_parameter_names() {
        assert_eq!(
            ParameterId::parse("Temperature").unwrap(),
            ParameterId::Native("Temperature".to_string())
        );
        assert_eq!(
            ParameterId::parse("MetaWindChill").unwrap(),
            ParameterId::Meta(MetaParameter::WindChill)
        );
        assert!(matches!(ParameterId::parse("MetaFoo"), Err(QdError::UnknownParameter(_))));
        assert!(matches!(ParameterId::parse("2m-temp"), Err(QdError::UnknownParameter(_))));
    }

    #[test]
    fn test_locate_unknown_native_parameter() {
        let grid = test_utils::small_grid();
        let sources: Vec<Box<dyn GridSource>> = vec![
            Box::new(test_utils::create_series_source("a.json", &grid, "Temperature", vec![test_utils::at(0, 0)], |_| {
                test_utils::create_constant_field(5, 5, 1.0)
            })),
            Box::new(test_utils::create_series_source("b.json", &grid, "Pressure", vec![test_utils::at(0, 0)], |_| {
                test_utils::create_constant_field(5, 5, 1000.0)
            })),
        ];
        assert_eq!(locate(&sources, &ParameterId::Native("Pressure".into())).unwrap(), 1);
        assert_eq!(locate(&sources, &ParameterId::Meta(MetaParameter::WindChill)).unwrap(), 0);
        assert!(matches!(
            locate(&sources, &ParameterId::Native("Humidity".into())),
            Err(QdError::UnknownParameter(_))
        ));
        assert!(matches!(locate(&[], &ParameterId::Native("Humidity".into())), Err(QdError::NoQueryData)));
    }

    #[test]
    fn test_aggregate_policies() {
        let a = field(&[Some(1.0), Some(4.0), None]);
        let b = field(&[Some(3.0), None, None]);
        let fields = [a, b];

        let mean = aggregate(&fields, FilterPolicy::Mean).unwrap();
        assert_eq!(mean.values(), &[Some(2.0), Some(4.0), None]);
        let sum = aggregate(&fields, FilterPolicy::Sum).unwrap();
        assert_eq!(sum.values(), &[Some(4.0), Some(4.0), None]);
        let min = aggregate(&fields, FilterPolicy::Min).unwrap();
        assert_eq!(min.values()[0], Some(1.0));
        let max = aggregate(&fields, FilterPolicy::Max).unwrap();
        assert_eq!(max.values()[0], Some(3.0));
    }

    #[test]
    fn test_aggregate_shape_mismatch() {
        let fields = [field(&[Some(1.0)]), field(&[Some(1.0), Some(2.0)])];
        assert!(aggregate(&fields, FilterPolicy::Sum).is_err());
        assert!(aggregate(&[], FilterPolicy::Sum).is_err());
    }
}
