//! Time-indexed grid sources ("querydata").
//!
//! A [`GridSource`] exposes one dataset on a regular lat/lon grid: its valid
//! times, levels and parameters. The rendering pipeline only reads sources;
//! all positional state (which time, which level) is passed explicitly.
//!
//! # Architecture
//!
//! ```text
//! querydata command
//!      │
//!      ▼
//! QueryData::open(path)  ──► JSON file ──► validated QueryData
//!      │
//!      ▼
//! GridSource::values(param, level, time)
//!      │
//!      ├─► native parameter: stored field
//!      │
//!      └─► meta parameter: MetaParameter::compute() from native fields
//! ```

pub mod interpolation;
pub mod memory;
pub mod meta;
pub mod source;

pub use interpolation::{bilinear, bilinear_from_corners};
pub use memory::QueryDataBuilder;
pub use meta::MetaParameter;
pub use source::{QueryData, QueryDataFile};

use std::time::SystemTime;

use chrono::NaiveDateTime;
use qd_common::{Field, GridSpec, QdResult};

/// Read access to one time-varying grid dataset.
pub trait GridSource: Send + Sync {
    /// Identity of the source, normally its file path.
    fn path(&self) -> &str;

    fn grid(&self) -> &GridSpec;

    /// Valid times in UTC, strictly ascending.
    fn times(&self) -> &[NaiveDateTime];

    /// Forecast origin time in UTC.
    fn origin_time(&self) -> NaiveDateTime;

    fn level_count(&self) -> usize;

    /// True if the native parameter is stored in this source.
    fn has_param(&self, name: &str) -> bool;

    /// Field of a native parameter at a level and time index.
    fn values(&self, name: &str, level: usize, time_index: usize) -> QdResult<Field>;

    /// Modification time of the backing file, if any.
    fn modified(&self) -> Option<SystemTime> {
        None
    }

    /// Bilinearly interpolated value of a native parameter at a geographic point.
    fn interpolated_value(
        &self,
        name: &str,
        level: usize,
        time_index: usize,
        lon: f64,
        lat: f64,
    ) -> QdResult<Option<f32>> {
        let field = self.values(name, level, time_index)?;
        let (x, y) = self.grid().lon_lat_to_grid(lon, lat);
        Ok(bilinear(&field, x, y))
    }
}
