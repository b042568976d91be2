//! Common types shared across the qdcontour crates.

pub mod color;
pub mod error;
pub mod field;
pub mod grid;
pub mod time;

pub use color::{BlendRule, Color};
pub use error::{QdError, QdResult};
pub use field::Field;
pub use grid::{BoundingBox, GridSpec};
pub use time::TimeZoneSpec;
