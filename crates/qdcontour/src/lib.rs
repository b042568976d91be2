//! Script driven contour image generation from querydata.
//!
//! A script configures a [`RenderContext`] command by command and asks it
//! to draw. `draw contours` renders one image per accepted frame time:
//! - [`aligner`] picks frame times and the data times blended into each
//! - [`resolver`] turns a parameter and frame into a field
//! - [`smoothing`] optionally smooths it before tracing
//! - [`compositor`] paints the layers and writes the image
//!
//! Shapes and HTML image maps are drawn by [`shapes`].

pub mod aligner;
pub mod compositor;
pub mod context;
pub mod labels;
pub mod preprocess;
pub mod resolver;
pub mod script;
pub mod shapes;
pub mod smoothing;
pub mod spec;
pub mod timestamp;

pub use aligner::{FilterPolicy, FrameRequest, TemporalAligner, TimeSettings};
pub use compositor::{draw_contours, DrawSummary, FrameCompositor};
pub use context::{RenderContext, SearchPaths, Settings, TimestampMode};
pub use preprocess::Preprocessor;
pub use resolver::{FieldResolver, ParameterId};
pub use script::{Command, ScriptInterpreter};
pub use smoothing::{Smoother, SmootherKind};
pub use spec::{ContourSpec, SpecRegistry};
