//! Error types for qdcontour.

use thiserror::Error;

/// Result type alias using QdError.
pub type QdResult<T> = Result<T, QdError>;

/// Primary error type for script interpretation and rendering.
///
/// Every variant is fatal for the whole run. Frame-level conditions such as
/// an unacceptable time or an already existing output image are not errors
/// and never surface here.
#[derive(Debug, Error)]
pub enum QdError {
    // === Configuration Errors ===
    #[error("Unknown command {0}")]
    UnknownCommand(String),

    #[error("Processing the '{0}' command failed")]
    MissingArgument(String),

    #[error("Invalid value for '{command}': {message}")]
    InvalidValue { command: String, message: String },

    #[error("Unknown blending rule '{0}'")]
    UnknownRule(String),

    #[error("Unrecognized color '{0}'")]
    UnknownColor(String),

    #[error("Filtering mode '{0}' is not recognized")]
    UnknownFilter(String),

    #[error("Image format '{0}' is not supported")]
    UnknownFormat(String),

    #[error("Unrecognized timestampimage mode '{0}'")]
    UnknownTimestampMode(String),

    #[error("Unknown contour interpolation method {0}")]
    UnknownInterpolation(String),

    #[error("Unknown smoother {0}")]
    UnknownSmoother(String),

    #[error("Unrecognized time zone '{0}'")]
    UnknownTimeZone(String),

    #[error("Invalid projection '{projection}': {message}")]
    InvalidProjection { projection: String, message: String },

    #[error("No projection has been specified for rendering")]
    NoProjection,

    #[error("No query data has been read!")]
    NoQueryData,

    // === Resource Errors ===
    #[error("File '{0}' does not exist")]
    FileNotFound(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Failed to read image '{path}': {message}")]
    Image { path: String, message: String },

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Font error: {0}")]
    Font(String),

    #[error("Failed to read shape '{path}': {message}")]
    Shape { path: String, message: String },

    #[error("Failed to read querydata '{path}': {message}")]
    QueryData { path: String, message: String },

    // === Data Errors ===
    #[error("Unknown parameter {0}")]
    UnknownParameter(String),

    #[error("The parameter is not usable: {0}")]
    UnusableParameter(String),

    #[error("Grid shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

impl QdError {
    /// Shorthand for an invalid command argument.
    pub fn invalid(command: &str, message: impl Into<String>) -> Self {
        QdError::InvalidValue {
            command: command.to_string(),
            message: message.into(),
        }
    }

    /// True for errors caused by the script itself rather than by data or resources.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            QdError::UnknownCommand(_)
                | QdError::MissingArgument(_)
                | QdError::InvalidValue { .. }
                | QdError::UnknownRule(_)
                | QdError::UnknownColor(_)
                | QdError::UnknownFilter(_)
                | QdError::UnknownFormat(_)
                | QdError::UnknownTimestampMode(_)
                | QdError::UnknownInterpolation(_)
                | QdError::UnknownSmoother(_)
                | QdError::UnknownTimeZone(_)
                | QdError::InvalidProjection { .. }
                | QdError::NoProjection
                | QdError::NoQueryData
        )
    }
}

// Conversion from common error types
impl From<std::io::Error> for QdError {
    fn from(err: std::io::Error) -> Self {
        QdError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for QdError {
    fn from(err: serde_json::Error) -> Self {
        QdError::Io(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        assert!(QdError::UnknownCommand("foo".into()).is_configuration_error());
        assert!(QdError::invalid("timestep", "negative").is_configuration_error());
        assert!(!QdError::UnknownParameter("Foo".into()).is_configuration_error());
        assert!(!QdError::FileNotFound("x.sqd".into()).is_configuration_error());
    }

    #[test]
    fn test_messages() {
        assert_eq!(
            QdError::UnknownParameter("Foo".into()).to_string(),
            "Unknown parameter Foo"
        );
        assert_eq!(
            QdError::MissingArgument("timestep".into()).to_string(),
            "Processing the 'timestep' command failed"
        );
    }
}
