/// Structured error types for mealdash-core.
///
/// Rule rejections (coupon, day switch, status) have their own enums so the
/// HTTP layer can report them precisely; `CoreError` wraps everything else.
use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::validation::ValidationError;

/// Main error type for mealdash-core operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// I/O operation failed
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: io::Error,
    },

    /// Config file could not be parsed
    #[error("Invalid config file {path:?}: {source}")]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// Configuration is incomplete or inconsistent
    #[error("Configuration error: {reason}")]
    Config { reason: String },

    /// Input failed validation
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// A business rule rejected the request
    #[error("{0}")]
    Rule(String),
}

/// Result type alias for mealdash-core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl CoreError {
    /// Create a config error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create a rule error
    pub fn rule(reason: impl Into<String>) -> Self {
        Self::Rule(reason.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::config("stripe.secret_key is required");
        assert_eq!(
            err.to_string(),
            "Configuration error: stripe.secret_key is required"
        );

        let err: CoreError = ValidationError::Empty { field: "name" }.into();
        assert_eq!(err.to_string(), "name cannot be empty");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: CoreError = io_err.into();

        assert!(matches!(err, CoreError::Io { .. }));
    }
}
