//! Error types for banner backend operations

use thiserror::Error;

/// Result type alias for banner backend operations
pub type Result<T> = std::result::Result<T, BannerError>;

/// Top-level error type surfaced to callers of the library
#[derive(Error, Debug)]
pub enum BannerError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or encoding errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Caller supplied something that can never succeed
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Network errors while talking to remote hosts
    #[error("Network error: {0}")]
    Network(String),

    /// Object storage failures that are not recoverable locally
    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    /// Requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Every background-removal tier failed
    #[error("Background removal failed after all fallbacks: {0}")]
    RemovalExhausted(String),

    /// JSON (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error for unexpected conditions
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BannerError {
    /// Create a new invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a new not-found error
    pub fn not_found<S: Into<String>>(what: S) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a new internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Create network error with the operation that failed
    pub fn network_error<S: Into<String>, E: std::fmt::Display>(context: S, error: E) -> Self {
        Self::Network(format!("{}: {}", context.into(), error))
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: &std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let err = BannerError::invalid_config("test config error");
        assert!(matches!(err, BannerError::InvalidConfig(_)));

        let err = BannerError::not_found("partner 42");
        assert!(matches!(err, BannerError::NotFound(_)));
    }

    #[test]
    fn test_error_display() {
        let err = BannerError::invalid_input("empty url");
        assert_eq!(err.to_string(), "Invalid input: empty url");

        let err = BannerError::not_found("partner 7");
        assert_eq!(err.to_string(), "Not found: partner 7");
    }

    #[test]
    fn test_enhanced_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = BannerError::file_io_error("write catalog", Path::new("/tmp/catalog.json"), &io_error);
        let error_string = err.to_string();
        assert!(error_string.contains("write catalog"));
        assert!(error_string.contains("/tmp/catalog.json"));

        let err = BannerError::config_value_error("min image bytes", 0, "1-10485760", Some(1024));
        let error_string = err.to_string();
        assert!(error_string.contains("min image bytes"));
        assert!(error_string.contains("Recommended: 1024"));

        let err = BannerError::network_error("Failed to fetch model", "connection reset");
        assert_eq!(
            err.to_string(),
            "Network error: Failed to fetch model: connection reset"
        );
    }
}
