//! Error types for surfcheck

use thiserror::Error;

/// Result type alias using surfcheck Error
pub type Result<T> = std::result::Result<T, Error>;

/// surfcheck error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("TimeoutError: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Driver error: {0}")]
    Driver(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Invalid page state for {page}: expected {expected}, was {actual}")]
    PageState {
        page: String,
        expected: String,
        actual: String,
    },

    #[error("Missing required configuration: {0}")]
    MissingConfig(String),

    #[error("Invalid configuration value for {key}: {value:?}")]
    InvalidConfig { key: String, value: String },

    #[error("Test skipped: {0}")]
    Skipped(String),

    #[error("Report error: {0}")]
    Report(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used to decide how a failure is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorKind {
    /// Expected vs actual mismatch inside a test body
    Assertion,
    /// A wait or action exceeded its configured bound
    Timeout,
    /// Driver, file system or reporting failure
    Infrastructure,
    /// Required configuration missing or malformed
    Configuration,
    /// Test asked to be skipped
    Skipped,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Assertion => "assertion",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Infrastructure => "infrastructure",
            ErrorKind::Configuration => "configuration",
            ErrorKind::Skipped => "skipped",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Assertion(_) => ErrorKind::Assertion,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::MissingConfig(_) | Error::InvalidConfig { .. } => ErrorKind::Configuration,
            Error::Skipped(_) => ErrorKind::Skipped,
            _ => ErrorKind::Infrastructure,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    /// Short name of the error variant, used in structured error reports
    pub fn name(&self) -> &'static str {
        match self {
            Error::Assertion(_) => "AssertionError",
            Error::Timeout { .. } => "TimeoutError",
            Error::Driver(_) => "DriverError",
            Error::ElementNotFound(_) => "ElementNotFoundError",
            Error::PageState { .. } => "PageStateError",
            Error::MissingConfig(_) | Error::InvalidConfig { .. } => "ConfigurationError",
            Error::Skipped(_) => "Skipped",
            Error::Report(_) => "ReportError",
            Error::Io(_) => "IoError",
            Error::Serialization(_) => "SerializationError",
            Error::Url(_) => "UrlError",
            Error::Regex(_) => "RegexError",
            Error::Internal(_) => "InternalError",
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        Error::Timeout {
            operation: operation.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Error::Assertion(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_timeout_is_tagged() {
        let err = Error::timeout("waiting for #q to be visible", Duration::from_millis(5));
        assert!(err.is_timeout());
        assert_eq!(err.to_string(), "TimeoutError: waiting for #q to be visible exceeded 5ms");
    }

    #[test]
    fn test_classification() {
        assert_eq!(Error::assertion("x").kind(), ErrorKind::Assertion);
        assert_eq!(Error::Driver("closed".into()).kind(), ErrorKind::Infrastructure);
        assert_eq!(Error::MissingConfig("BASE_URL".into()).kind(), ErrorKind::Configuration);
        assert_eq!(Error::Skipped("flaky".into()).kind(), ErrorKind::Skipped);
    }
}
