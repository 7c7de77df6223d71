//! Error types for resilient browser operations

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for calls into a browser-automation collaborator
pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Failure raised by the page, locator or accessibility engine behind an operation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("Timeout {timeout_ms}ms exceeded while running {operation}")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Target closed: {0}")]
    TargetClosed(String),

    #[error("Page crashed: {0}")]
    PageCrashed(String),

    #[error("Navigation timeout: {0}")]
    NavigationTimeout(String),

    #[error("Element not found: {0}")]
    ElementNotFound(String),

    #[error("Evaluation failed: {0}")]
    Evaluation(String),

    #[error("Accessibility engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("Assertion failed: {0}")]
    Assertion(String),

    #[error("{message}")]
    Other { name: String, message: String },
}

impl DriverError {
    /// Error class name, in the form the automation layer reports it
    pub fn name(&self) -> &str {
        match self {
            DriverError::Timeout { .. } => "TimeoutError",
            DriverError::Network(_) => "NetworkError",
            DriverError::Protocol(_) => "ProtocolError",
            DriverError::TargetClosed(_) => "TargetClosedError",
            DriverError::PageCrashed(_) => "PageCrashedError",
            DriverError::NavigationTimeout(_) => "NavigationTimeoutError",
            DriverError::ElementNotFound(_) => "ElementNotFoundError",
            DriverError::Evaluation(_) => "EvaluationError",
            DriverError::EngineUnavailable(_) => "EngineUnavailableError",
            DriverError::Assertion(_) => "AssertionError",
            DriverError::Other { name, .. } => name,
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        DriverError::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    pub fn other(name: impl Into<String>, message: impl Into<String>) -> Self {
        DriverError::Other {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Anything the classifier can inspect: a name, a message and a type name
pub trait ErrorSignature {
    fn name(&self) -> &str;
    fn message(&self) -> String;
    fn type_name(&self) -> &str;
}

impl ErrorSignature for DriverError {
    fn name(&self) -> &str {
        DriverError::name(self)
    }

    fn message(&self) -> String {
        self.to_string()
    }

    fn type_name(&self) -> &str {
        "DriverError"
    }
}

/// Serializable snapshot of an error, stored in reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub name: String,
    pub message: String,
}

impl ErrorDetails {
    /// `name: message`, used to rank recurring failures
    pub fn signature(&self) -> String {
        format!("{}: {}", self.name, self.message)
    }
}

impl From<&DriverError> for ErrorDetails {
    fn from(e: &DriverError) -> Self {
        Self {
            name: e.name().to_string(),
            message: e.to_string(),
        }
    }
}

impl ErrorSignature for ErrorDetails {
    fn name(&self) -> &str {
        &self.name
    }

    fn message(&self) -> String {
        self.message.clone()
    }

    fn type_name(&self) -> &str {
        "ErrorDetails"
    }
}

/// Error returned by the retry executor
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResilienceError {
    #[error("Operation '{operation}' failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        source: DriverError,
    },

    #[error(transparent)]
    Fatal(#[from] DriverError),
}

impl ResilienceError {
    /// The underlying collaborator error
    pub fn driver_error(&self) -> &DriverError {
        match self {
            ResilienceError::RetriesExhausted { source, .. } => source,
            ResilienceError::Fatal(e) => e,
        }
    }

    pub fn into_driver_error(self) -> DriverError {
        match self {
            ResilienceError::RetriesExhausted { source, .. } => source,
            ResilienceError::Fatal(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_details_signature() {
        let err = DriverError::TargetClosed("page.screenshot".to_string());
        let details = ErrorDetails::from(&err);
        assert_eq!(details.name, "TargetClosedError");
        assert_eq!(details.signature(), "TargetClosedError: Target closed: page.screenshot");
    }

    #[test]
    fn test_exhausted_message_names_operation() {
        let err = ResilienceError::RetriesExhausted {
            operation: "capture_screenshot".to_string(),
            attempts: 3,
            source: DriverError::timeout("page.screenshot", 30000),
        };
        let text = err.to_string();
        assert!(text.contains("capture_screenshot"));
        assert!(text.contains("3 attempts"));
        assert_eq!(err.driver_error().name(), "TimeoutError");
    }
}
