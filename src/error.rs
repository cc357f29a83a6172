//! Error types for text2sql.
//!
//! Defines the main error enum used throughout the crate.

use std::time::Duration;

use thiserror::Error;

/// Main error type for text2sql operations.
#[derive(Error, Debug)]
pub enum Text2SqlError {
    /// The query could not be submitted (bad request, auth, connectivity).
    #[error("Submission error: {0}")]
    Submission(String),

    /// A status or result fetch failed while waiting for a submitted query.
    #[error("Polling error: {0}")]
    Polling(String),

    /// The query ran and reached FAILED or CANCELLED. Holds the service's reason verbatim.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// The query did not reach a terminal state within the configured wait.
    #[error("Query timed out after {}s", .0.as_secs_f64())]
    Timeout(Duration),

    /// The caller cancelled the wait.
    #[error("Query cancelled")]
    Cancelled,

    /// LLM API errors (rate limits, auth, timeouts, missing SQL in reply, etc.)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Generated SQL that would modify data when mutations are not allowed.
    #[error("Unsafe query: {0}")]
    Unsafe(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Text2SqlError {
    /// Creates a submission error with the given message.
    pub fn submission(msg: impl Into<String>) -> Self {
        Self::Submission(msg.into())
    }

    /// Creates a polling error with the given message.
    pub fn polling(msg: impl Into<String>) -> Self {
        Self::Polling(msg.into())
    }

    /// Creates a query failure carrying the service-provided reason.
    pub fn query_failed(reason: impl Into<String>) -> Self {
        Self::QueryFailed(reason.into())
    }

    /// Creates an LLM error with the given message.
    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    /// Creates an unsafe-query error with the given message.
    pub fn unsafe_query(msg: impl Into<String>) -> Self {
        Self::Unsafe(msg.into())
    }

    /// Creates a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Creates an internal error with the given message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the unmodified failure reason if this is a query failure.
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::QueryFailed(reason) => Some(reason),
            _ => None,
        }
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Submission(_) => "Submission Error",
            Self::Polling(_) => "Polling Error",
            Self::QueryFailed(_) => "Query Failed",
            Self::Timeout(_) => "Timeout",
            Self::Cancelled => "Cancelled",
            Self::Llm(_) => "LLM Error",
            Self::Unsafe(_) => "Unsafe Query",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

/// Result type alias using Text2SqlError.
pub type Result<T> = std::result::Result<T, Text2SqlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_submission() {
        let err = Text2SqlError::submission("AccessDeniedException: not authorized");
        assert_eq!(
            err.to_string(),
            "Submission error: AccessDeniedException: not authorized"
        );
        assert_eq!(err.category(), "Submission Error");
    }

    #[test]
    fn test_error_display_polling() {
        let err = Text2SqlError::polling("connection reset");
        assert_eq!(err.to_string(), "Polling error: connection reset");
        assert_eq!(err.category(), "Polling Error");
    }

    #[test]
    fn test_query_failed_keeps_reason_verbatim() {
        let err = Text2SqlError::query_failed("line 1:8: mismatched input 'FORM'");
        assert_eq!(
            err.failure_reason(),
            Some("line 1:8: mismatched input 'FORM'")
        );
        assert_eq!(err.category(), "Query Failed");
    }

    #[test]
    fn test_failure_reason_only_for_query_failures() {
        assert!(Text2SqlError::polling("x").failure_reason().is_none());
        assert!(Text2SqlError::Cancelled.failure_reason().is_none());
    }

    #[test]
    fn test_error_display_timeout() {
        let err = Text2SqlError::Timeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "Query timed out after 5s");
        assert_eq!(err.category(), "Timeout");
    }

    #[test]
    fn test_error_display_config() {
        let err = Text2SqlError::config("missing field 'database' in [athena]");
        assert_eq!(
            err.to_string(),
            "Configuration error: missing field 'database' in [athena]"
        );
        assert_eq!(err.category(), "Configuration Error");
    }

    #[test]
    fn test_error_display_unsafe() {
        let err = Text2SqlError::unsafe_query("DROP TABLE orders");
        assert_eq!(err.to_string(), "Unsafe query: DROP TABLE orders");
        assert_eq!(err.category(), "Unsafe Query");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Text2SqlError>();
    }
}
