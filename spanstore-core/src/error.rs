//! Error types for the span store crate

use std::time::Duration;
use thiserror::Error;

/// Result type for span store operations
pub type Result<T> = std::result::Result<T, SpanStoreError>;

/// Errors that can occur while reconciling the schema or persisting
/// dependency facts
#[derive(Error, Debug)]
pub enum SpanStoreError {
    /// A backing store call failed
    #[error("Store error during {operation} on {target}: {message}")]
    Store {
        /// Name of the backend call (e.g. "CreateTable")
        operation: &'static str,
        /// Table name, or `table/index` for index-scoped calls
        target: String,
        message: String,
    },

    /// A bounded wait exceeded its deadline
    #[error("Timed out after {waited:?} waiting for {what}")]
    Timeout { what: String, waited: Duration },

    /// A bounded wait was cancelled by the caller
    #[error("Cancelled while waiting for {what}")]
    Cancelled { what: String },

    /// Malformed table specification or configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A record could not be converted to store attributes
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl SpanStoreError {
    /// Create a store error for a failed backend call
    pub fn store(
        operation: &'static str,
        target: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::Store {
            operation,
            target: target.into(),
            message: message.to_string(),
        }
    }

    /// Create a timeout error
    pub fn timeout(what: impl Into<String>, waited: Duration) -> Self {
        Self::Timeout {
            what: what.into(),
            waited,
        }
    }

    /// Create a cancellation error
    pub fn cancelled(what: impl Into<String>) -> Self {
        Self::Cancelled { what: what.into() }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl From<serde_json::Error> for SpanStoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
