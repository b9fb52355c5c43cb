//! Error types for the DynamoDB backend

use aws_smithy_types::error::display::DisplayErrorContext;
use spanstore_core::SpanStoreError;
use thiserror::Error;

/// Errors from DynamoDB table store operations
#[derive(Debug, Error)]
pub enum AwsStoreError {
    /// A DynamoDB call failed, or its request could not be built
    #[error("DynamoDB {operation} on {target} failed: {message}")]
    Request {
        operation: &'static str,
        target: String,
        message: String,
    },

    /// Invalid client configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AwsStoreError {
    /// Wrap an SDK or request-builder error, keeping the full source chain
    pub fn request(
        operation: &'static str,
        target: impl Into<String>,
        err: impl std::error::Error,
    ) -> Self {
        Self::Request {
            operation,
            target: target.into(),
            message: DisplayErrorContext(&err).to_string(),
        }
    }

    /// A response that lacks a field the operation depends on
    pub fn malformed(operation: &'static str, target: impl Into<String>, what: &str) -> Self {
        Self::Request {
            operation,
            target: target.into(),
            message: format!("response is missing {}", what),
        }
    }

    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

/// Result type for DynamoDB backend operations
pub type Result<T> = std::result::Result<T, AwsStoreError>;

impl From<AwsStoreError> for SpanStoreError {
    fn from(err: AwsStoreError) -> Self {
        match err {
            AwsStoreError::Request {
                operation,
                target,
                message,
            } => SpanStoreError::store(operation, target, message),
            AwsStoreError::InvalidConfig(msg) => SpanStoreError::config(msg),
        }
    }
}
