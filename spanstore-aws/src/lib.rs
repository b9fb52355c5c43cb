//! Amazon DynamoDB backend for the span store
//!
//! Implements [`spanstore_core::TableStore`] with `aws-sdk-dynamodb`, so the
//! schema reconciler and dependency writer can run against a real DynamoDB
//! (or DynamoDB Local via an endpoint override).
//!
//! ## Usage
//!
//! ```ignore
//! use spanstore_aws::{DynamoDbConfig, DynamoDbTableStore};
//! use spanstore_core::{SpanStoreAdapter, SpanStoreConfig};
//! use std::sync::Arc;
//!
//! let store = DynamoDbTableStore::connect(DynamoDbConfig {
//!     endpoint: Some("http://localhost:8000".to_string()),
//!     ..Default::default()
//! })
//! .await?;
//!
//! let adapter = SpanStoreAdapter::open(Arc::new(store), SpanStoreConfig::default()).await?;
//! adapter
//!     .dependencies()
//!     .record_call("frontend", "GET /", "trace-id", "span-id")
//!     .await?;
//! adapter.shutdown();
//! ```

pub mod dynamodb;
pub mod error;

pub use dynamodb::{DynamoDbConfig, DynamoDbTableStore};
pub use error::{AwsStoreError, Result};
