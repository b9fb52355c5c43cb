//! Schema reconciliation and dependency tracking for a DynamoDB-style span store
//!
//! This crate keeps a managed key-value store's tables converged with a
//! declared schema, and suppresses redundant writes of the "service exposes
//! operation" and "service calls service" facts derived from ingested spans.
//!
//! # Components
//!
//! - [`TableStore`]: the backing-store capability (list/describe/create
//!   tables, add indexes, TTL, upsert)
//! - [`SchemaReconciler`]: converges [`TableSpec`]s against a [`TableStore`]
//! - [`DependencyWriter`]: serializes dependency records with an expiry stamp
//! - [`DependencyDedupCache`]: windowed write suppression plus the
//!   call-identity cache used to resolve parent spans
//! - [`SpanStoreAdapter`]: startup/shutdown wrapper wiring the above together
//!
//! # Implementations
//!
//! - [`MemoryTableStore`]: in-memory store for testing, simulating
//!   asynchronous table and index provisioning
//! - `spanstore-aws`: Amazon DynamoDB

pub mod adapter;
pub mod cache;
pub mod clock;
pub mod config;
pub mod dedup;
mod error;
pub mod item;
pub mod memory;
pub mod naming;
pub mod reconcile;
pub mod schema;
pub mod store;
pub mod tables;
pub mod wait;
pub mod writer;

pub use adapter::SpanStoreAdapter;
pub use cache::{Eviction, FactCache, TimedCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{SpanStoreConfig, MAX_TTL_DAYS};
pub use dedup::{CallIdentity, DedupSettings, DependencyDedupCache, SpanCall};
pub use error::{Result, SpanStoreError};
pub use item::{to_item, AttrValue, Item};
pub use memory::{MemoryTableStore, StoreCall, StoreOp};
pub use naming::TableNaming;
pub use reconcile::{ReconcileReport, SchemaReconciler};
pub use schema::{validate_specs, KeyAttribute, ScalarType, SecondaryIndexSpec, TableSpec};
pub use store::{
    list_all_tables, AddIndexes, AttributeDefinition, CreateIndex, CreateTable,
    IndexDescription, IndexStatus, KeySchemaElement, KeyType, TableDescription, TablePage,
    TableStatus, TableStore, TtlDescription, TtlStatus,
};
pub use tables::{ensure_tables_are_ready, spanstore_tables};
pub use wait::{wait_until, Cancellation, Canceller, WaitConfig, WaitPolicy};
pub use writer::{DependencyEdge, DependencyFact, DependencyWriter};
