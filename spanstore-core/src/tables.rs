//! Span store table declarations
//!
//! ```text
//! span        service_and_time (S) / span_id (S)        ttl
//!             by-time      service_and_time (S) / start_time_nanos (N)
//!             by-duration  service_and_time (S) / duration_nanos (N)
//! service     name (S) / operation (S)                  ttl
//! dependency  parent_service (S) / child_service (S)    ttl
//! ```
//!
//! Missing indexes are added in a single index update. DynamoDB accepts
//! only one index creation per `UpdateTable`, so against AWS a fresh `span`
//! table fails on that step; create its second index out of band (or
//! pre-provision the table) before opening the store.

use crate::config::SpanStoreConfig;
use crate::error::Result;
use crate::reconcile::{ReconcileReport, SchemaReconciler};
use crate::schema::{KeyAttribute, SecondaryIndexSpec, TableSpec};
use crate::store::TableStore;
use std::sync::Arc;

pub const SPAN_TABLE: &str = "span";
pub const SERVICE_TABLE: &str = "service";
pub const DEPENDENCY_TABLE: &str = "dependency";

/// Expiry attribute shared by every span store table
pub const TTL_ATTRIBUTE: &str = "ttl";

pub const ATTR_SERVICE_AND_TIME: &str = "service_and_time";
pub const ATTR_SPAN_ID: &str = "span_id";
pub const ATTR_START_TIME_NANOS: &str = "start_time_nanos";
pub const ATTR_DURATION_NANOS: &str = "duration_nanos";
pub const ATTR_SERVICE_NAME: &str = "name";
pub const ATTR_OPERATION: &str = "operation";
pub const ATTR_PARENT_SERVICE: &str = "parent_service";
pub const ATTR_CHILD_SERVICE: &str = "child_service";

pub const INDEX_BY_TIME: &str = "by-time";
pub const INDEX_BY_DURATION: &str = "by-duration";

/// The tables the span store needs, in creation order
pub fn spanstore_tables() -> Vec<TableSpec> {
    vec![
        TableSpec::new(SPAN_TABLE, KeyAttribute::string(ATTR_SERVICE_AND_TIME))
            .with_sort_key(KeyAttribute::string(ATTR_SPAN_ID))
            .with_ttl(TTL_ATTRIBUTE)
            .with_index(
                SecondaryIndexSpec::new(INDEX_BY_TIME, KeyAttribute::string(ATTR_SERVICE_AND_TIME))
                    .with_sort_key(KeyAttribute::number(ATTR_START_TIME_NANOS)),
            )
            .with_index(
                SecondaryIndexSpec::new(
                    INDEX_BY_DURATION,
                    KeyAttribute::string(ATTR_SERVICE_AND_TIME),
                )
                .with_sort_key(KeyAttribute::number(ATTR_DURATION_NANOS)),
            ),
        TableSpec::new(SERVICE_TABLE, KeyAttribute::string(ATTR_SERVICE_NAME))
            .with_sort_key(KeyAttribute::string(ATTR_OPERATION))
            .with_ttl(TTL_ATTRIBUTE),
        TableSpec::new(DEPENDENCY_TABLE, KeyAttribute::string(ATTR_PARENT_SERVICE))
            .with_sort_key(KeyAttribute::string(ATTR_CHILD_SERVICE))
            .with_ttl(TTL_ATTRIBUTE),
    ]
}

/// Reconcile the span store tables using the configured naming and waits
pub async fn ensure_tables_are_ready(
    store: Arc<dyn TableStore>,
    config: &SpanStoreConfig,
) -> Result<ReconcileReport> {
    tracing::info!("Ensuring tables are present");
    let report = SchemaReconciler::new(store, config.naming())
        .with_table_wait(config.table_wait_policy())
        .with_index_wait(config.index_wait_policy())
        .reconcile(&spanstore_tables())
        .await?;
    tracing::info!("Tables are ready");
    Ok(report)
}
