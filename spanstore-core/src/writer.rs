//! Dependency record persistence
//!
//! [`DependencyWriter`] turns dependency records into store items, stamps
//! them with an expiry attribute (now + ttl, epoch seconds) and upserts them.
//! There is no merge: a write fully replaces any item with the same key.

use crate::clock::Clock;
use crate::error::Result;
use crate::item::{to_item, AttrValue};
use crate::store::TableStore;
use crate::tables::TTL_ATTRIBUTE;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// A service exposing an operation
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyFact {
    #[serde(rename = "name")]
    pub service: String,
    pub operation: String,
}

impl DependencyFact {
    pub fn new(service: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
        }
    }
}

/// A service calling another service
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub parent_service: String,
    pub child_service: String,
}

/// Writes dependency facts and edges with a fixed retention
#[derive(Debug, Clone)]
pub struct DependencyWriter {
    store: Arc<dyn TableStore>,
    service_table: String,
    dependency_table: String,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl DependencyWriter {
    /// `service_table` and `dependency_table` are physical table names
    pub fn new(
        store: Arc<dyn TableStore>,
        service_table: impl Into<String>,
        dependency_table: impl Into<String>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            service_table: service_table.into(),
            dependency_table: dependency_table.into(),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Expiry stamp for a record written now
    pub fn expires_at(&self) -> u64 {
        self.clock.epoch_secs().saturating_add(self.ttl.as_secs())
    }

    /// Upsert a (service, operation) fact into the service table
    pub async fn write_fact(&self, fact: &DependencyFact) -> Result<()> {
        self.write(&self.service_table, fact).await
    }

    /// Upsert a caller/callee edge into the dependency table
    pub async fn write_edge(&self, edge: &DependencyEdge) -> Result<()> {
        self.write(&self.dependency_table, edge).await
    }

    async fn write<T: Serialize>(&self, table: &str, record: &T) -> Result<()> {
        let mut item = to_item(record)?;
        item.insert(
            TTL_ATTRIBUTE.to_string(),
            AttrValue::N(self.expires_at().to_string()),
        );
        self.store.put_item(table, item).await
    }
}
