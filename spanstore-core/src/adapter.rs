//! Span store lifecycle
//!
//! [`SpanStoreAdapter::open`] is what a process calls before it accepts
//! ingestion traffic: it validates configuration, reconciles the schema
//! (when `create_tables` is set) and starts the dependency cache. A
//! reconciliation failure is returned to the caller, which is expected to
//! treat it as fatal.

use crate::clock::{Clock, SystemClock};
use crate::config::SpanStoreConfig;
use crate::dedup::DependencyDedupCache;
use crate::error::Result;
use crate::reconcile::ReconcileReport;
use crate::store::TableStore;
use crate::tables::{ensure_tables_are_ready, DEPENDENCY_TABLE, SERVICE_TABLE};
use crate::writer::DependencyWriter;
use std::sync::Arc;

#[derive(Debug)]
pub struct SpanStoreAdapter {
    config: SpanStoreConfig,
    store: Arc<dyn TableStore>,
    dependencies: Arc<DependencyDedupCache>,
    reconciled: Option<ReconcileReport>,
}

impl SpanStoreAdapter {
    pub async fn open(store: Arc<dyn TableStore>, config: SpanStoreConfig) -> Result<Self> {
        Self::open_with_clock(store, config, Arc::new(SystemClock)).await
    }

    /// Open with an explicit clock for record expiry and cache retention
    pub async fn open_with_clock(
        store: Arc<dyn TableStore>,
        config: SpanStoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let reconciled = if config.create_tables {
            Some(ensure_tables_are_ready(Arc::clone(&store), &config).await?)
        } else {
            tracing::info!("Table creation disabled, skipping schema reconciliation");
            None
        };

        let naming = config.naming();
        let writer = DependencyWriter::new(
            Arc::clone(&store),
            naming.decorate(SERVICE_TABLE),
            naming.decorate(DEPENDENCY_TABLE),
            config.dependency_ttl(),
            Arc::clone(&clock),
        );
        let dependencies = Arc::new(DependencyDedupCache::new(
            writer,
            config.dedup_settings(),
            clock,
        ));
        dependencies.start();

        tracing::info!(
            prefix = %config.table_prefix,
            suffix = %config.table_suffix,
            span_ttl = ?config.span_ttl(),
            dependency_ttl = ?config.dependency_ttl(),
            "Span store opened"
        );
        Ok(Self {
            config,
            store,
            dependencies,
            reconciled,
        })
    }

    pub fn config(&self) -> &SpanStoreConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn TableStore> {
        &self.store
    }

    /// The dependency cache used by the span write path
    pub fn dependencies(&self) -> &Arc<DependencyDedupCache> {
        &self.dependencies
    }

    /// Result of the startup reconciliation, if it ran
    pub fn reconcile_report(&self) -> Option<&ReconcileReport> {
        self.reconciled.as_ref()
    }

    /// Physical name of a logical table
    pub fn table_name(&self, logical: &str) -> String {
        self.config.naming().decorate(logical)
    }

    /// Stop background work. Idempotent.
    pub fn shutdown(&self) {
        self.dependencies.stop();
        tracing::info!("Span store shut down");
    }
}
