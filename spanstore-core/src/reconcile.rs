//! Schema reconciliation
//!
//! [`SchemaReconciler`] converges the store's tables to a declared set of
//! [`TableSpec`]s by applying only what is missing:
//!
//! 1. list every table (all pages) and recover logical names
//! 2. create missing tables (on-demand capacity) and wait for them to become
//!    active
//! 3. add missing global secondary indexes in one combined update
//! 4. wait until no index is `Creating`, even if nothing was added this run,
//!    so a restart in the middle of a previous wait still converges
//! 5. enable TTL on the declared attribute when it is disabled or absent
//!
//! Every step is fail-fast and nothing is rolled back: steps that already
//! succeeded left durable state behind, and running the reconciler again is
//! the recovery path. A run against a converged store issues only list and
//! describe calls.

use crate::error::{Result, SpanStoreError};
use crate::naming::TableNaming;
use crate::schema::{validate_specs, KeyAttribute, TableSpec};
use crate::store::{
    list_all_tables, AddIndexes, AttributeDefinition, CreateIndex, CreateTable,
    KeySchemaElement, TableStatus, TableStore, TtlDescription, TtlStatus,
};
use crate::wait::{wait_until, Cancellation, WaitPolicy};
use std::collections::HashSet;
use std::sync::Arc;

/// What a reconciliation run changed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Physical names of tables created by this run
    pub created_tables: Vec<String>,
    /// `(physical table, index)` pairs added by this run
    pub added_indexes: Vec<(String, String)>,
    /// Physical names of tables whose TTL was enabled by this run
    pub ttl_enabled: Vec<String>,
}

impl ReconcileReport {
    /// True if the run issued no mutating calls
    pub fn is_noop(&self) -> bool {
        self.created_tables.is_empty() && self.added_indexes.is_empty() && self.ttl_enabled.is_empty()
    }
}

/// Converges declared table specs against a [`TableStore`]
#[derive(Debug, Clone)]
pub struct SchemaReconciler {
    store: Arc<dyn TableStore>,
    naming: TableNaming,
    table_wait: WaitPolicy,
    index_wait: WaitPolicy,
}

impl SchemaReconciler {
    pub fn new(store: Arc<dyn TableStore>, naming: TableNaming) -> Self {
        Self {
            store,
            naming,
            table_wait: WaitPolicy::table_default(),
            index_wait: WaitPolicy::index_default(),
        }
    }

    pub fn with_table_wait(mut self, policy: WaitPolicy) -> Self {
        self.table_wait = policy;
        self
    }

    pub fn with_index_wait(mut self, policy: WaitPolicy) -> Self {
        self.index_wait = policy;
        self
    }

    pub fn naming(&self) -> &TableNaming {
        &self.naming
    }

    /// Reconcile without external cancellation
    pub async fn reconcile(&self, specs: &[TableSpec]) -> Result<ReconcileReport> {
        self.reconcile_with_cancel(specs, &Cancellation::never()).await
    }

    /// Reconcile; waits end early with [`SpanStoreError::Cancelled`] once
    /// `cancel` fires.
    pub async fn reconcile_with_cancel(
        &self,
        specs: &[TableSpec],
        cancel: &Cancellation,
    ) -> Result<ReconcileReport> {
        validate_specs(specs)?;

        tracing::info!("Describing tables");
        let existing: HashSet<String> = list_all_tables(self.store.as_ref())
            .await?
            .iter()
            .filter_map(|name| self.naming.trim(name))
            .map(str::to_string)
            .collect();

        let mut report = ReconcileReport::default();
        for spec in specs {
            let table_name = self.naming.decorate(&spec.name);

            if existing.contains(&spec.name) {
                tracing::debug!(table = %table_name, "Table exists");
            } else {
                self.create_table(spec, &table_name).await?;
                report.created_tables.push(table_name.clone());
            }
            self.wait_for_table(&table_name, cancel).await?;

            for index in self.ensure_indexes(spec, &table_name, cancel).await? {
                report.added_indexes.push((table_name.clone(), index));
            }
            if self.ensure_ttl(spec, &table_name).await? {
                report.ttl_enabled.push(table_name);
            }
        }

        tracing::info!(
            created_tables = report.created_tables.len(),
            added_indexes = report.added_indexes.len(),
            ttl_enabled = report.ttl_enabled.len(),
            "All tables are ready"
        );
        Ok(report)
    }

    async fn create_table(&self, spec: &TableSpec, table_name: &str) -> Result<()> {
        tracing::info!(table = %table_name, "Creating table");

        let mut key_schema = vec![KeySchemaElement::hash(&spec.partition_key.name)];
        if let Some(sort) = &spec.sort_key {
            key_schema.push(KeySchemaElement::range(&sort.name));
        }
        let mut attribute_definitions = Vec::new();
        push_definitions(&mut attribute_definitions, spec.key_attributes());

        self.store
            .create_table(CreateTable {
                table_name: table_name.to_string(),
                key_schema,
                attribute_definitions,
            })
            .await
    }

    async fn wait_for_table(&self, table_name: &str, cancel: &Cancellation) -> Result<()> {
        let what = format!("table {} to become active", table_name);
        let store = &self.store;
        wait_until(&what, self.table_wait, cancel, move || async move {
            let description = store.describe_table(table_name).await?;
            match description.status {
                TableStatus::Active => Ok(true),
                TableStatus::Deleting => Err(SpanStoreError::store(
                    "DescribeTable",
                    table_name,
                    "table is being deleted",
                )),
                _ => Ok(false),
            }
        })
        .await
    }

    /// Add missing indexes and wait until none is being created. Returns
    /// the names of the indexes this call added.
    async fn ensure_indexes(
        &self,
        spec: &TableSpec,
        table_name: &str,
        cancel: &Cancellation,
    ) -> Result<Vec<String>> {
        if spec.indexes.is_empty() {
            return Ok(Vec::new());
        }
        tracing::debug!(table = %table_name, "Checking the table's indexes");

        let description = self.store.describe_table(table_name).await?;
        let present: HashSet<&str> = description.indexes.iter().map(|i| i.name.as_str()).collect();

        let mut attribute_definitions = Vec::new();
        let mut indexes = Vec::new();
        for index in &spec.indexes {
            if present.contains(index.name.as_str()) {
                tracing::debug!(table = %table_name, index = %index.name, "Index exists");
                continue;
            }
            tracing::info!(table = %table_name, index = %index.name, "Index will be created");

            let mut key_schema = vec![KeySchemaElement::hash(&index.partition_key.name)];
            if let Some(sort) = &index.sort_key {
                key_schema.push(KeySchemaElement::range(&sort.name));
            }
            push_definitions(&mut attribute_definitions, index.key_attributes());
            indexes.push(CreateIndex {
                index_name: index.name.clone(),
                key_schema,
            });
        }

        let added: Vec<String> = indexes.iter().map(|i| i.index_name.clone()).collect();
        if !indexes.is_empty() {
            tracing::info!(table = %table_name, count = indexes.len(), "Creating the missing indexes");
            self.store
                .add_indexes(AddIndexes {
                    table_name: table_name.to_string(),
                    attribute_definitions,
                    indexes,
                })
                .await?;
        }

        // Also waits when nothing was added: a previous run may have been
        // interrupted after issuing the update.
        let what = format!("indexes on table {} to become active", table_name);
        let store = &self.store;
        wait_until(&what, self.index_wait, cancel, move || async move {
            let description = store.describe_table(table_name).await?;
            Ok(!description.has_creating_index())
        })
        .await?;

        tracing::info!(table = %table_name, "Indexes are ready");
        Ok(added)
    }

    /// Enable TTL if declared and currently off. Returns `true` if enabled
    /// by this call.
    async fn ensure_ttl(&self, spec: &TableSpec, table_name: &str) -> Result<bool> {
        let Some(attribute) = spec.ttl() else {
            return Ok(false);
        };

        match self.store.describe_ttl(table_name).await? {
            None
            | Some(TtlDescription {
                status: TtlStatus::Disabled,
                ..
            }) => {
                tracing::info!(table = %table_name, ttl_attribute = attribute, "Enabling TTL");
                self.store.enable_ttl(table_name, attribute).await?;
                Ok(true)
            }
            Some(TtlDescription {
                status: TtlStatus::Disabling,
                ..
            }) => {
                tracing::warn!(
                    table = %table_name,
                    ttl_attribute = attribute,
                    "TTL is being disabled, leaving it for the next run"
                );
                Ok(false)
            }
            Some(TtlDescription {
                status: TtlStatus::Unknown,
                ..
            }) => {
                tracing::warn!(
                    table = %table_name,
                    ttl_attribute = attribute,
                    "TTL status is not recognised, leaving it unchanged"
                );
                Ok(false)
            }
            Some(current) if current.attribute_name.as_deref() == Some(attribute) => {
                tracing::debug!(
                    table = %table_name,
                    ttl_attribute = attribute,
                    status = ?current.status,
                    "TTL is up-to-date"
                );
                Ok(false)
            }
            Some(current) => {
                tracing::warn!(
                    table = %table_name,
                    ttl_attribute = attribute,
                    configured = ?current.attribute_name,
                    "TTL is enabled on a different attribute"
                );
                Ok(false)
            }
        }
    }
}

/// Append definitions for `attrs`, skipping names already present
fn push_definitions<'a>(
    defs: &mut Vec<AttributeDefinition>,
    attrs: impl Iterator<Item = &'a KeyAttribute>,
) {
    for attr in attrs {
        if !defs.iter().any(|d| d.attribute_name == attr.name) {
            defs.push(AttributeDefinition::new(&attr.name, attr.scalar));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryTableStore, StoreCall, StoreOp};
    use crate::schema::{ScalarType, SecondaryIndexSpec};
    use std::time::Duration;

    fn fast() -> WaitPolicy {
        WaitPolicy::new(Duration::from_millis(10), Duration::from_secs(1))
    }

    fn reconciler(store: &MemoryTableStore, naming: TableNaming) -> SchemaReconciler {
        SchemaReconciler::new(Arc::new(store.clone()), naming)
            .with_table_wait(fast())
            .with_index_wait(fast())
    }

    fn svc_spec() -> TableSpec {
        TableSpec::new("svc", KeyAttribute::string("parent"))
            .with_sort_key(KeyAttribute::string("child"))
            .with_ttl("ttl")
            .with_index(SecondaryIndexSpec::new("by-child", KeyAttribute::string("child")))
    }

    #[tokio::test(start_paused = true)]
    async fn test_creates_missing_table_with_keys() {
        let store = MemoryTableStore::new().with_activation_polls(2, 2);
        let report = reconciler(&store, TableNaming::new("pre_", "_suf"))
            .reconcile(&[svc_spec()])
            .await
            .unwrap();

        assert_eq!(report.created_tables, vec!["pre_svc_suf"]);
        assert_eq!(
            report.added_indexes,
            vec![("pre_svc_suf".to_string(), "by-child".to_string())]
        );
        assert_eq!(report.ttl_enabled, vec!["pre_svc_suf"]);

        assert_eq!(
            store.key_schema("pre_svc_suf", None).unwrap(),
            vec![KeySchemaElement::hash("parent"), KeySchemaElement::range("child")]
        );
        assert_eq!(
            store.key_schema("pre_svc_suf", Some("by-child")).unwrap(),
            vec![KeySchemaElement::hash("child")]
        );
        let table = store.peek_table("pre_svc_suf").unwrap();
        assert_eq!(table.status, TableStatus::Active);
        assert!(!table.has_creating_index());
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_spec_issues_no_calls() {
        let store = MemoryTableStore::new();
        let bad = TableSpec::new("svc", KeyAttribute::string(""));

        let err = reconciler(&store, TableNaming::default())
            .reconcile(&[svc_spec(), bad])
            .await
            .unwrap_err();

        assert!(matches!(err, SpanStoreError::Config(_)));
        assert!(store.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignores_tables_outside_naming() {
        let store = MemoryTableStore::new();
        // Same logical name without the suffix belongs to someone else
        store.insert_table(CreateTable {
            table_name: "svc".to_string(),
            key_schema: vec![KeySchemaElement::hash("parent")],
            attribute_definitions: vec![AttributeDefinition::new("parent", ScalarType::String)],
        });

        let report = reconciler(&store, TableNaming::new("", "-dev"))
            .reconcile(&[svc_spec()])
            .await
            .unwrap();

        assert_eq!(report.created_tables, vec!["svc-dev"]);
        assert!(store.peek_table("svc").unwrap().indexes.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_adds_all_missing_indexes_in_one_update() {
        let store = MemoryTableStore::new();
        let spec = svc_spec().with_index(
            SecondaryIndexSpec::new("by-parent-time", KeyAttribute::string("parent"))
                .with_sort_key(KeyAttribute::number("start")),
        );

        reconciler(&store, TableNaming::default())
            .reconcile(&[spec])
            .await
            .unwrap();

        let updates: Vec<_> = store
            .calls()
            .into_iter()
            .filter(|c| matches!(c, StoreCall::AddIndexes { .. }))
            .collect();
        assert_eq!(
            updates,
            vec![StoreCall::AddIndexes {
                table: "svc".to_string(),
                indexes: vec!["by-child".to_string(), "by-parent-time".to_string()],
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_index_left_creating_by_previous_run() {
        let store = MemoryTableStore::new();
        reconciler(&store, TableNaming::default())
            .reconcile(&[TableSpec::new("svc", KeyAttribute::string("parent"))
                .with_sort_key(KeyAttribute::string("child"))])
            .await
            .unwrap();
        // Simulate a crash right after the index update was issued
        store.insert_index("svc", "by-child", vec![KeySchemaElement::hash("child")], 3);
        store.clear_calls();

        let report = reconciler(&store, TableNaming::default())
            .reconcile(&[svc_spec()])
            .await
            .unwrap();

        assert!(report.added_indexes.is_empty());
        assert!(!store.peek_table("svc").unwrap().has_creating_index());
        let describes = store
            .calls()
            .iter()
            .filter(|c| matches!(c, StoreCall::DescribeTable(_)))
            .count();
        assert!(describes >= 4, "expected repeated polling, got {describes}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_table_activation_timeout() {
        let store = MemoryTableStore::new().with_activation_polls(u32::MAX, 0);
        let err = reconciler(&store, TableNaming::default())
            .reconcile(&[svc_spec()])
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(err.to_string().contains("svc"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_index_activation_timeout() {
        let store = MemoryTableStore::new().with_activation_polls(0, u32::MAX);
        let err = reconciler(&store, TableNaming::default())
            .reconcile(&[svc_spec()])
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        // TTL step never ran
        assert!(store.peek_ttl("svc").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_wait_reports_cancellation() {
        let store = MemoryTableStore::new().with_activation_polls(u32::MAX, 0);
        let (canceller, cancel) = Cancellation::pair();
        canceller.cancel();

        let err = reconciler(&store, TableNaming::default())
            .reconcile_with_cancel(&[svc_spec()], &cancel)
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_failure_aborts_without_rollback() {
        let store = MemoryTableStore::new();
        store.fail_next(StoreOp::EnableTtl);

        let err = reconciler(&store, TableNaming::default())
            .reconcile(&[svc_spec()])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SpanStoreError::Store {
                operation: "UpdateTimeToLive",
                ..
            }
        ));
        // Table and index stay in place; a rerun finishes the job
        assert!(store.peek_table("svc").is_some());

        let report = reconciler(&store, TableNaming::default())
            .reconcile(&[svc_spec()])
            .await
            .unwrap();
        assert!(report.created_tables.is_empty());
        assert_eq!(report.ttl_enabled, vec!["svc"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_skipped_without_attribute() {
        let store = MemoryTableStore::new();
        let spec = TableSpec::new("blobs", KeyAttribute::string("blob_id"));

        reconciler(&store, TableNaming::default())
            .reconcile(&[spec])
            .await
            .unwrap();

        assert!(!store
            .calls()
            .iter()
            .any(|c| matches!(c, StoreCall::DescribeTtl(_) | StoreCall::EnableTtl { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_in_transition_or_unrecognised_left_alone() {
        for status in [TtlStatus::Disabling, TtlStatus::Unknown] {
            let store = MemoryTableStore::new();
            let bare = TableSpec::new("svc", KeyAttribute::string("parent"))
                .with_sort_key(KeyAttribute::string("child"))
                .with_index(SecondaryIndexSpec::new("by-child", KeyAttribute::string("child")));
            reconciler(&store, TableNaming::default())
                .reconcile(&[bare])
                .await
                .unwrap();
            store.set_ttl(
                "svc",
                TtlDescription {
                    status,
                    attribute_name: None,
                },
            );
            store.clear_calls();

            let report = reconciler(&store, TableNaming::default())
                .reconcile(&[svc_spec()])
                .await
                .unwrap();

            assert!(report.ttl_enabled.is_empty(), "{status:?}");
            assert!(store.mutating_calls().is_empty(), "{status:?}");
            assert_eq!(store.peek_ttl("svc").unwrap().status, status);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_on_other_attribute_left_alone() {
        let store = MemoryTableStore::new();
        let other = TableSpec::new("svc", KeyAttribute::string("parent"))
            .with_sort_key(KeyAttribute::string("child"))
            .with_ttl("expires");
        reconciler(&store, TableNaming::default())
            .reconcile(&[other])
            .await
            .unwrap();
        store.clear_calls();

        let report = reconciler(&store, TableNaming::default())
            .reconcile(&[svc_spec()])
            .await
            .unwrap();

        assert!(report.ttl_enabled.is_empty());
        assert_eq!(
            store.peek_ttl("svc").unwrap().attribute_name.as_deref(),
            Some("expires")
        );
    }
}
