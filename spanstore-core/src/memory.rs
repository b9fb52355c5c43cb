//! In-memory table store for testing
//!
//! Simulates the asynchronous provisioning model of a managed store: new
//! tables and indexes report `Creating` for a configurable number of
//! describe calls before turning `Active`. Every call is recorded so tests
//! can assert which operations a run issued, and one-shot failures can be
//! injected per operation.
//!
//! State lives behind `Arc<RwLock>` so clones share the same tables and the
//! store can be used from multi-threaded runtimes.

use crate::error::{Result, SpanStoreError};
use crate::item::{AttrValue, Item};
use crate::store::{
    AddIndexes, AttributeDefinition, CreateTable, IndexDescription, IndexStatus,
    KeySchemaElement, TableDescription, TablePage, TableStatus, TableStore, TtlDescription,
    TtlStatus,
};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Store operation, used for failure injection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StoreOp {
    ListTables,
    DescribeTable,
    CreateTable,
    AddIndexes,
    DescribeTtl,
    EnableTtl,
    PutItem,
}

/// A recorded call against the store
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StoreCall {
    ListTables,
    DescribeTable(String),
    CreateTable(String),
    AddIndexes { table: String, indexes: Vec<String> },
    DescribeTtl(String),
    EnableTtl { table: String, attribute: String },
    PutItem(String),
}

impl StoreCall {
    /// Whether the call changes store state
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            StoreCall::CreateTable(_)
                | StoreCall::AddIndexes { .. }
                | StoreCall::EnableTtl { .. }
                | StoreCall::PutItem(_)
        )
    }
}

#[derive(Debug, Clone)]
struct MemIndex {
    name: String,
    key_schema: Vec<KeySchemaElement>,
    pending_polls: u32,
}

#[derive(Debug, Clone)]
struct MemTable {
    key_schema: Vec<KeySchemaElement>,
    attribute_definitions: Vec<AttributeDefinition>,
    pending_polls: u32,
    indexes: Vec<MemIndex>,
    ttl: Option<TtlDescription>,
    items: HashMap<Vec<String>, Item>,
}

impl MemTable {
    fn status(&self) -> TableStatus {
        if self.pending_polls > 0 {
            TableStatus::Creating
        } else {
            TableStatus::Active
        }
    }

    fn define(&mut self, defs: &[AttributeDefinition]) -> std::result::Result<(), String> {
        for def in defs {
            match self
                .attribute_definitions
                .iter()
                .find(|d| d.attribute_name == def.attribute_name)
            {
                Some(existing) if existing.attribute_type != def.attribute_type => {
                    return Err(format!(
                        "attribute '{}' is already defined as {}",
                        def.attribute_name, existing.attribute_type
                    ));
                }
                Some(_) => {}
                None => self.attribute_definitions.push(def.clone()),
            }
        }
        Ok(())
    }

    fn is_defined(&self, name: &str) -> bool {
        self.attribute_definitions
            .iter()
            .any(|d| d.attribute_name == name)
    }
}

/// Provisioning delays for new tables and indexes, counted in describe calls
#[derive(Debug, Clone, Copy, Default)]
pub struct ActivationPolls {
    pub table: u32,
    pub index: u32,
}

/// In-memory table store for testing
#[derive(Clone)]
pub struct MemoryTableStore {
    tables: Arc<RwLock<BTreeMap<String, MemTable>>>,
    calls: Arc<Mutex<Vec<StoreCall>>>,
    failures: Arc<Mutex<HashSet<StoreOp>>>,
    activation: Arc<RwLock<ActivationPolls>>,
    page_size: usize,
    put_delay: Arc<RwLock<Option<Duration>>>,
}

impl Default for MemoryTableStore {
    fn default() -> Self {
        Self {
            tables: Arc::new(RwLock::new(BTreeMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(HashSet::new())),
            activation: Arc::new(RwLock::new(ActivationPolls::default())),
            page_size: 100,
            put_delay: Arc::new(RwLock::new(None)),
        }
    }
}

impl Debug for MemoryTableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTableStore")
            .field("table_count", &self.tables.read().len())
            .field("call_count", &self.calls.lock().len())
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl MemoryTableStore {
    /// Create an empty store where new tables and indexes are active immediately
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of table names returned per `list_tables` page
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Tables and indexes created from now on stay `Creating` for this many
    /// describe calls
    pub fn with_activation_polls(self, table: u32, index: u32) -> Self {
        *self.activation.write() = ActivationPolls { table, index };
        self
    }

    /// Delay every `put_item` by `delay`, simulating a slow network write
    pub fn set_put_delay(&self, delay: Option<Duration>) {
        *self.put_delay.write() = delay;
    }

    /// Make the next call of `op` fail with a store error
    pub fn fail_next(&self, op: StoreOp) {
        self.failures.lock().insert(op);
    }

    /// Seed a table that already exists, e.g. one left behind by a crashed run
    pub fn insert_table(&self, request: CreateTable) {
        self.tables.write().insert(
            request.table_name,
            MemTable {
                key_schema: request.key_schema,
                attribute_definitions: request.attribute_definitions,
                pending_polls: 0,
                indexes: Vec::new(),
                ttl: None,
                items: HashMap::new(),
            },
        );
    }

    /// Seed an index on an existing table that stays `Creating` for
    /// `pending_polls` describe calls
    pub fn insert_index(
        &self,
        table_name: &str,
        index_name: &str,
        key_schema: Vec<KeySchemaElement>,
        pending_polls: u32,
    ) {
        if let Some(table) = self.tables.write().get_mut(table_name) {
            table.indexes.push(MemIndex {
                name: index_name.to_string(),
                key_schema,
                pending_polls,
            });
        }
    }

    /// All recorded calls in order
    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.lock().clone()
    }

    /// Recorded calls that changed store state
    pub fn mutating_calls(&self) -> Vec<StoreCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.is_mutation())
            .cloned()
            .collect()
    }

    /// Number of `put_item` calls against `table_name`
    pub fn put_count(&self, table_name: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, StoreCall::PutItem(t) if t == table_name))
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Physical names of all tables
    pub fn table_names(&self) -> Vec<String> {
        self.tables.read().keys().cloned().collect()
    }

    /// Describe a table without recording a call or advancing provisioning
    pub fn peek_table(&self, table_name: &str) -> Option<TableDescription> {
        self.tables
            .read()
            .get(table_name)
            .map(|t| Self::describe(table_name, t))
    }

    /// Key schema of a table or of one of its indexes
    pub fn key_schema(&self, table_name: &str, index: Option<&str>) -> Option<Vec<KeySchemaElement>> {
        let tables = self.tables.read();
        let table = tables.get(table_name)?;
        match index {
            None => Some(table.key_schema.clone()),
            Some(name) => table
                .indexes
                .iter()
                .find(|i| i.name == name)
                .map(|i| i.key_schema.clone()),
        }
    }

    /// Current TTL configuration without recording a call
    pub fn peek_ttl(&self, table_name: &str) -> Option<TtlDescription> {
        self.tables.read().get(table_name)?.ttl.clone()
    }

    /// Overwrite a table's TTL configuration without recording a call
    pub fn set_ttl(&self, table_name: &str, ttl: TtlDescription) {
        if let Some(table) = self.tables.write().get_mut(table_name) {
            table.ttl = Some(ttl);
        }
    }

    /// All items stored in a table
    pub fn items(&self, table_name: &str) -> Vec<Item> {
        self.tables
            .read()
            .get(table_name)
            .map(|t| t.items.values().cloned().collect())
            .unwrap_or_default()
    }

    fn record(&self, call: StoreCall) {
        self.calls.lock().push(call);
    }

    fn check_failure(&self, op: StoreOp, target: &str) -> Result<()> {
        if self.failures.lock().remove(&op) {
            return Err(SpanStoreError::store(
                op_name(op),
                target,
                "injected failure",
            ));
        }
        Ok(())
    }

    fn describe(name: &str, table: &MemTable) -> TableDescription {
        TableDescription {
            name: name.to_string(),
            status: table.status(),
            indexes: table
                .indexes
                .iter()
                .map(|i| IndexDescription {
                    name: i.name.clone(),
                    status: if i.pending_polls > 0 {
                        IndexStatus::Creating
                    } else {
                        IndexStatus::Active
                    },
                })
                .collect(),
        }
    }
}

fn op_name(op: StoreOp) -> &'static str {
    match op {
        StoreOp::ListTables => "ListTables",
        StoreOp::DescribeTable => "DescribeTable",
        StoreOp::CreateTable => "CreateTable",
        StoreOp::AddIndexes => "UpdateTable",
        StoreOp::DescribeTtl => "DescribeTimeToLive",
        StoreOp::EnableTtl => "UpdateTimeToLive",
        StoreOp::PutItem => "PutItem",
    }
}

fn not_found(op: StoreOp, table_name: &str) -> SpanStoreError {
    SpanStoreError::store(
        op_name(op),
        table_name,
        "ResourceNotFoundException: table does not exist",
    )
}

fn check_key_schema(
    key_schema: &[KeySchemaElement],
    defined: impl Fn(&str) -> bool,
) -> std::result::Result<(), String> {
    if key_schema.is_empty() || key_schema.len() > 2 {
        return Err(format!("key schema must have 1 or 2 elements, got {}", key_schema.len()));
    }
    for element in key_schema {
        if !defined(&element.attribute_name) {
            return Err(format!(
                "key attribute '{}' has no attribute definition",
                element.attribute_name
            ));
        }
    }
    Ok(())
}

#[async_trait]
impl TableStore for MemoryTableStore {
    async fn list_tables(&self, start: Option<String>) -> Result<TablePage> {
        self.record(StoreCall::ListTables);
        self.check_failure(StoreOp::ListTables, "*")?;

        let tables = self.tables.read();
        let names: Vec<String> = match &start {
            Some(after) => tables
                .keys()
                .filter(|k| k.as_str() > after.as_str())
                .take(self.page_size)
                .cloned()
                .collect(),
            None => tables.keys().take(self.page_size).cloned().collect(),
        };
        let last_evaluated = match names.last() {
            Some(last) if tables.keys().any(|k| k > last) => Some(last.clone()),
            _ => None,
        };
        Ok(TablePage {
            table_names: names,
            last_evaluated,
        })
    }

    async fn describe_table(&self, table_name: &str) -> Result<TableDescription> {
        self.record(StoreCall::DescribeTable(table_name.to_string()));
        self.check_failure(StoreOp::DescribeTable, table_name)?;

        let mut tables = self.tables.write();
        let table = tables
            .get_mut(table_name)
            .ok_or_else(|| not_found(StoreOp::DescribeTable, table_name))?;
        let description = Self::describe(table_name, table);

        // Provisioning advances one step per observation
        table.pending_polls = table.pending_polls.saturating_sub(1);
        for index in &mut table.indexes {
            index.pending_polls = index.pending_polls.saturating_sub(1);
        }
        Ok(description)
    }

    async fn create_table(&self, request: CreateTable) -> Result<()> {
        self.record(StoreCall::CreateTable(request.table_name.clone()));
        self.check_failure(StoreOp::CreateTable, &request.table_name)?;

        let mut tables = self.tables.write();
        if tables.contains_key(&request.table_name) {
            return Err(SpanStoreError::store(
                "CreateTable",
                &request.table_name,
                "ResourceInUseException: table already exists",
            ));
        }
        check_key_schema(&request.key_schema, |name| {
            request
                .attribute_definitions
                .iter()
                .any(|d| d.attribute_name == name)
        })
        .map_err(|msg| SpanStoreError::store("CreateTable", &request.table_name, msg))?;

        let pending_polls = self.activation.read().table;
        tables.insert(
            request.table_name,
            MemTable {
                key_schema: request.key_schema,
                attribute_definitions: request.attribute_definitions,
                pending_polls,
                indexes: Vec::new(),
                ttl: None,
                items: HashMap::new(),
            },
        );
        Ok(())
    }

    async fn add_indexes(&self, request: AddIndexes) -> Result<()> {
        self.record(StoreCall::AddIndexes {
            table: request.table_name.clone(),
            indexes: request.indexes.iter().map(|i| i.index_name.clone()).collect(),
        });
        self.check_failure(StoreOp::AddIndexes, &request.table_name)?;

        let pending_polls = self.activation.read().index;
        let mut tables = self.tables.write();
        let table = tables
            .get_mut(&request.table_name)
            .ok_or_else(|| not_found(StoreOp::AddIndexes, &request.table_name))?;
        let fail = |msg: String| SpanStoreError::store("UpdateTable", &request.table_name, msg);

        if table.status() != TableStatus::Active {
            return Err(fail("ResourceInUseException: table is not active".to_string()));
        }

        // Validate the whole request before applying any of it
        let mut staged = table.clone();
        staged.define(&request.attribute_definitions).map_err(fail)?;
        for index in &request.indexes {
            if staged.indexes.iter().any(|i| i.name == index.index_name) {
                return Err(fail(format!("index '{}' already exists", index.index_name)));
            }
            check_key_schema(&index.key_schema, |name| staged.is_defined(name)).map_err(fail)?;
            staged.indexes.push(MemIndex {
                name: index.index_name.clone(),
                key_schema: index.key_schema.clone(),
                pending_polls,
            });
        }
        *table = staged;
        Ok(())
    }

    async fn describe_ttl(&self, table_name: &str) -> Result<Option<TtlDescription>> {
        self.record(StoreCall::DescribeTtl(table_name.to_string()));
        self.check_failure(StoreOp::DescribeTtl, table_name)?;

        let tables = self.tables.read();
        let table = tables
            .get(table_name)
            .ok_or_else(|| not_found(StoreOp::DescribeTtl, table_name))?;
        Ok(table.ttl.clone())
    }

    async fn enable_ttl(&self, table_name: &str, attribute_name: &str) -> Result<()> {
        self.record(StoreCall::EnableTtl {
            table: table_name.to_string(),
            attribute: attribute_name.to_string(),
        });
        self.check_failure(StoreOp::EnableTtl, table_name)?;

        let mut tables = self.tables.write();
        let table = tables
            .get_mut(table_name)
            .ok_or_else(|| not_found(StoreOp::EnableTtl, table_name))?;
        if matches!(
            table.ttl.as_ref().map(|t| t.status),
            Some(TtlStatus::Enabled | TtlStatus::Enabling)
        ) {
            return Err(SpanStoreError::store(
                "UpdateTimeToLive",
                table_name,
                "ValidationException: TimeToLive is already enabled",
            ));
        }
        table.ttl = Some(TtlDescription {
            status: TtlStatus::Enabled,
            attribute_name: Some(attribute_name.to_string()),
        });
        Ok(())
    }

    async fn put_item(&self, table_name: &str, item: Item) -> Result<()> {
        self.record(StoreCall::PutItem(table_name.to_string()));
        let delay = *self.put_delay.read();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_failure(StoreOp::PutItem, table_name)?;

        let mut tables = self.tables.write();
        let table = tables
            .get_mut(table_name)
            .ok_or_else(|| not_found(StoreOp::PutItem, table_name))?;

        let mut key = Vec::with_capacity(table.key_schema.len());
        for element in &table.key_schema {
            let value = match item.get(&element.attribute_name) {
                Some(AttrValue::S(s)) | Some(AttrValue::N(s)) => s.clone(),
                _ => {
                    return Err(SpanStoreError::store(
                        "PutItem",
                        table_name,
                        format!(
                            "ValidationException: missing key attribute '{}'",
                            element.attribute_name
                        ),
                    ))
                }
            };
            key.push(value);
        }
        table.items.insert(key, item);
        Ok(())
    }
}
