//! Backing store capability
//!
//! [`TableStore`] is the narrow slice of a managed key-value store that the
//! reconciler and the dependency writer need: table listing and description,
//! table and index creation, TTL configuration, and single-item upserts.
//!
//! # Implementations
//!
//! - [`MemoryTableStore`](crate::memory::MemoryTableStore): in-memory fake with
//!   simulated asynchronous provisioning, for tests
//! - `DynamoDbTableStore` in the `spanstore-aws` crate

use crate::error::Result;
use crate::item::Item;
use crate::schema::ScalarType;
use async_trait::async_trait;
use std::fmt::Debug;

/// Role of an attribute inside a key schema
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyType {
    /// Partition key
    Hash,
    /// Sort key
    Range,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeySchemaElement {
    pub attribute_name: String,
    pub key_type: KeyType,
}

impl KeySchemaElement {
    pub fn hash(name: impl Into<String>) -> Self {
        Self {
            attribute_name: name.into(),
            key_type: KeyType::Hash,
        }
    }

    pub fn range(name: impl Into<String>) -> Self {
        Self {
            attribute_name: name.into(),
            key_type: KeyType::Range,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeDefinition {
    pub attribute_name: String,
    pub attribute_type: ScalarType,
}

impl AttributeDefinition {
    pub fn new(name: impl Into<String>, attribute_type: ScalarType) -> Self {
        Self {
            attribute_name: name.into(),
            attribute_type,
        }
    }
}

/// Table creation request. Capacity mode is always on-demand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateTable {
    pub table_name: String,
    pub key_schema: Vec<KeySchemaElement>,
    pub attribute_definitions: Vec<AttributeDefinition>,
}

/// New global secondary index, projecting all attributes
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateIndex {
    pub index_name: String,
    pub key_schema: Vec<KeySchemaElement>,
}

/// Single combined table update adding indexes and the attribute
/// definitions their keys need
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddIndexes {
    pub table_name: String,
    pub attribute_definitions: Vec<AttributeDefinition>,
    pub indexes: Vec<CreateIndex>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableStatus {
    Creating,
    Updating,
    Active,
    Deleting,
    /// Any status this crate does not model (archiving, inaccessible, ...)
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexStatus {
    Creating,
    Updating,
    Active,
    Deleting,
    Other,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexDescription {
    pub name: String,
    pub status: IndexStatus,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableDescription {
    pub name: String,
    pub status: TableStatus,
    pub indexes: Vec<IndexDescription>,
}

impl TableDescription {
    /// True if any global secondary index is still being created
    pub fn has_creating_index(&self) -> bool {
        self.indexes
            .iter()
            .any(|i| i.status == IndexStatus::Creating)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtlStatus {
    Enabling,
    Disabling,
    Enabled,
    Disabled,
    /// Reported by the backend but not recognised
    Unknown,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TtlDescription {
    pub status: TtlStatus,
    pub attribute_name: Option<String>,
}

/// One page of table names
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TablePage {
    pub table_names: Vec<String>,
    /// Start name for the next page; `None` once listing is exhausted
    pub last_evaluated: Option<String>,
}

/// Operations the reconciler and dependency writer consume from the store.
///
/// All failures are reported as [`SpanStoreError::Store`](crate::SpanStoreError::Store)
/// carrying the operation and table name.
#[async_trait]
pub trait TableStore: Debug + Send + Sync {
    /// List one page of physical table names starting after `start`
    async fn list_tables(&self, start: Option<String>) -> Result<TablePage>;

    async fn describe_table(&self, table_name: &str) -> Result<TableDescription>;

    async fn create_table(&self, request: CreateTable) -> Result<()>;

    async fn add_indexes(&self, request: AddIndexes) -> Result<()>;

    /// Current TTL configuration, `None` when the store reports none
    async fn describe_ttl(&self, table_name: &str) -> Result<Option<TtlDescription>>;

    /// Enable TTL on `attribute_name`
    async fn enable_ttl(&self, table_name: &str, attribute_name: &str) -> Result<()>;

    /// Upsert an item. An existing item with the same key is fully replaced.
    async fn put_item(&self, table_name: &str, item: Item) -> Result<()>;
}

/// Drain a paginated table listing into a single vector
pub async fn list_all_tables(store: &dyn TableStore) -> Result<Vec<String>> {
    let mut names = Vec::new();
    let mut start = None;
    loop {
        let page = store.list_tables(start.take()).await?;
        names.extend(page.table_names);
        match page.last_evaluated {
            Some(next) => start = Some(next),
            None => break,
        }
    }
    Ok(names)
}
