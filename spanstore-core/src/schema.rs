//! Declared table specifications
//!
//! A [`TableSpec`] describes the shape a table must converge to: its primary
//! key, an optional TTL attribute, and the global secondary indexes it must
//! carry. Specs are supplied once by configuration and never change while the
//! process runs.
//!
//! ```text
//! TableSpec "service"
//!   partition key: name (S)
//!   sort key:      operation (S)
//!   ttl attribute: ttl
//!   indexes:       (none)
//! ```

use crate::error::{Result, SpanStoreError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Scalar attribute type usable in a key
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScalarType {
    #[default]
    #[serde(rename = "S")]
    String,
    #[serde(rename = "N")]
    Number,
    #[serde(rename = "B")]
    Binary,
}

impl ScalarType {
    /// Wire code used by the store ("S", "N" or "B")
    pub fn as_code(&self) -> &'static str {
        match self {
            ScalarType::String => "S",
            ScalarType::Number => "N",
            ScalarType::Binary => "B",
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

/// A named key attribute and its scalar type
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KeyAttribute {
    pub name: String,
    #[serde(default, rename = "type")]
    pub scalar: ScalarType,
}

impl KeyAttribute {
    pub fn new(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self {
            name: name.into(),
            scalar,
        }
    }

    /// String-typed key attribute
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ScalarType::String)
    }

    /// Number-typed key attribute
    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, ScalarType::Number)
    }
}

/// Global secondary index declaration
///
/// Projection is always "all attributes".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryIndexSpec {
    pub name: String,
    pub partition_key: KeyAttribute,
    #[serde(default)]
    pub sort_key: Option<KeyAttribute>,
}

impl SecondaryIndexSpec {
    pub fn new(name: impl Into<String>, partition_key: KeyAttribute) -> Self {
        Self {
            name: name.into(),
            partition_key,
            sort_key: None,
        }
    }

    pub fn with_sort_key(mut self, sort_key: KeyAttribute) -> Self {
        self.sort_key = Some(sort_key);
        self
    }

    /// Key attributes in key-schema order (partition first)
    pub fn key_attributes(&self) -> impl Iterator<Item = &KeyAttribute> {
        std::iter::once(&self.partition_key).chain(self.sort_key.iter())
    }
}

/// Declared table shape
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Logical name (without prefix/suffix decoration)
    pub name: String,
    pub partition_key: KeyAttribute,
    #[serde(default)]
    pub sort_key: Option<KeyAttribute>,
    /// Attribute holding the per-item expiry in epoch seconds
    #[serde(default)]
    pub ttl_attribute: Option<String>,
    #[serde(default)]
    pub indexes: Vec<SecondaryIndexSpec>,
}

impl TableSpec {
    pub fn new(name: impl Into<String>, partition_key: KeyAttribute) -> Self {
        Self {
            name: name.into(),
            partition_key,
            sort_key: None,
            ttl_attribute: None,
            indexes: Vec::new(),
        }
    }

    pub fn with_sort_key(mut self, sort_key: KeyAttribute) -> Self {
        self.sort_key = Some(sort_key);
        self
    }

    pub fn with_ttl(mut self, attribute: impl Into<String>) -> Self {
        self.ttl_attribute = Some(attribute.into());
        self
    }

    pub fn with_index(mut self, index: SecondaryIndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    /// Key attributes in key-schema order (partition first)
    pub fn key_attributes(&self) -> impl Iterator<Item = &KeyAttribute> {
        std::iter::once(&self.partition_key).chain(self.sort_key.iter())
    }

    /// TTL attribute if one is declared and non-empty
    pub fn ttl(&self) -> Option<&str> {
        self.ttl_attribute.as_deref().filter(|a| !a.is_empty())
    }

    /// Check the spec is well formed before anything is sent to the store.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(SpanStoreError::config("table name must not be empty"));
        }
        if self.partition_key.name.is_empty() {
            return Err(SpanStoreError::config(format!(
                "table '{}' has no partition key name",
                self.name
            )));
        }
        if let Some(sort) = &self.sort_key {
            if sort.name.is_empty() {
                return Err(SpanStoreError::config(format!(
                    "table '{}' has an empty sort key name",
                    self.name
                )));
            }
            if sort.name == self.partition_key.name {
                return Err(SpanStoreError::config(format!(
                    "table '{}' uses '{}' as both partition and sort key",
                    self.name, sort.name
                )));
            }
        }

        // Every attribute that appears in a key must keep one type across the
        // table and all of its indexes.
        let mut types: HashMap<String, ScalarType> = HashMap::new();
        let mut check = |owner: &str, attr: &KeyAttribute| -> Result<()> {
            match types.get(&attr.name).copied() {
                Some(existing) if existing != attr.scalar => {
                    Err(SpanStoreError::config(format!(
                        "attribute '{}' in {} declared as {} but already defined as {}",
                        attr.name, owner, attr.scalar, existing
                    )))
                }
                _ => {
                    types.insert(attr.name.clone(), attr.scalar);
                    Ok(())
                }
            }
        };
        for attr in self.key_attributes() {
            check(&format!("table '{}'", self.name), attr)?;
        }

        let mut seen = HashSet::new();
        for index in &self.indexes {
            if index.name.is_empty() {
                return Err(SpanStoreError::config(format!(
                    "table '{}' has an index with an empty name",
                    self.name
                )));
            }
            if !seen.insert(index.name.as_str()) {
                return Err(SpanStoreError::config(format!(
                    "table '{}' declares index '{}' twice",
                    self.name, index.name
                )));
            }
            if index.partition_key.name.is_empty() {
                return Err(SpanStoreError::config(format!(
                    "index '{}' on table '{}' has no partition attribute",
                    index.name, self.name
                )));
            }
            if index.sort_key.as_ref().is_some_and(|s| s.name.is_empty()) {
                return Err(SpanStoreError::config(format!(
                    "index '{}' on table '{}' has an empty sort attribute",
                    index.name, self.name
                )));
            }
            for attr in index.key_attributes() {
                check(&format!("index '{}'", index.name), attr)?;
            }
        }
        Ok(())
    }
}

/// Validate a whole spec set: each spec individually plus unique table names.
pub fn validate_specs(specs: &[TableSpec]) -> Result<()> {
    let mut names = HashSet::new();
    for spec in specs {
        spec.validate()?;
        if !names.insert(spec.name.as_str()) {
            return Err(SpanStoreError::config(format!(
                "table '{}' is declared twice",
                spec.name
            )));
        }
    }
    Ok(())
}
