//! Store-native item representation
//!
//! Records are serialized with serde into JSON first and then mapped onto
//! the store's attribute types. Numbers travel as their decimal string form,
//! the same way the store's wire protocol carries them.

use crate::error::{Result, SpanStoreError};
use serde::Serialize;
use std::collections::HashMap;

/// A single attribute value
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    S(String),
    N(String),
    Bool(bool),
    Null,
    L(Vec<AttrValue>),
    M(HashMap<String, AttrValue>),
}

impl AttrValue {
    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttrValue::S(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_n(&self) -> Option<&str> {
        match self {
            AttrValue::N(n) => Some(n),
            _ => None,
        }
    }
}

/// An item keyed by attribute name
pub type Item = HashMap<String, AttrValue>;

/// Serialize a record into an item. The record must serialize to a JSON
/// object.
pub fn to_item<T: Serialize>(record: &T) -> Result<Item> {
    match serde_json::to_value(record)? {
        serde_json::Value::Object(obj) => Ok(obj
            .iter()
            .filter_map(|(k, v)| json_to_attr(v).map(|attr| (k.clone(), attr)))
            .collect()),
        other => Err(SpanStoreError::Serialization(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

fn json_to_attr(val: &serde_json::Value) -> Option<AttrValue> {
    match val {
        // Absent optionals are left out of the item entirely
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(AttrValue::Bool(*b)),
        serde_json::Value::Number(n) => Some(AttrValue::N(n.to_string())),
        serde_json::Value::String(s) => Some(AttrValue::S(s.clone())),
        serde_json::Value::Array(arr) => {
            let items: Vec<_> = arr
                .iter()
                .map(|v| json_to_attr(v).unwrap_or(AttrValue::Null))
                .collect();
            Some(AttrValue::L(items))
        }
        serde_json::Value::Object(obj) => {
            let map: HashMap<String, AttrValue> = obj
                .iter()
                .filter_map(|(k, v)| json_to_attr(v).map(|attr| (k.clone(), attr)))
                .collect();
            Some(AttrValue::M(map))
        }
    }
}
