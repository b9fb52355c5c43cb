//! Conversions between span store types and DynamoDB SDK types
//!
//! Requests go from [`spanstore_core`] types to SDK builders; responses come
//! back as plain descriptions. Unknown SDK enum variants (the SDK enums are
//! non-exhaustive) map to the `Other` table/index status so callers keep
//! polling rather than failing on a state they do not understand, and to
//! `TtlStatus::Unknown`, which the reconciler leaves untouched.

use aws_sdk_dynamodb::error::BuildError;
use aws_sdk_dynamodb::types::{
    self as ddb, AttributeValue, CreateGlobalSecondaryIndexAction, GlobalSecondaryIndexUpdate,
    Projection, ProjectionType, ScalarAttributeType,
};
use spanstore_core::{
    AttrValue, AttributeDefinition, CreateIndex, IndexDescription, IndexStatus, Item,
    KeySchemaElement, KeyType, ScalarType, TableDescription, TableStatus, TtlDescription,
    TtlStatus,
};
use std::collections::HashMap;

pub(crate) fn scalar_type(scalar: ScalarType) -> ScalarAttributeType {
    match scalar {
        ScalarType::String => ScalarAttributeType::S,
        ScalarType::Number => ScalarAttributeType::N,
        ScalarType::Binary => ScalarAttributeType::B,
    }
}

pub(crate) fn key_schema(
    elements: &[KeySchemaElement],
) -> Result<Vec<ddb::KeySchemaElement>, BuildError> {
    elements
        .iter()
        .map(|element| {
            ddb::KeySchemaElement::builder()
                .attribute_name(&element.attribute_name)
                .key_type(match element.key_type {
                    KeyType::Hash => ddb::KeyType::Hash,
                    KeyType::Range => ddb::KeyType::Range,
                })
                .build()
        })
        .collect()
}

pub(crate) fn attribute_definitions(
    defs: &[AttributeDefinition],
) -> Result<Vec<ddb::AttributeDefinition>, BuildError> {
    defs.iter()
        .map(|def| {
            ddb::AttributeDefinition::builder()
                .attribute_name(&def.attribute_name)
                .attribute_type(scalar_type(def.attribute_type))
                .build()
        })
        .collect()
}

/// One "create index" update per index, projecting all attributes
pub(crate) fn index_updates(
    indexes: &[CreateIndex],
) -> Result<Vec<GlobalSecondaryIndexUpdate>, BuildError> {
    indexes
        .iter()
        .map(|index| {
            let action = CreateGlobalSecondaryIndexAction::builder()
                .index_name(&index.index_name)
                .set_key_schema(Some(key_schema(&index.key_schema)?))
                .projection(
                    Projection::builder()
                        .projection_type(ProjectionType::All)
                        .build(),
                )
                .build()?;
            Ok(GlobalSecondaryIndexUpdate::builder().create(action).build())
        })
        .collect()
}

pub(crate) fn table_status(status: Option<&ddb::TableStatus>) -> TableStatus {
    match status {
        Some(ddb::TableStatus::Creating) => TableStatus::Creating,
        Some(ddb::TableStatus::Updating) => TableStatus::Updating,
        Some(ddb::TableStatus::Active) => TableStatus::Active,
        Some(ddb::TableStatus::Deleting) => TableStatus::Deleting,
        _ => TableStatus::Other,
    }
}

pub(crate) fn index_status(status: Option<&ddb::IndexStatus>) -> IndexStatus {
    match status {
        Some(ddb::IndexStatus::Creating) => IndexStatus::Creating,
        Some(ddb::IndexStatus::Updating) => IndexStatus::Updating,
        Some(ddb::IndexStatus::Active) => IndexStatus::Active,
        Some(ddb::IndexStatus::Deleting) => IndexStatus::Deleting,
        _ => IndexStatus::Other,
    }
}

pub(crate) fn table_description(table: &ddb::TableDescription, name: &str) -> TableDescription {
    TableDescription {
        name: table.table_name().unwrap_or(name).to_string(),
        status: table_status(table.table_status()),
        indexes: table
            .global_secondary_indexes()
            .iter()
            .filter_map(|gsi| {
                Some(IndexDescription {
                    name: gsi.index_name()?.to_string(),
                    status: index_status(gsi.index_status()),
                })
            })
            .collect(),
    }
}

/// `None` when the response carries no status at all
pub(crate) fn ttl_description(ttl: &ddb::TimeToLiveDescription) -> Option<TtlDescription> {
    let status = match ttl.time_to_live_status()? {
        ddb::TimeToLiveStatus::Enabling => TtlStatus::Enabling,
        ddb::TimeToLiveStatus::Disabling => TtlStatus::Disabling,
        ddb::TimeToLiveStatus::Enabled => TtlStatus::Enabled,
        ddb::TimeToLiveStatus::Disabled => TtlStatus::Disabled,
        _ => TtlStatus::Unknown,
    };
    Some(TtlDescription {
        status,
        attribute_name: ttl.attribute_name().map(str::to_string),
    })
}

pub(crate) fn attribute_value(value: AttrValue) -> AttributeValue {
    match value {
        AttrValue::S(s) => AttributeValue::S(s),
        AttrValue::N(n) => AttributeValue::N(n),
        AttrValue::Bool(b) => AttributeValue::Bool(b),
        AttrValue::Null => AttributeValue::Null(true),
        AttrValue::L(items) => AttributeValue::L(items.into_iter().map(attribute_value).collect()),
        AttrValue::M(map) => AttributeValue::M(
            map.into_iter()
                .map(|(k, v)| (k, attribute_value(v)))
                .collect(),
        ),
    }
}

pub(crate) fn item(item: Item) -> HashMap<String, AttributeValue> {
    item.into_iter()
        .map(|(k, v)| (k, attribute_value(v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_schema_and_definitions() {
        let schema = key_schema(&[
            KeySchemaElement::hash("parent_service"),
            KeySchemaElement::range("child_service"),
        ])
        .unwrap();
        assert_eq!(schema[0].attribute_name(), "parent_service");
        assert_eq!(schema[0].key_type(), &ddb::KeyType::Hash);
        assert_eq!(schema[1].key_type(), &ddb::KeyType::Range);

        let defs = attribute_definitions(&[AttributeDefinition::new(
            "start_time_nanos",
            ScalarType::Number,
        )])
        .unwrap();
        assert_eq!(defs[0].attribute_type(), &ScalarAttributeType::N);
    }

    #[test]
    fn test_index_update_projects_all() {
        let updates = index_updates(&[CreateIndex {
            index_name: "by-time".to_string(),
            key_schema: vec![
                KeySchemaElement::hash("service_and_time"),
                KeySchemaElement::range("start_time_nanos"),
            ],
        }])
        .unwrap();

        let create = updates[0].create().unwrap();
        assert_eq!(create.index_name(), "by-time");
        assert_eq!(create.key_schema().len(), 2);
        assert_eq!(
            create.projection().and_then(|p| p.projection_type()),
            Some(&ProjectionType::All)
        );
    }

    #[test]
    fn test_table_description_maps_index_states() {
        let table = ddb::TableDescription::builder()
            .table_name("span-dev")
            .table_status(ddb::TableStatus::Active)
            .global_secondary_indexes(
                ddb::GlobalSecondaryIndexDescription::builder()
                    .index_name("by-time")
                    .index_status(ddb::IndexStatus::Creating)
                    .build(),
            )
            .build();

        let description = table_description(&table, "span-dev");
        assert_eq!(description.status, TableStatus::Active);
        assert_eq!(description.indexes[0].status, IndexStatus::Creating);
        assert!(description.has_creating_index());
    }

    #[test]
    fn test_ttl_description() {
        let ttl = ddb::TimeToLiveDescription::builder()
            .time_to_live_status(ddb::TimeToLiveStatus::Enabled)
            .attribute_name("ttl")
            .build();
        let description = ttl_description(&ttl).unwrap();
        assert_eq!(description.status, TtlStatus::Enabled);
        assert_eq!(description.attribute_name.as_deref(), Some("ttl"));

        assert!(ttl_description(&ddb::TimeToLiveDescription::builder().build()).is_none());

        let unrecognised = ddb::TimeToLiveDescription::builder()
            .time_to_live_status(ddb::TimeToLiveStatus::from("ARCHIVING"))
            .attribute_name("ttl")
            .build();
        assert_eq!(
            ttl_description(&unrecognised).map(|d| d.status),
            Some(TtlStatus::Unknown)
        );
    }

    #[test]
    fn test_item_conversion() {
        let mut nested = HashMap::new();
        nested.insert("k".to_string(), AttrValue::Null);
        let mut source = Item::new();
        source.insert("name".to_string(), AttrValue::S("frontend".to_string()));
        source.insert("ttl".to_string(), AttrValue::N("1100".to_string()));
        source.insert("tags".to_string(), AttrValue::L(vec![AttrValue::Bool(true)]));
        source.insert("meta".to_string(), AttrValue::M(nested));

        let converted = item(source);
        assert_eq!(converted["name"], AttributeValue::S("frontend".to_string()));
        assert_eq!(converted["ttl"], AttributeValue::N("1100".to_string()));
        assert_eq!(converted["tags"], AttributeValue::L(vec![AttributeValue::Bool(true)]));
        assert_eq!(
            converted["meta"].as_m().unwrap()["k"],
            AttributeValue::Null(true)
        );
    }
}
