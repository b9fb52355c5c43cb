//! DynamoDB table store
//!
//! Provides `DynamoDbTableStore`, which implements the span store's
//! [`TableStore`] capability on top of Amazon DynamoDB. Tables are created
//! with on-demand (pay-per-request) billing; indexes project all attributes.

mod convert;

use crate::error::{AwsStoreError, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::types::{BillingMode, TimeToLiveSpecification};
use aws_sdk_dynamodb::Client;
use aws_smithy_types::timeout::TimeoutConfig;
use spanstore_core::{
    AddIndexes, CreateTable, Item, TableDescription, TablePage, TableStore, TtlDescription,
};
use std::time::Duration;

/// DynamoDB client configuration
#[derive(Debug, Clone, Default)]
pub struct DynamoDbConfig {
    /// AWS region (optional, uses SDK default if not specified)
    pub region: Option<String>,
    /// Optional endpoint override (e.g. DynamoDB Local)
    pub endpoint: Option<String>,
    /// Timeout in milliseconds
    pub timeout_ms: Option<u64>,
}

/// DynamoDB-backed [`TableStore`]
#[derive(Clone)]
pub struct DynamoDbTableStore {
    client: Client,
}

impl std::fmt::Debug for DynamoDbTableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbTableStore")
            .field("region", &self.client.config().region())
            .finish()
    }
}

impl DynamoDbTableStore {
    /// Create a store from a loaded SDK configuration
    ///
    /// Configuration:
    /// - `region`: Override SDK region (uses SDK default if not specified)
    /// - `endpoint`: Override the service endpoint
    /// - `timeout_ms`: Operation timeout in milliseconds
    pub fn new(sdk_config: &aws_config::SdkConfig, config: DynamoDbConfig) -> Result<Self> {
        // Inherit HTTP client, retry config, credentials and sleep impl from
        // the SdkConfig, then apply our overrides
        let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);

        if let Some(region) = config.region {
            if region.is_empty() {
                return Err(AwsStoreError::invalid_config("region must not be empty"));
            }
            builder = builder.region(aws_sdk_dynamodb::config::Region::new(region));
        }

        if let Some(endpoint) = config.endpoint {
            if endpoint.is_empty() {
                return Err(AwsStoreError::invalid_config("endpoint must not be empty"));
            }
            builder = builder.endpoint_url(endpoint);
        }

        if let Some(timeout_ms) = config.timeout_ms {
            if timeout_ms == 0 {
                return Err(AwsStoreError::invalid_config(
                    "timeout_ms must be greater than zero",
                ));
            }
            let timeout_config = TimeoutConfig::builder()
                .operation_timeout(Duration::from_millis(timeout_ms))
                .build();
            builder = builder.timeout_config(timeout_config);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }

    /// Load the ambient AWS configuration (environment, profile, IMDS) and
    /// create a store from it
    pub async fn connect(config: DynamoDbConfig) -> Result<Self> {
        let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let store = Self::new(&sdk_config, config)?;
        tracing::debug!(store = ?store, "Connected to DynamoDB");
        Ok(store)
    }

    /// Create from a pre-built client (for testing)
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl TableStore for DynamoDbTableStore {
    async fn list_tables(
        &self,
        start: Option<String>,
    ) -> spanstore_core::Result<TablePage> {
        let output = self
            .client
            .list_tables()
            .set_exclusive_start_table_name(start)
            .send()
            .await
            .map_err(|e| AwsStoreError::request("ListTables", "*", e))?;

        Ok(TablePage {
            table_names: output.table_names().to_vec(),
            last_evaluated: output.last_evaluated_table_name().map(str::to_string),
        })
    }

    async fn describe_table(&self, table_name: &str) -> spanstore_core::Result<TableDescription> {
        let output = self
            .client
            .describe_table()
            .table_name(table_name)
            .send()
            .await
            .map_err(|e| AwsStoreError::request("DescribeTable", table_name, e))?;

        let table = output.table().ok_or_else(|| {
            AwsStoreError::malformed("DescribeTable", table_name, "a table description")
        })?;
        Ok(convert::table_description(table, table_name))
    }

    async fn create_table(&self, request: CreateTable) -> spanstore_core::Result<()> {
        let table_name = request.table_name.as_str();
        let key_schema = convert::key_schema(&request.key_schema)
            .map_err(|e| AwsStoreError::request("CreateTable", table_name, e))?;
        let attribute_definitions = convert::attribute_definitions(&request.attribute_definitions)
            .map_err(|e| AwsStoreError::request("CreateTable", table_name, e))?;

        self.client
            .create_table()
            .table_name(table_name)
            .set_key_schema(Some(key_schema))
            .set_attribute_definitions(Some(attribute_definitions))
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await
            .map_err(|e| AwsStoreError::request("CreateTable", table_name, e))?;

        tracing::debug!(table = %table_name, "CreateTable accepted");
        Ok(())
    }

    async fn add_indexes(&self, request: AddIndexes) -> spanstore_core::Result<()> {
        let table_name = request.table_name.as_str();
        let attribute_definitions = convert::attribute_definitions(&request.attribute_definitions)
            .map_err(|e| AwsStoreError::request("UpdateTable", table_name, e))?;
        let updates = convert::index_updates(&request.indexes)
            .map_err(|e| AwsStoreError::request("UpdateTable", table_name, e))?;

        self.client
            .update_table()
            .table_name(table_name)
            .set_attribute_definitions(Some(attribute_definitions))
            .set_global_secondary_index_updates(Some(updates))
            .send()
            .await
            .map_err(|e| AwsStoreError::request("UpdateTable", table_name, e))?;

        tracing::debug!(table = %table_name, count = request.indexes.len(), "UpdateTable accepted");
        Ok(())
    }

    async fn describe_ttl(
        &self,
        table_name: &str,
    ) -> spanstore_core::Result<Option<TtlDescription>> {
        let output = match self
            .client
            .describe_time_to_live()
            .table_name(table_name)
            .send()
            .await
        {
            Ok(output) => output,
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_resource_not_found_exception()) =>
            {
                return Ok(None);
            }
            Err(e) => return Err(AwsStoreError::request("DescribeTimeToLive", table_name, e).into()),
        };

        Ok(output
            .time_to_live_description()
            .and_then(convert::ttl_description))
    }

    async fn enable_ttl(&self, table_name: &str, attribute_name: &str) -> spanstore_core::Result<()> {
        let specification = TimeToLiveSpecification::builder()
            .attribute_name(attribute_name)
            .enabled(true)
            .build()
            .map_err(|e| AwsStoreError::request("UpdateTimeToLive", table_name, e))?;

        self.client
            .update_time_to_live()
            .table_name(table_name)
            .time_to_live_specification(specification)
            .send()
            .await
            .map_err(|e| AwsStoreError::request("UpdateTimeToLive", table_name, e))?;
        Ok(())
    }

    async fn put_item(&self, table_name: &str, item: Item) -> spanstore_core::Result<()> {
        self.client
            .put_item()
            .table_name(table_name)
            .set_item(Some(convert::item(item)))
            .send()
            .await
            .map_err(|e| AwsStoreError::request("PutItem", table_name, e))?;
        Ok(())
    }
}
