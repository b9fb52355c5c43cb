//! Span store configuration
//!
//! Every field has a default, so an empty JSON object is a valid config:
//!
//! ```json
//! {
//!   "table_prefix": "",
//!   "table_suffix": "-dev",
//!   "create_tables": true,
//!   "ttl_days": 60,
//!   "archive_ttl_days": 180,
//!   "table_wait": { "poll_interval_ms": 1000, "timeout_secs": 300 },
//!   "index_wait": { "poll_interval_ms": 100, "timeout_secs": 300 },
//!   "identity_retention_secs": 86400,
//!   "identity_sweep_interval_secs": 60
//! }
//! ```

use crate::dedup::DedupSettings;
use crate::error::{Result, SpanStoreError};
use crate::naming::TableNaming;
use crate::wait::{WaitConfig, WaitPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Upper bound on `ttl_days` and `archive_ttl_days`
pub const MAX_TTL_DAYS: u64 = 36_500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanStoreConfig {
    #[serde(default)]
    pub table_prefix: String,

    #[serde(default = "default_suffix")]
    pub table_suffix: String,

    /// Reconcile the table schema when the adapter opens
    #[serde(default = "default_true")]
    pub create_tables: bool,

    /// Retention of span records, in days
    #[serde(default = "default_ttl_days")]
    pub ttl_days: u64,

    /// Retention of dependency facts and edges, in days
    #[serde(default = "default_archive_ttl_days")]
    pub archive_ttl_days: u64,

    #[serde(default = "default_table_wait")]
    pub table_wait: WaitConfig,

    #[serde(default = "default_index_wait")]
    pub index_wait: WaitConfig,

    #[serde(default = "default_identity_retention_secs")]
    pub identity_retention_secs: u64,

    #[serde(default = "default_identity_sweep_interval_secs")]
    pub identity_sweep_interval_secs: u64,
}

impl Default for SpanStoreConfig {
    fn default() -> Self {
        Self {
            table_prefix: String::new(),
            table_suffix: default_suffix(),
            create_tables: true,
            ttl_days: default_ttl_days(),
            archive_ttl_days: default_archive_ttl_days(),
            table_wait: default_table_wait(),
            index_wait: default_index_wait(),
            identity_retention_secs: default_identity_retention_secs(),
            identity_sweep_interval_secs: default_identity_sweep_interval_secs(),
        }
    }
}

fn default_suffix() -> String {
    "-dev".to_string()
}

fn default_true() -> bool {
    true
}

fn default_ttl_days() -> u64 {
    60
}

fn default_archive_ttl_days() -> u64 {
    180
}

fn default_table_wait() -> WaitConfig {
    WaitConfig {
        poll_interval_ms: 1_000,
        timeout_secs: 300,
    }
}

fn default_index_wait() -> WaitConfig {
    WaitConfig {
        poll_interval_ms: 100,
        timeout_secs: 300,
    }
}

fn default_identity_retention_secs() -> u64 {
    SECS_PER_DAY
}

fn default_identity_sweep_interval_secs() -> u64 {
    60
}

impl SpanStoreConfig {
    /// Parse from JSON, filling in defaults, and validate
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SpanStoreError::config(format!("invalid span store config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, days) in [
            ("ttl_days", self.ttl_days),
            ("archive_ttl_days", self.archive_ttl_days),
        ] {
            if days == 0 {
                return Err(SpanStoreError::config(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
            if days > MAX_TTL_DAYS {
                return Err(SpanStoreError::config(format!(
                    "{} must be at most {}, got {}",
                    name, MAX_TTL_DAYS, days
                )));
            }
        }
        for (name, wait) in [("table_wait", &self.table_wait), ("index_wait", &self.index_wait)] {
            if wait.poll_interval_ms == 0 {
                return Err(SpanStoreError::config(format!(
                    "{}.poll_interval_ms must be greater than zero",
                    name
                )));
            }
            if wait.timeout_secs == 0 {
                return Err(SpanStoreError::config(format!(
                    "{}.timeout_secs must be greater than zero",
                    name
                )));
            }
        }
        if self.identity_retention_secs == 0 {
            return Err(SpanStoreError::config(
                "identity_retention_secs must be greater than zero",
            ));
        }
        if self.identity_sweep_interval_secs == 0 {
            return Err(SpanStoreError::config(
                "identity_sweep_interval_secs must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn naming(&self) -> TableNaming {
        TableNaming::new(&self.table_prefix, &self.table_suffix)
    }

    /// Span record retention
    pub fn span_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_days.saturating_mul(SECS_PER_DAY))
    }

    /// Dependency fact and edge retention
    pub fn dependency_ttl(&self) -> Duration {
        Duration::from_secs(self.archive_ttl_days.saturating_mul(SECS_PER_DAY))
    }

    pub fn table_wait_policy(&self) -> WaitPolicy {
        self.table_wait.into()
    }

    pub fn index_wait_policy(&self) -> WaitPolicy {
        self.index_wait.into()
    }

    pub fn dedup_settings(&self) -> DedupSettings {
        DedupSettings {
            identity_retention: Duration::from_secs(self.identity_retention_secs),
            identity_sweep_interval: Duration::from_secs(self.identity_sweep_interval_secs),
        }
    }
}
