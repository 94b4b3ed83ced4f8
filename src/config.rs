//! Event store configuration

use crate::error::{EventError, Result};
use serde::{Deserialize, Serialize};

/// Default table name for published events
pub const DEFAULT_TABLE_NAME: &str = "Events";

/// Default time-to-live for published events (2 hours)
pub const DEFAULT_TTL_SECONDS: u64 = 7200;

/// Construction-time configuration for an `EventStore`
///
/// Immutable once the store is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventStoreConfig {
    /// Destination table
    #[serde(default = "default_table_name")]
    pub table_name: String,

    /// Expiry window applied to every published event
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
}

fn default_table_name() -> String {
    DEFAULT_TABLE_NAME.to_string()
}

fn default_ttl_seconds() -> u64 {
    DEFAULT_TTL_SECONDS
}

impl Default for EventStoreConfig {
    fn default() -> Self {
        Self {
            table_name: default_table_name(),
            ttl_seconds: default_ttl_seconds(),
        }
    }
}

impl EventStoreConfig {
    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    pub fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    /// Check the table name is usable as a backend identifier
    pub fn validate(&self) -> Result<()> {
        validate_name("table name", &self.table_name)
    }
}

/// Check a name can be used as a NATS subject token or consumer name
///
/// Rejects the empty name, whitespace, `.`, `*` and `>`.
pub fn validate_name(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(EventError::Config(format!("{} must not be empty", kind)));
    }

    if let Some(c) = name
        .chars()
        .find(|c: &char| c.is_whitespace() || matches!(*c, '.' | '*' | '>'))
    {
        return Err(EventError::Config(format!(
            "{} '{}' contains invalid character {:?}",
            kind, name, c
        )));
    }

    Ok(())
}
