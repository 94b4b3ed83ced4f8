//! NATS JetStream backend configuration

use serde::{Deserialize, Serialize};

/// JetStream storage backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageType {
    /// Persisted to disk
    #[default]
    File,
    /// Held in server memory only
    Memory,
}

/// Configuration for the NATS-backed event table
///
/// All event tables share one JetStream stream. Each table is a subject
/// `<subject_prefix>.<table_name>` inside it, and the stream's `max_age`
/// retention is what expires records.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NatsConfig {
    /// Server URL
    #[serde(default = "default_url")]
    pub url: String,

    /// Optional auth token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// JetStream stream holding every table
    #[serde(default = "default_stream_name")]
    pub stream_name: String,

    /// Subject prefix for table subjects
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,

    #[serde(default)]
    pub storage: StorageType,

    /// Stream retention; should cover the largest event ttl in use (0 = unlimited)
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Maximum records kept in the stream (-1 = unlimited)
    #[serde(default = "default_unlimited")]
    pub max_events: i64,

    /// Maximum stream size in bytes (-1 = unlimited)
    #[serde(default = "default_unlimited")]
    pub max_bytes: i64,

    /// Window in which a repeated record id is dropped as a duplicate
    #[serde(default = "default_duplicate_window_secs")]
    pub duplicate_window_secs: u64,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_url() -> String {
    "nats://127.0.0.1:4222".to_string()
}

fn default_stream_name() -> String {
    "A3S_EVENT_STORE".to_string()
}

fn default_subject_prefix() -> String {
    "events".to_string()
}

fn default_max_age_secs() -> u64 {
    crate::config::DEFAULT_TTL_SECONDS
}

fn default_unlimited() -> i64 {
    -1
}

fn default_duplicate_window_secs() -> u64 {
    120
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: None,
            stream_name: default_stream_name(),
            subject_prefix: default_subject_prefix(),
            storage: StorageType::default(),
            max_age_secs: default_max_age_secs(),
            max_events: default_unlimited(),
            max_bytes: default_unlimited(),
            duplicate_window_secs: default_duplicate_window_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl NatsConfig {
    /// Subject records for `table_name` are published to
    pub fn table_subject(&self, table_name: &str) -> String {
        format!("{}.{}", self.subject_prefix, table_name)
    }

    /// Subjects captured by the stream
    pub fn stream_subjects(&self) -> Vec<String> {
        vec![format!("{}.>", self.subject_prefix)]
    }
}
