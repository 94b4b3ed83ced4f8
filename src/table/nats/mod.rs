//! NATS JetStream event table
//!
//! Implements `EventTable` on a JetStream stream: every insert is an acked
//! publish, the stream's `max_age` retention expires records, and change
//! feeds are pull consumers: ephemeral ones that only see new inserts, or
//! durable named ones that resume where they stopped.

mod client;
mod config;
mod feed;

pub use client::{NatsClient, StreamInfo};
pub use config::{NatsConfig, StorageType};
pub use feed::NatsChangeFeed;

use crate::error::Result;
use crate::table::{ChangeFeed, EventTable};
use crate::types::EventRecord;
use async_trait::async_trait;

/// NATS JetStream event table
///
/// Wraps `NatsClient` and implements the `EventTable` trait.
pub struct NatsTable {
    client: NatsClient,
}

impl NatsTable {
    /// Connect to NATS and initialize the JetStream stream
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        let client = NatsClient::connect(config).await?;
        Ok(Self { client })
    }

    /// Get the underlying NATS client for advanced usage
    pub fn client(&self) -> &NatsClient {
        &self.client
    }
}

#[async_trait]
impl EventTable for NatsTable {
    async fn put(&self, table_name: &str, record: &EventRecord) -> Result<()> {
        self.client.put(table_name, record).await.map(|_| ())
    }

    async fn change_feed(&self, table_name: &str) -> Result<Box<dyn ChangeFeed>> {
        let feed = self.client.change_feed(table_name).await?;
        Ok(Box::new(feed))
    }

    async fn durable_change_feed(
        &self,
        table_name: &str,
        consumer_name: &str,
    ) -> Result<Box<dyn ChangeFeed>> {
        let feed = self
            .client
            .durable_change_feed(table_name, consumer_name)
            .await?;
        Ok(Box::new(feed))
    }

    async fn remove_change_feed(&self, table_name: &str, consumer_name: &str) -> Result<()> {
        self.client.remove_change_feed(table_name, consumer_name).await
    }

    /// Stream `max_age`; records expire on it rather than on their `ttl`
    fn retention_secs(&self) -> Option<u64> {
        let max_age = self.client.config().max_age_secs;
        (max_age > 0).then_some(max_age)
    }

    fn name(&self) -> &str {
        "nats"
    }

    async fn health(&self) -> Result<bool> {
        if !self.client.is_connected() {
            return Ok(false);
        }
        self.client.stream_info().await.map(|_| true)
    }
}
