//! The event store — single write path for published events
//!
//! `EventStore` stamps each producer event with a sortable id and an
//! absolute expiry, then inserts it into the backing table as one flat
//! record. It holds no mutable state, so one store can be shared across
//! any number of concurrent producers.

use crate::clock::{compute_ttl, Clock, SystemClock};
use crate::config::EventStoreConfig;
use crate::error::{EventError, Result};
use crate::id::EventId;
use crate::table::nats::{NatsConfig, NatsTable};
use crate::table::{ChangeFeed, EventTable};
use crate::types::{EventPayload, EventRecord};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

/// Producer-facing publish contract
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Durably record an event for asynchronous fan-out
    async fn publish(&self, event: EventPayload) -> Result<EventId>;
}

/// Append-only event store over a pluggable backing table
#[derive(Clone)]
pub struct EventStore {
    table: Arc<dyn EventTable>,
    config: EventStoreConfig,
    clock: Arc<dyn Clock>,
}

impl EventStore {
    /// Create a store writing through `table`
    pub fn new(table: Arc<dyn EventTable>, config: EventStoreConfig) -> Result<Self> {
        Self::with_clock(table, config, Arc::new(SystemClock))
    }

    /// Create a store with an explicit time source for TTL stamping
    pub fn with_clock(
        table: Arc<dyn EventTable>,
        config: EventStoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        if let Some(retention) = table.retention_secs() {
            if config.ttl_seconds > retention {
                return Err(EventError::Config(format!(
                    "ttl of {}s exceeds the {}s retention of the '{}' backend; records would expire early",
                    config.ttl_seconds,
                    retention,
                    table.name()
                )));
            }
        }

        tracing::debug!(
            backend = table.name(),
            table = %config.table_name,
            ttl_seconds = config.ttl_seconds,
            "Event store created"
        );

        Ok(Self {
            table,
            config,
            clock,
        })
    }

    /// Connect to NATS at the default address with the default configuration
    ///
    /// Each call opens its own connection; share the returned store (it is
    /// cheap to clone) rather than calling this per publish.
    pub async fn connect_default() -> Result<Self> {
        let table = NatsTable::connect(NatsConfig::default()).await?;
        Self::new(Arc::new(table), EventStoreConfig::default())
    }

    /// Publish an event
    ///
    /// Resolves once the backing table acknowledges the insert. Does not wait
    /// for any change feed consumer. Payloads using the reserved `id` or `ttl`
    /// fields are rejected before anything is written.
    pub async fn publish(&self, event: EventPayload) -> Result<EventId> {
        let id = EventId::generate();
        let ttl = compute_ttl(self.clock.now_secs(), self.config.ttl_seconds);
        let record = EventRecord::build(id, ttl, event)?;

        if let Err(e) = self.table.put(&self.config.table_name, &record).await {
            tracing::warn!(
                event_id = %id,
                table = %self.config.table_name,
                backend = self.table.name(),
                error = %e,
                "Event publish failed"
            );
            return Err(e);
        }

        tracing::debug!(
            event_id = %id,
            table = %self.config.table_name,
            ttl,
            "Event published"
        );

        Ok(id)
    }

    /// Publish a JSON value, which must be an object
    pub async fn publish_json(&self, event: serde_json::Value) -> Result<EventId> {
        match event {
            serde_json::Value::Object(fields) => self.publish(fields).await,
            other => Err(EventError::InvalidPayload(format!(
                "expected a JSON object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Publish any value that serializes to a JSON object
    pub async fn publish_serialize<T: Serialize + ?Sized>(&self, event: &T) -> Result<EventId> {
        self.publish_json(serde_json::to_value(event)?).await
    }

    /// Open a read-only feed of inserts into this store's table
    ///
    /// This is the hand-off to the event processor; the store itself never
    /// consumes it.
    pub async fn change_feed(&self) -> Result<Box<dyn ChangeFeed>> {
        self.table.change_feed(&self.config.table_name).await
    }

    /// Open (or resume) a named feed of inserts into this store's table
    ///
    /// The backend remembers how far `consumer_name` got, so a processor that
    /// restarts does not miss inserts made while it was down.
    pub async fn durable_change_feed(&self, consumer_name: &str) -> Result<Box<dyn ChangeFeed>> {
        self.table
            .durable_change_feed(&self.config.table_name, consumer_name)
            .await
    }

    /// Drop the saved position of a named feed
    pub async fn remove_change_feed(&self, consumer_name: &str) -> Result<()> {
        self.table
            .remove_change_feed(&self.config.table_name, consumer_name)
            .await
    }

    pub fn config(&self) -> &EventStoreConfig {
        &self.config
    }

    pub fn table_name(&self) -> &str {
        &self.config.table_name
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.config.ttl_seconds
    }

    /// Get a reference to the backing table
    pub fn table(&self) -> &dyn EventTable {
        self.table.as_ref()
    }
}

#[async_trait]
impl EventPublisher for EventStore {
    async fn publish(&self, event: EventPayload) -> Result<EventId> {
        EventStore::publish(self, event).await
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
