//! Event table trait — the abstraction over backing stores
//!
//! A backend provides exactly two things: an unconditional insert of a
//! flat record, and a change feed of those inserts for the downstream
//! event processor. Backends never update or delete records themselves;
//! expiry is left to the store's own retention mechanism.

use crate::error::Result;
use crate::types::{ChangeEvent, EventRecord};
use async_trait::async_trait;

pub mod memory;
pub mod nats;

/// Core trait for backing tables
#[async_trait]
pub trait EventTable: Send + Sync {
    /// Insert a record, resolving once the backend acknowledges durability
    ///
    /// A single write keyed by the record id. No read-before-write and no
    /// internal retry.
    async fn put(&self, table_name: &str, record: &EventRecord) -> Result<()>;

    /// Open a feed of records inserted into `table_name` from now on
    ///
    /// The feed is read-only; consuming it never writes back to the table.
    async fn change_feed(&self, table_name: &str) -> Result<Box<dyn ChangeFeed>>;

    /// Open a named feed that resumes after the last insert it delivered
    ///
    /// The position is kept by the backend under `consumer_name`, so a
    /// processor that restarts picks up every insert made while it was
    /// away. A name seen for the first time starts at the oldest retained
    /// insert.
    async fn durable_change_feed(
        &self,
        table_name: &str,
        consumer_name: &str,
    ) -> Result<Box<dyn ChangeFeed>>;

    /// Forget a durable feed position
    async fn remove_change_feed(&self, table_name: &str, consumer_name: &str) -> Result<()>;

    /// How long the backend keeps a record before expiring it on its own
    ///
    /// `None` when the backend honours each record's `ttl` or never expires.
    fn retention_secs(&self) -> Option<u64> {
        None
    }

    /// Backend name (e.g., "memory", "nats")
    fn name(&self) -> &str;

    /// Health check — returns true if the backend is reachable
    async fn health(&self) -> Result<bool>;
}

/// Async stream of insert notifications
#[async_trait]
pub trait ChangeFeed: Send {
    /// Receive the next inserted record, or `None` once the feed closes
    async fn next(&mut self) -> Result<Option<ChangeEvent>>;
}
