//! # a3s-event-store
//!
//! Append-only event store for serverless publish/subscribe.
//!
//! ## Overview
//!
//! Producers hand an event to [`EventStore::publish`]. The store stamps it
//! with a globally unique, time-sortable id and an absolute expiry, writes it
//! as one flat record, and returns once the backing table acknowledges the
//! insert. Fan-out to subscribers happens elsewhere: an event processor
//! consumes the table's change feed of inserts.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_event_store::{EventStore, EventStoreConfig, MemoryTable};
//! use std::sync::Arc;
//!
//! # async fn example() -> a3s_event_store::Result<()> {
//! let table = Arc::new(MemoryTable::default());
//! let store = EventStore::new(table, EventStoreConfig::default().with_ttl_seconds(100))?;
//!
//! let id = store
//!     .publish_json(serde_json::json!({"type": "MESSAGE_ADDED", "text": "hi"}))
//!     .await?;
//!
//! println!("Stored: {}", id);
//! # Ok(())
//! # }
//! ```
//!
//! ## Record shape
//!
//! `{ "id": <sortable id>, "ttl": <unix seconds>, ...producer fields }`.
//! Producer payloads may not contain `id` or `ttl`.
//!
//! ## Backends
//!
//! - **memory** — in-process table for tests and single-process use
//! - **nats** — NATS JetStream, with stream retention as the expiry mechanism

pub mod clock;
pub mod config;
pub mod error;
pub mod id;
pub mod store;
pub mod table;
pub mod types;

// Re-export core types
pub use clock::{compute_ttl, Clock, FixedClock, SystemClock};
pub use config::{EventStoreConfig, DEFAULT_TABLE_NAME, DEFAULT_TTL_SECONDS};
pub use error::{EventError, Result};
pub use id::EventId;
pub use store::{EventPublisher, EventStore};
pub use table::{ChangeFeed, EventTable};
pub use types::{ChangeEvent, EventPayload, EventRecord, ID_FIELD, RESERVED_FIELDS, TTL_FIELD};

// Re-export backends for convenience
pub use table::memory::{MemoryConfig, MemoryTable, SimulatedFailure};
pub use table::nats::{NatsClient, NatsConfig, NatsTable, StorageType};
