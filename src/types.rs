//! Core record types for the event store
//!
//! A stored record is flat: the store-owned `id` and `ttl` fields sit next
//! to the producer's own fields, which are passed through verbatim.

use crate::error::{EventError, Result};
use crate::id::EventId;
use serde::{Deserialize, Serialize};

/// Producer-defined event fields
///
/// The store does not interpret these beyond requiring a field mapping.
pub type EventPayload = serde_json::Map<String, serde_json::Value>;

/// Field holding the store-generated identifier
pub const ID_FIELD: &str = "id";

/// Field holding the absolute expiry (unix seconds)
pub const TTL_FIELD: &str = "ttl";

/// Field names owned by the store; producers may not use them
pub const RESERVED_FIELDS: [&str; 2] = [ID_FIELD, TTL_FIELD];

/// A single persisted event
///
/// Serializes as `{ "id": ..., "ttl": ..., <payload fields> }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    id: EventId,

    ttl: u64,

    #[serde(flatten)]
    payload: EventPayload,
}

impl EventRecord {
    /// Assemble a record, rejecting payloads that use a reserved field
    pub fn build(id: EventId, ttl: u64, payload: EventPayload) -> Result<Self> {
        if let Some(field) = RESERVED_FIELDS.iter().find(|f| payload.contains_key(**f)) {
            return Err(EventError::ReservedField {
                field: (*field).to_string(),
            });
        }

        Ok(Self { id, ttl, payload })
    }

    pub fn id(&self) -> &EventId {
        &self.id
    }

    /// Absolute expiry, unix seconds
    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    pub fn payload(&self) -> &EventPayload {
        &self.payload
    }

    /// Whether the record is past its expiry at `now_secs`
    pub fn is_expired(&self, now_secs: u64) -> bool {
        self.ttl <= now_secs
    }

    /// Render the flat item written to the backing table
    pub fn to_item(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut item = serde_json::Map::with_capacity(self.payload.len() + 2);
        item.insert(ID_FIELD.to_string(), self.id.to_string().into());
        item.insert(TTL_FIELD.to_string(), self.ttl.into());
        item.extend(self.payload.iter().map(|(k, v)| (k.clone(), v.clone())));
        item
    }

    /// Parse a flat item read back from the backing table
    pub fn from_item(item: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(item)?)
    }
}

/// An insert notification delivered on a table's change feed
///
/// Inserts are the only mutation a change feed ever carries.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Table the record was written to
    pub table: String,

    /// Backend-assigned position in the feed
    pub sequence: u64,

    /// The inserted record
    pub record: EventRecord,
}
