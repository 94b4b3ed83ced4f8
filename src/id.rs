//! Sortable event identifiers
//!
//! Ids are UUIDv7 values: a 48-bit unix-millisecond prefix followed by
//! random bits. The hyphenated lowercase form is fixed width, so ordering
//! the strings orders the events by publish time without any central
//! sequencer.

use crate::error::{EventError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Globally unique, lexicographically sortable event identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId(Uuid);

impl EventId {
    /// Generate a new identifier for the current instant
    ///
    /// Within one process, successive ids are strictly increasing even when
    /// generated in the same millisecond. Across processes the random tail
    /// keeps them distinct.
    pub fn generate() -> Self {
        Self(Uuid::now_v7())
    }

    /// Parse an identifier from its string form
    pub fn parse(s: &str) -> Result<Self> {
        let uuid = Uuid::parse_str(s).map_err(|e| EventError::InvalidId {
            id: s.to_string(),
            reason: e.to_string(),
        })?;

        if uuid.get_version_num() != 7 {
            return Err(EventError::InvalidId {
                id: s.to_string(),
                reason: format!("expected a v7 uuid, got v{}", uuid.get_version_num()),
            });
        }

        Ok(Self(uuid))
    }

    /// Unix timestamp in milliseconds embedded in the id
    pub fn timestamp_millis(&self) -> u64 {
        self.0
            .get_timestamp()
            .map(|ts| {
                let (secs, nanos) = ts.to_unix();
                secs * 1000 + u64::from(nanos) / 1_000_000
            })
            .unwrap_or_default()
    }

    /// The underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl FromStr for EventId {
    type Err = EventError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl Serialize for EventId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EventId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
