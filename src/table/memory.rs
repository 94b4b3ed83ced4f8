//! In-memory event table for testing and single-process use
//!
//! Records live in per-table `BTreeMap`s keyed by id, so scans come back in
//! publish order. Every insert is appended to an insert log and broadcast
//! on an in-process change feed; durable feeds replay the log from their
//! saved position. Backend failures can be simulated to exercise the error
//! paths of the write path without a real store.

use super::{ChangeFeed, EventTable};
use crate::config::validate_name;
use crate::error::{EventError, Result};
use crate::id::EventId;
use crate::types::{ChangeEvent, EventRecord};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Configuration for the in-memory table
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Change feed buffer; an ephemeral feed that falls further behind fails
    pub feed_capacity: usize,

    /// Largest accepted serialized item, in bytes (`None` = unlimited)
    pub max_item_bytes: Option<usize>,

    /// Retention to report as a backend-wide expiry (`None` = per-record ttl)
    pub retention_secs: Option<u64>,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            feed_capacity: 1024,
            max_item_bytes: Some(400 * 1024),
            retention_secs: None,
        }
    }
}

/// Backend failure to inject into subsequent writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedFailure {
    /// Store cannot be reached
    Unreachable,
    /// Store is over capacity
    Throttled,
    /// Credentials lack write permission
    PermissionDenied,
}

#[derive(Default)]
struct State {
    /// table name → (id → record)
    tables: HashMap<String, BTreeMap<EventId, EventRecord>>,

    /// Every retained insert, ordered by sequence
    log: Vec<ChangeEvent>,

    last_sequence: u64,
}

/// (table, consumer) → last delivered sequence
type Cursors = HashMap<(String, String), u64>;

/// In-memory event table
pub struct MemoryTable {
    config: MemoryConfig,

    state: Arc<RwLock<State>>,

    cursors: Arc<RwLock<Cursors>>,

    feed: broadcast::Sender<ChangeEvent>,

    failure: RwLock<Option<SimulatedFailure>>,
}

impl MemoryTable {
    pub fn new(config: MemoryConfig) -> Self {
        let (feed, _) = broadcast::channel(config.feed_capacity.max(1));
        Self {
            config,
            state: Arc::new(RwLock::new(State::default())),
            cursors: Arc::new(RwLock::new(HashMap::new())),
            feed,
            failure: RwLock::new(None),
        }
    }

    /// Make subsequent operations fail (or succeed again with `None`)
    pub async fn set_failure(&self, failure: Option<SimulatedFailure>) {
        *self.failure.write().await = failure;
    }

    /// Look up a record by id
    pub async fn get(&self, table_name: &str, id: &EventId) -> Option<EventRecord> {
        let state = self.state.read().await;
        state.tables.get(table_name).and_then(|t| t.get(id)).cloned()
    }

    /// All records in a table, in id order
    pub async fn scan(&self, table_name: &str) -> Vec<EventRecord> {
        let state = self.state.read().await;
        state
            .tables
            .get(table_name)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of records in a table
    pub async fn len(&self, table_name: &str) -> usize {
        let state = self.state.read().await;
        state.tables.get(table_name).map(|t| t.len()).unwrap_or(0)
    }

    pub async fn is_empty(&self, table_name: &str) -> bool {
        self.len(table_name).await == 0
    }

    /// Remove every record whose ttl has passed, returning how many went
    ///
    /// Stands in for the backing store's own expiry sweep. Removals are not
    /// published on the change feed, and durable feeds that had not reached
    /// an expired insert never see it.
    pub async fn purge_expired(&self, now_secs: u64) -> usize {
        let mut state = self.state.write().await;
        let mut removed = 0;
        for records in state.tables.values_mut() {
            let before = records.len();
            records.retain(|_, record| !record.is_expired(now_secs));
            removed += before - records.len();
        }
        state.log.retain(|change| !change.record.is_expired(now_secs));

        if removed > 0 {
            tracing::debug!(removed, now = now_secs, "Expired events purged");
        }
        removed
    }

    async fn check_failure(&self, table_name: &str) -> Result<()> {
        match *self.failure.read().await {
            None => Ok(()),
            Some(SimulatedFailure::Unreachable) => Err(EventError::Connection(
                "memory table unreachable".to_string(),
            )),
            Some(SimulatedFailure::Throttled) => Err(EventError::Throttled {
                table: table_name.to_string(),
                reason: "provisioned throughput exceeded".to_string(),
            }),
            Some(SimulatedFailure::PermissionDenied) => Err(EventError::PermissionDenied(
                format!("not authorized to write to '{}'", table_name),
            )),
        }
    }
}

impl Default for MemoryTable {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

#[async_trait]
impl EventTable for MemoryTable {
    async fn put(&self, table_name: &str, record: &EventRecord) -> Result<()> {
        self.check_failure(table_name).await?;

        if let Some(max) = self.config.max_item_bytes {
            let size = serde_json::to_vec(record)?.len();
            if size > max {
                return Err(EventError::Write {
                    table: table_name.to_string(),
                    reason: format!("item size {} exceeds limit of {} bytes", size, max),
                });
            }
        }

        let mut state = self.state.write().await;
        let records = state.tables.entry(table_name.to_string()).or_default();

        if records.contains_key(record.id()) {
            return Err(EventError::Write {
                table: table_name.to_string(),
                reason: format!("item with id '{}' already exists", record.id()),
            });
        }
        records.insert(*record.id(), record.clone());

        // Sequenced under the write lock so feed order matches insert order
        state.last_sequence += 1;
        let change = ChangeEvent {
            table: table_name.to_string(),
            sequence: state.last_sequence,
            record: record.clone(),
        };
        state.log.push(change.clone());
        let _ = self.feed.send(change);

        Ok(())
    }

    async fn change_feed(&self, table_name: &str) -> Result<Box<dyn ChangeFeed>> {
        self.check_failure(table_name).await?;

        Ok(Box::new(MemoryChangeFeed {
            table: table_name.to_string(),
            stream: BroadcastStream::new(self.feed.subscribe()),
        }))
    }

    async fn durable_change_feed(
        &self,
        table_name: &str,
        consumer_name: &str,
    ) -> Result<Box<dyn ChangeFeed>> {
        validate_name("consumer name", consumer_name)?;
        self.check_failure(table_name).await?;

        tracing::debug!(
            table = table_name,
            consumer = consumer_name,
            "Durable change feed opened"
        );

        Ok(Box::new(MemoryDurableChangeFeed {
            key: (table_name.to_string(), consumer_name.to_string()),
            state: self.state.clone(),
            cursors: self.cursors.clone(),
            wakeup: self.feed.subscribe(),
        }))
    }

    async fn remove_change_feed(&self, table_name: &str, consumer_name: &str) -> Result<()> {
        self.check_failure(table_name).await?;
        self.cursors
            .write()
            .await
            .remove(&(table_name.to_string(), consumer_name.to_string()));
        Ok(())
    }

    fn retention_secs(&self) -> Option<u64> {
        self.config.retention_secs
    }

    fn name(&self) -> &str {
        "memory"
    }

    async fn health(&self) -> Result<bool> {
        Ok(*self.failure.read().await != Some(SimulatedFailure::Unreachable))
    }
}

/// Live change feed over a `MemoryTable`, filtered to one table
///
/// Fails with `EventError::ChangeFeed` once it falls more than
/// `feed_capacity` inserts behind; reopen it (or use a durable feed) to
/// resynchronize.
pub struct MemoryChangeFeed {
    table: String,
    stream: BroadcastStream<ChangeEvent>,
}

#[async_trait]
impl ChangeFeed for MemoryChangeFeed {
    async fn next(&mut self) -> Result<Option<ChangeEvent>> {
        while let Some(item) = self.stream.next().await {
            match item {
                Ok(change) if change.table == self.table => return Ok(Some(change)),
                Ok(_) => continue,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        table = %self.table,
                        skipped,
                        "Change feed lagged, inserts skipped"
                    );
                    return Err(EventError::ChangeFeed(format!(
                        "lagged, {} inserts skipped",
                        skipped
                    )));
                }
            }
        }
        Ok(None)
    }
}

/// Named change feed that replays the insert log from its saved position
pub struct MemoryDurableChangeFeed {
    key: (String, String),
    state: Arc<RwLock<State>>,
    cursors: Arc<RwLock<Cursors>>,
    wakeup: broadcast::Receiver<ChangeEvent>,
}

impl MemoryDurableChangeFeed {
    async fn next_after_cursor(&self) -> Option<ChangeEvent> {
        let mut cursors = self.cursors.write().await;
        let cursor = cursors.get(&self.key).copied().unwrap_or(0);

        let state = self.state.read().await;
        let start = state.log.partition_point(|c| c.sequence <= cursor);
        let change = state.log[start..]
            .iter()
            .find(|c| c.table == self.key.0)
            .cloned()?;

        cursors.insert(self.key.clone(), change.sequence);
        Some(change)
    }
}

#[async_trait]
impl ChangeFeed for MemoryDurableChangeFeed {
    async fn next(&mut self) -> Result<Option<ChangeEvent>> {
        loop {
            if let Some(change) = self.next_after_cursor().await {
                return Ok(Some(change));
            }

            // Only a wake-up signal; the log is the source of truth
            match self.wakeup.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventPayload;
    use serde_json::json;

    fn record(ttl: u64, fields: serde_json::Value) -> EventRecord {
        let payload: EventPayload = fields.as_object().cloned().unwrap();
        EventRecord::build(EventId::generate(), ttl, payload).unwrap()
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let table = MemoryTable::default();
        let r = record(100, json!({"type": "A"}));

        table.put("Events", &r).await.unwrap();

        assert_eq!(table.get("Events", r.id()).await, Some(r.clone()));
        assert_eq!(table.len("Events").await, 1);
        assert!(table.is_empty("Other").await);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let table = MemoryTable::default();
        let r = record(100, json!({"n": 1}));

        table.put("Events", &r).await.unwrap();
        let err = table.put("Events", &r).await.unwrap_err();
        assert!(matches!(err, EventError::Write { .. }));
        assert_eq!(table.len("Events").await, 1);
    }

    #[tokio::test]
    async fn test_scan_in_id_order() {
        let table = MemoryTable::default();
        let records: Vec<EventRecord> = (0..10).map(|i| record(100, json!({"i": i}))).collect();

        for r in records.iter().rev() {
            table.put("Events", r).await.unwrap();
        }

        let scanned = table.scan("Events").await;
        assert_eq!(scanned, records);
    }

    #[tokio::test]
    async fn test_simulated_failures() {
        let table = MemoryTable::default();
        let r = record(100, json!({}));

        table.set_failure(Some(SimulatedFailure::Unreachable)).await;
        assert!(matches!(
            table.put("Events", &r).await,
            Err(EventError::Connection(_))
        ));
        assert!(!table.health().await.unwrap());

        table.set_failure(Some(SimulatedFailure::Throttled)).await;
        assert!(matches!(
            table.put("Events", &r).await,
            Err(EventError::Throttled { .. })
        ));

        table.set_failure(Some(SimulatedFailure::PermissionDenied)).await;
        assert!(matches!(
            table.put("Events", &r).await,
            Err(EventError::PermissionDenied(_))
        ));

        assert!(table.is_empty("Events").await);

        table.set_failure(None).await;
        table.put("Events", &r).await.unwrap();
        assert!(table.health().await.unwrap());
    }

    #[tokio::test]
    async fn test_oversized_item_rejected() {
        let table = MemoryTable::new(MemoryConfig {
            max_item_bytes: Some(64),
            ..Default::default()
        });
        let r = record(100, json!({"text": "x".repeat(128)}));

        let err = table.put("Events", &r).await.unwrap_err();
        assert!(matches!(err, EventError::Write { .. }));
        assert!(table.is_empty("Events").await);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let table = MemoryTable::default();
        table.put("Events", &record(100, json!({"a": 1}))).await.unwrap();
        table.put("Events", &record(200, json!({"b": 2}))).await.unwrap();
        table.put("Other", &record(150, json!({"c": 3}))).await.unwrap();

        assert_eq!(table.purge_expired(99).await, 0);
        assert_eq!(table.purge_expired(150).await, 2);
        assert_eq!(table.len("Events").await, 1);
        assert_eq!(table.len("Other").await, 0);
    }

    #[tokio::test]
    async fn test_change_feed_filters_by_table() {
        let table = MemoryTable::default();
        let mut feed = table.change_feed("Events").await.unwrap();

        let other = record(100, json!({"skip": true}));
        let wanted = record(100, json!({"keep": true}));
        table.put("Other", &other).await.unwrap();
        table.put("Events", &wanted).await.unwrap();

        let change = feed.next().await.unwrap().unwrap();
        assert_eq!(change.table, "Events");
        assert_eq!(change.record, wanted);
        assert_eq!(change.sequence, 2);
    }

    #[tokio::test]
    async fn test_change_feed_ignores_purge() {
        let table = MemoryTable::default();
        let mut feed = table.change_feed("Events").await.unwrap();

        table.put("Events", &record(10, json!({"n": 1}))).await.unwrap();
        table.purge_expired(20).await;
        table.put("Events", &record(30, json!({"n": 2}))).await.unwrap();

        let first = feed.next().await.unwrap().unwrap();
        let second = feed.next().await.unwrap().unwrap();
        assert_eq!(first.record.payload()["n"], 1);
        assert_eq!(second.record.payload()["n"], 2);
    }

    #[tokio::test]
    async fn test_lagging_feed_reports_skipped_inserts() {
        let table = MemoryTable::new(MemoryConfig {
            feed_capacity: 4,
            ..Default::default()
        });
        let mut feed = table.change_feed("Events").await.unwrap();

        for i in 0..10 {
            table.put("Events", &record(100, json!({"i": i}))).await.unwrap();
        }

        let err = feed.next().await.unwrap_err();
        assert!(matches!(err, EventError::ChangeFeed(ref msg) if msg.contains("6 inserts skipped")));

        // After reporting the gap the feed carries on with what it still holds
        let change = feed.next().await.unwrap().unwrap();
        assert_eq!(change.record.payload()["i"], 6);
    }

    #[tokio::test]
    async fn test_durable_feed_resumes_after_reopen() {
        let table = MemoryTable::default();
        for i in 0..3 {
            table.put("Events", &record(100, json!({"i": i}))).await.unwrap();
        }

        let mut feed = table.durable_change_feed("Events", "fanout").await.unwrap();
        assert_eq!(feed.next().await.unwrap().unwrap().record.payload()["i"], 0);
        assert_eq!(feed.next().await.unwrap().unwrap().record.payload()["i"], 1);
        drop(feed);

        // Written while no processor was running
        for i in 3..5 {
            table.put("Events", &record(100, json!({"i": i}))).await.unwrap();
        }

        let mut feed = table.durable_change_feed("Events", "fanout").await.unwrap();
        for expected in 2..5 {
            let change = feed.next().await.unwrap().unwrap();
            assert_eq!(change.record.payload()["i"], expected);
        }
    }

    #[tokio::test]
    async fn test_durable_feed_waits_for_new_inserts() {
        let table = Arc::new(MemoryTable::default());
        let mut feed = table.durable_change_feed("Events", "fanout").await.unwrap();

        let writer = table.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            writer.put("Other", &record(100, json!({"skip": true}))).await.unwrap();
            writer.put("Events", &record(100, json!({"keep": true}))).await.unwrap();
        });

        let change = tokio::time::timeout(std::time::Duration::from_secs(2), feed.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(change.table, "Events");
        assert_eq!(change.record.payload()["keep"], true);
    }

    #[tokio::test]
    async fn test_durable_feeds_are_independent() {
        let table = MemoryTable::default();
        table.put("Events", &record(100, json!({"i": 0}))).await.unwrap();

        let mut a = table.durable_change_feed("Events", "a").await.unwrap();
        let mut b = table.durable_change_feed("Events", "b").await.unwrap();
        assert_eq!(a.next().await.unwrap().unwrap().record.payload()["i"], 0);
        assert_eq!(b.next().await.unwrap().unwrap().record.payload()["i"], 0);
    }

    #[tokio::test]
    async fn test_remove_change_feed_restarts_position() {
        let table = MemoryTable::default();
        table.put("Events", &record(100, json!({"i": 0}))).await.unwrap();

        let mut feed = table.durable_change_feed("Events", "fanout").await.unwrap();
        feed.next().await.unwrap().unwrap();
        drop(feed);

        table.remove_change_feed("Events", "fanout").await.unwrap();
        let mut feed = table.durable_change_feed("Events", "fanout").await.unwrap();
        assert_eq!(feed.next().await.unwrap().unwrap().record.payload()["i"], 0);
    }

    #[tokio::test]
    async fn test_durable_feed_skips_purged_inserts() {
        let table = MemoryTable::default();
        table.put("Events", &record(10, json!({"i": 0}))).await.unwrap();
        table.put("Events", &record(100, json!({"i": 1}))).await.unwrap();
        table.purge_expired(50).await;

        let mut feed = table.durable_change_feed("Events", "fanout").await.unwrap();
        assert_eq!(feed.next().await.unwrap().unwrap().record.payload()["i"], 1);
    }

    #[tokio::test]
    async fn test_durable_feed_rejects_bad_consumer_name() {
        let table = MemoryTable::default();
        let result = table.durable_change_feed("Events", "fan.out").await;
        assert!(matches!(result, Err(EventError::Config(_))));
    }

    #[test]
    fn test_retention_reported_from_config() {
        assert_eq!(MemoryTable::default().retention_secs(), None);

        let table = MemoryTable::new(MemoryConfig {
            retention_secs: Some(3600),
            ..Default::default()
        });
        assert_eq!(table.retention_secs(), Some(3600));
    }
}
