//! NATS JetStream client — connect, insert, change feed

use super::config::{NatsConfig, StorageType};
use super::feed::NatsChangeFeed;
use crate::config::validate_name;
use crate::error::{EventError, Result};
use crate::types::EventRecord;
use async_nats::ConnectErrorKind;
use async_nats::jetstream;
use async_nats::jetstream::context::{PublishError, PublishErrorKind};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// NATS JetStream client
///
/// Owns the connection and the JetStream stream that holds every event
/// table. Cheap to share behind an `Arc`.
pub struct NatsClient {
    /// NATS client connection
    client: async_nats::Client,

    /// JetStream context
    jetstream: jetstream::Context,

    /// JetStream stream handle (Mutex for methods requiring &mut self)
    stream: Mutex<jetstream::stream::Stream>,

    /// Configuration
    config: Arc<NatsConfig>,
}

impl NatsClient {
    /// Connect to NATS and initialize the JetStream stream
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        let connect_opts = build_connect_options(&config);

        let client = connect_opts
            .connect(&config.url)
            .await
            .map_err(|e| match e.kind() {
                ConnectErrorKind::Authentication | ConnectErrorKind::AuthorizationViolation => {
                    EventError::PermissionDenied(format!("{}: {}", config.url, e))
                }
                _ => EventError::Connection(format!("{}: {}", config.url, e)),
            })?;

        tracing::info!(url = %config.url, "Connected to NATS");

        let jetstream = jetstream::new(client.clone());
        let stream = ensure_stream(&jetstream, &config).await?;

        Ok(Self {
            client,
            jetstream,
            stream: Mutex::new(stream),
            config: Arc::new(config),
        })
    }

    /// Insert a record, returning the JetStream sequence number
    ///
    /// Resolves once the server acks the write. The record id doubles as the
    /// `Nats-Msg-Id`, so putting the same record again inside the duplicate
    /// window is dropped by the server instead of stored twice.
    pub async fn put(&self, table_name: &str, record: &EventRecord) -> Result<u64> {
        let subject = self.config.table_subject(table_name);
        let payload = Bytes::from(serde_json::to_vec(record)?);

        let mut headers = async_nats::HeaderMap::new();
        headers.insert("Nats-Msg-Id", record.id().to_string().as_str());

        let ack = self
            .jetstream
            .publish_with_headers(subject.clone(), headers, payload)
            .await
            .map_err(|e| map_publish_error(table_name, e))?
            .await
            .map_err(|e| map_publish_error(table_name, e))?;

        if ack.duplicate {
            tracing::warn!(
                event_id = %record.id(),
                table = table_name,
                "Record already stored, duplicate dropped"
            );
        }

        tracing::debug!(
            event_id = %record.id(),
            subject = %subject,
            ttl = record.ttl(),
            sequence = ack.sequence,
            "Event stored"
        );

        Ok(ack.sequence)
    }

    /// Open a change feed of records inserted into `table_name` from now on
    pub async fn change_feed(&self, table_name: &str) -> Result<NatsChangeFeed> {
        let filter_subject = self.config.table_subject(table_name);

        let consumer = self
            .stream
            .lock()
            .await
            .create_consumer(jetstream::consumer::pull::Config {
                filter_subject: filter_subject.clone(),
                ack_policy: jetstream::consumer::AckPolicy::Explicit,
                deliver_policy: jetstream::consumer::DeliverPolicy::New,
                ..Default::default()
            })
            .await
            .map_err(|e| EventError::ChangeFeed(format!(
                "Failed to create change feed consumer for '{}': {}",
                filter_subject, e
            )))?;

        let messages = consumer.messages().await.map_err(|e| {
            EventError::ChangeFeed(format!(
                "Failed to open change feed for '{}': {}",
                filter_subject, e
            ))
        })?;

        tracing::info!(table = table_name, filter = %filter_subject, "Change feed opened");

        Ok(NatsChangeFeed::new(messages, table_name))
    }

    /// Open (or resume) a durable change feed for `table_name`
    ///
    /// Backed by a durable pull consumer named `<table>-<consumer>`. The
    /// server keeps its ack position, so reopening under the same name
    /// continues after the last record this feed handed out. A new consumer
    /// starts at the oldest record still retained.
    pub async fn durable_change_feed(
        &self,
        table_name: &str,
        consumer_name: &str,
    ) -> Result<NatsChangeFeed> {
        validate_name("consumer name", consumer_name)?;

        let filter_subject = self.config.table_subject(table_name);
        let durable_name = durable_consumer_name(table_name, consumer_name);

        let consumer = self
            .stream
            .lock()
            .await
            .get_or_create_consumer(
                &durable_name,
                jetstream::consumer::pull::Config {
                    durable_name: Some(durable_name.clone()),
                    filter_subject: filter_subject.clone(),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    deliver_policy: jetstream::consumer::DeliverPolicy::All,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| EventError::ChangeFeed(format!(
                "Failed to create durable consumer '{}': {}",
                durable_name, e
            )))?;

        let messages = consumer.messages().await.map_err(|e| {
            EventError::ChangeFeed(format!(
                "Failed to open change feed for '{}': {}",
                filter_subject, e
            ))
        })?;

        tracing::info!(
            table = table_name,
            consumer = %durable_name,
            filter = %filter_subject,
            "Durable change feed opened"
        );

        Ok(NatsChangeFeed::new(messages, table_name))
    }

    /// Delete the durable consumer behind a named change feed
    pub async fn remove_change_feed(&self, table_name: &str, consumer_name: &str) -> Result<()> {
        let durable_name = durable_consumer_name(table_name, consumer_name);

        self.stream
            .lock()
            .await
            .delete_consumer(&durable_name)
            .await
            .map_err(|e| EventError::ChangeFeed(format!(
                "Failed to delete consumer '{}': {}",
                durable_name, e
            )))?;

        tracing::info!(consumer = %durable_name, "Durable change feed removed");
        Ok(())
    }

    /// Get stream info
    pub async fn stream_info(&self) -> Result<StreamInfo> {
        let mut stream = self.stream.lock().await;
        let info = stream
            .info()
            .await
            .map_err(|e| EventError::Stream(format!("Failed to get stream info: {}", e)))?;

        Ok(StreamInfo {
            messages: info.state.messages,
            bytes: info.state.bytes,
            first_sequence: info.state.first_sequence,
            last_sequence: info.state.last_sequence,
        })
    }

    /// Whether the underlying connection is currently up
    pub fn is_connected(&self) -> bool {
        self.client.connection_state() == async_nats::connection::State::Connected
    }

    /// Get the underlying NATS client
    pub fn nats_client(&self) -> &async_nats::Client {
        &self.client
    }

    /// Get the configuration
    pub fn config(&self) -> &NatsConfig {
        &self.config
    }
}

/// Summary of stream state
#[derive(Debug, Clone)]
pub struct StreamInfo {
    pub messages: u64,
    pub bytes: u64,
    pub first_sequence: u64,
    pub last_sequence: u64,
}

fn durable_consumer_name(table_name: &str, consumer_name: &str) -> String {
    format!("{}-{}", table_name, consumer_name)
}

/// Classify a JetStream publish failure
fn map_publish_error(table_name: &str, e: PublishError) -> EventError {
    match e.kind() {
        PublishErrorKind::TimedOut => EventError::Timeout(format!(
            "Write ack timed out for table '{}'",
            table_name
        )),
        PublishErrorKind::BrokenPipe => EventError::Connection(e.to_string()),
        _ => EventError::Write {
            table: table_name.to_string(),
            reason: e.to_string(),
        },
    }
}

/// Build NATS connect options from config
fn build_connect_options(config: &NatsConfig) -> async_nats::ConnectOptions {
    let mut opts = async_nats::ConnectOptions::new()
        .connection_timeout(Duration::from_secs(config.connect_timeout_secs))
        .request_timeout(Some(Duration::from_secs(config.request_timeout_secs)));

    if let Some(ref token) = config.token {
        opts = opts.token(token.clone());
    }

    opts
}

/// Ensure the JetStream stream exists with the correct configuration
async fn ensure_stream(
    js: &jetstream::Context,
    config: &NatsConfig,
) -> Result<jetstream::stream::Stream> {
    let storage = match config.storage {
        StorageType::File => jetstream::stream::StorageType::File,
        StorageType::Memory => jetstream::stream::StorageType::Memory,
    };

    let stream_config = jetstream::stream::Config {
        name: config.stream_name.clone(),
        subjects: config.stream_subjects(),
        storage,
        max_messages: config.max_events,
        max_age: Duration::from_secs(config.max_age_secs),
        max_bytes: config.max_bytes,
        duplicate_window: Duration::from_secs(config.duplicate_window_secs),
        retention: jetstream::stream::RetentionPolicy::Limits,
        ..Default::default()
    };

    let stream = js
        .get_or_create_stream(stream_config)
        .await
        .map_err(|e| EventError::Stream(format!(
            "Failed to create/get stream '{}': {}",
            config.stream_name, e
        )))?;

    tracing::info!(
        stream = %config.stream_name,
        subjects = ?config.stream_subjects(),
        max_age_secs = config.max_age_secs,
        "JetStream stream ready"
    );

    Ok(stream)
}
