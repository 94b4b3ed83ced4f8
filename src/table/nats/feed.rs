//! Change feed over a JetStream pull consumer

use crate::error::{EventError, Result};
use crate::table::ChangeFeed;
use crate::types::{ChangeEvent, EventRecord};
use async_nats::jetstream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;

/// Insert notifications for one table, backed by an ephemeral consumer
///
/// Each message is acked once it has been handed to the caller.
pub struct NatsChangeFeed {
    messages: BoxStream<'static, Result<jetstream::Message>>,
    table: String,
}

impl NatsChangeFeed {
    pub(crate) fn new(messages: jetstream::consumer::pull::Stream, table: &str) -> Self {
        let messages = messages
            .map(|msg| msg.map_err(|e| EventError::ChangeFeed(e.to_string())))
            .boxed();

        Self {
            messages,
            table: table.to_string(),
        }
    }
}

#[async_trait]
impl ChangeFeed for NatsChangeFeed {
    async fn next(&mut self) -> Result<Option<ChangeEvent>> {
        while let Some(msg) = self.messages.next().await {
            let msg = msg?;

            let sequence = msg.info().map(|info| info.stream_sequence).unwrap_or_default();

            let record = match serde_json::from_slice::<EventRecord>(&msg.payload) {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(
                        table = %self.table,
                        sequence,
                        error = %e,
                        "Skipping malformed record on change feed"
                    );
                    msg.ack()
                        .await
                        .map_err(|e| EventError::ChangeFeed(format!("ack failed: {}", e)))?;
                    continue;
                }
            };

            msg.ack()
                .await
                .map_err(|e| EventError::ChangeFeed(format!("ack failed: {}", e)))?;

            return Ok(Some(ChangeEvent {
                table: self.table.clone(),
                sequence,
                record,
            }));
        }

        Ok(None)
    }
}
