//! Message bus client: topic registry, JSON producer and the consumer loop.
//!
//! Delivery is at-least-once. The consumer commits offsets manually after a
//! handler runs to a terminal outcome; handlers own their retries and
//! dead-lettering, so by the time control returns here the message is done —
//! the one exception is a handler abandoned mid-flight by shutdown, whose
//! offset is left uncommitted for redelivery.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::Message;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::{PipelineError, Result};
use crate::recovery::{retry_until_cancelled, RetryConfig};

/// Fixed topic names for the usage pipeline.
pub mod topics {
    pub const RAW_SPOTIFY: &str = "usage.raw.spotify";
    pub const RAW_APPLE_MUSIC: &str = "usage.raw.apple_music";
    pub const RAW_RADIO: &str = "usage.raw.radio";
    pub const RAW_GENERIC: &str = "usage.raw.generic";

    pub const NORMALIZED: &str = "usage.normalized";
    pub const MATCHED: &str = "usage.matched";
    pub const UNMATCHED: &str = "usage.unmatched";

    pub const DLQ_PROCESSING: &str = "dlq.usage.processing";
    pub const DLQ_MATCHING: &str = "dlq.matching";

    /// All raw ingestion topics, in subscription order.
    pub const RAW_TOPICS: [&str; 4] = [RAW_SPOTIFY, RAW_APPLE_MUSIC, RAW_RADIO, RAW_GENERIC];

    /// Derive the source tag from a raw topic. Unknown topics map to
    /// `unknown`, which routes to the generic normalizer.
    pub fn source_for_topic(topic: &str) -> &'static str {
        match topic {
            RAW_SPOTIFY => "spotify",
            RAW_APPLE_MUSIC => "apple_music",
            RAW_RADIO => "radio",
            RAW_GENERIC => "generic",
            _ => "unknown",
        }
    }
}

/// Per-message processing contract.
///
/// Implementations must run each message to a terminal outcome: perform
/// their own bounded retries and dead-lettering, and reserve `Err` for
/// failures that should surface in the consumer log (the offset is still
/// committed unless the worker is shutting down).
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, topic: &str, key: Option<&str>, payload: serde_json::Value)
        -> Result<()>;
}

/// JSON producer over the bus; cheap to clone, safe for concurrent sends.
#[derive(Clone)]
pub struct EventProducer {
    inner: FutureProducer,
}

impl EventProducer {
    pub fn new(brokers: &str) -> std::result::Result<Self, KafkaError> {
        let inner = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "10000")
            .set("socket.keepalive.enable", "true")
            .create()?;
        Ok(Self { inner })
    }

    /// Publish a JSON value, keyed when the caller has a partition key.
    pub async fn send_json<T: Serialize>(
        &self,
        topic: &str,
        key: Option<&str>,
        value: &T,
    ) -> Result<()> {
        let payload = serde_json::to_vec(value)?;
        let mut record: FutureRecord<'_, str, [u8]> =
            FutureRecord::to(topic).payload(payload.as_slice());
        if let Some(key) = key {
            record = record.key(key);
        }

        self.inner
            .send(record, Timeout::After(Duration::from_secs(10)))
            .await
            .map_err(|(err, _)| PipelineError::Publish {
                topic: topic.to_string(),
                source: err,
            })?;

        debug!(topic, key, "message published");
        Ok(())
    }

    /// Publish with unbounded backoff; used after a successful database
    /// write, where dropping the message would strand the persisted row.
    /// Redelivery on a crash is accepted, downstream consumers upsert.
    pub async fn send_json_until_shutdown<T: Serialize>(
        &self,
        topic: &str,
        key: Option<&str>,
        value: &T,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        let retry = RetryConfig {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            ..RetryConfig::default()
        };
        retry_until_cancelled(
            || self.send_json(topic, key, value),
            shutdown,
            &retry,
            topic,
        )
        .await
        .ok_or(PipelineError::ShuttingDown)
    }

    /// Flush queued messages; called once during worker drain.
    pub fn flush(&self, timeout: Duration) {
        if let Err(err) = self.inner.flush(Timeout::After(timeout)) {
            warn!(error = %err, "producer flush did not complete cleanly");
        }
    }
}

/// Consumer-group subscriber driving a [`MessageHandler`].
pub struct EventConsumer {
    inner: StreamConsumer,
    group_id: String,
}

impl EventConsumer {
    pub fn new(
        brokers: &str,
        group_id: &str,
        subscribe_topics: &[&str],
    ) -> std::result::Result<Self, KafkaError> {
        let inner: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("enable.partition.eof", "false")
            .set("session.timeout.ms", "6000")
            .create()?;
        inner.subscribe(subscribe_topics)?;

        info!(
            group_id,
            topics = ?subscribe_topics,
            "consumer subscribed"
        );
        Ok(Self {
            inner,
            group_id: group_id.to_string(),
        })
    }

    /// Consume until the shutdown token fires.
    ///
    /// Malformed JSON is logged, committed and skipped. Handler results are
    /// committed regardless of success — except when the handler was cut
    /// short by shutdown, in which case the offset stays uncommitted so the
    /// message is redelivered to the next worker instance.
    pub async fn run<H: MessageHandler>(
        &self,
        handler: &H,
        shutdown: CancellationToken,
    ) -> Result<()> {
        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => break,
                received = self.inner.recv() => received,
            };

            let message = match message {
                Ok(message) => message,
                Err(err) => {
                    error!(group_id = %self.group_id, error = %err, "consumer receive error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    continue;
                }
            };

            let topic = message.topic().to_string();
            let key = message
                .key()
                .map(|k| String::from_utf8_lossy(k).into_owned());

            let payload = match message.payload() {
                Some(bytes) if !bytes.is_empty() => match serde_json::from_slice(bytes) {
                    Ok(value) => Some(value),
                    Err(err) => {
                        warn!(
                            topic = %topic,
                            error = %err,
                            "skipping malformed JSON message"
                        );
                        None
                    }
                },
                _ => {
                    warn!(topic = %topic, "skipping empty message");
                    None
                }
            };

            if let Some(payload) = payload {
                let result = handler.handle(&topic, key.as_deref(), payload).await;
                if result.is_err() && shutdown.is_cancelled() {
                    warn!(
                        topic = %topic,
                        "shutdown interrupted message handling, leaving offset uncommitted"
                    );
                    break;
                }
                if let Err(err) = result {
                    error!(topic = %topic, error = %err, "message handler failed");
                }
            }

            if let Err(err) = self.inner.commit_message(&message, CommitMode::Async) {
                error!(topic = %topic, error = %err, "offset commit failed");
            }
        }

        // Final synchronous commit so the group resumes cleanly. Fails with
        // "no offset stored" when nothing was consumed.
        if let Err(err) = self.inner.commit_consumer_state(CommitMode::Sync) {
            debug!(error = %err, "final offset commit skipped");
        }
        info!(group_id = %self.group_id, "consumer stopped");
        Ok(())
    }
}
