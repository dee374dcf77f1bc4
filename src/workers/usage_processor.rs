//! Usage Processor: consumes raw DSP topics, normalizes, enriches with a
//! content embedding, persists the event and forwards it for matching.
//!
//! Per-message state machine: derive the source from the topic, normalize
//! (failures dead-letter and commit), synthesize an embedding best-effort,
//! insert the `usage_events` row with status `pending`, then publish to
//! `usage.normalized` keyed by the event id. The insert happens strictly
//! before the publish so the matcher can always update the row.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{PipelineError, Result};
use crate::kafka::{topics, EventProducer, MessageHandler};
use crate::models::{NormalizedUsageEvent, ProcessingDeadLetter};
use crate::recovery::{retry_with_backoff, RetryConfig};
use crate::services::{EmbeddingClient, NormalizerRegistry, UsageEventStore};

pub struct UsageProcessor {
    normalizers: NormalizerRegistry,
    embeddings: EmbeddingClient,
    store: UsageEventStore,
    producer: EventProducer,
    retry: RetryConfig,
    shutdown: CancellationToken,
}

impl UsageProcessor {
    pub fn new(
        normalizers: NormalizerRegistry,
        embeddings: EmbeddingClient,
        store: UsageEventStore,
        producer: EventProducer,
        retry: RetryConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            normalizers,
            embeddings,
            store,
            producer,
            retry,
            shutdown,
        }
    }

    async fn enrich(&self, event: &mut NormalizedUsageEvent) {
        event.content_embedding = self
            .embeddings
            .embed_event(
                event.reported_title.as_deref(),
                event.reported_artist.as_deref(),
                event.reported_album.as_deref(),
            )
            .await;
    }

    /// Route an unprocessable raw payload to the processing DLQ. A failed
    /// dead-letter send is logged and dropped; the offset still commits.
    async fn dead_letter(&self, payload: &serde_json::Value, error: &PipelineError) {
        let record = ProcessingDeadLetter::new(payload.clone(), error);
        if let Err(send_err) = self
            .producer
            .send_json(topics::DLQ_PROCESSING, None, &record)
            .await
        {
            error!(error = %send_err, "failed to dead-letter raw payload");
        }
    }
}

#[async_trait]
impl MessageHandler for UsageProcessor {
    async fn handle(
        &self,
        topic: &str,
        _key: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<()> {
        let source = topics::source_for_topic(topic);

        let mut event = match self.normalizers.normalize(source, &payload) {
            Ok(event) => event,
            Err(err) => {
                warn!(topic, source, error = %err, "normalization failed, dead-lettering");
                self.dead_letter(&payload, &err).await;
                return Ok(());
            }
        };

        // Best-effort enrichment; the event proceeds with a null embedding
        // on provider failure and the matcher skips the semantic strategy.
        self.enrich(&mut event).await;

        if let Err(err) =
            retry_with_backoff(|| self.store.insert_event(&event), &self.retry, "insert usage event")
                .await
        {
            error!(
                event_id = %event.event_id,
                error = %err,
                "failed to persist usage event, dead-lettering"
            );
            self.dead_letter(&payload, &err).await;
            return Ok(());
        }

        let key = event.event_id.to_string();
        self.producer
            .send_json_until_shutdown(topics::NORMALIZED, Some(&key), &event, &self.shutdown)
            .await?;

        info!(
            event_id = %event.event_id,
            source = %event.source,
            usage_type = %event.usage_type,
            has_embedding = event.content_embedding.is_some(),
            "usage event normalized and published"
        );
        Ok(())
    }
}
