//! Matching Engine: consumes `usage.normalized`, runs the strategy cascade
//! and persists/publishes the outcome.
//!
//! Outcomes form a tagged sum: a confident match upserts `matched_usage`
//! and publishes to `usage.matched`; an unresolved event carries ranked
//! suggestions to `usage.unmatched` for human review; an unexpected error
//! stamps status `error` and dead-letters the event without publishing an
//! outcome.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::Result;
use crate::kafka::{topics, EventProducer, MessageHandler};
use crate::models::{
    MatchedUsageMessage, MatchingDeadLetter, NormalizedUsageEvent, ProcessingStatus,
    UnmatchedUsageMessage,
};
use crate::recovery::{retry_with_backoff, RetryConfig};
use crate::services::matching::{MatchCascade, MatchOutcome};
use crate::services::UsageEventStore;

const UNMATCHED_REASON: &str = "no_confident_match";

pub struct MatchingEngine {
    cascade: MatchCascade,
    store: UsageEventStore,
    producer: EventProducer,
    retry: RetryConfig,
    shutdown: CancellationToken,
}

impl MatchingEngine {
    pub fn new(
        cascade: MatchCascade,
        store: UsageEventStore,
        producer: EventProducer,
        retry: RetryConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            cascade,
            store,
            producer,
            retry,
            shutdown,
        }
    }

    async fn process(&self, event: &NormalizedUsageEvent) -> Result<()> {
        let decision = self.cascade.resolve(event).await;
        let key = event.event_id.to_string();

        match decision.outcome {
            MatchOutcome::Accepted(candidate) => {
                retry_with_backoff(
                    || self.store.upsert_match(event.event_id, &candidate, "system"),
                    &self.retry,
                    "upsert match",
                )
                .await?;
                retry_with_backoff(
                    || self.store.mark_outcome(event.event_id, ProcessingStatus::Matched),
                    &self.retry,
                    "mark event matched",
                )
                .await?;

                let message = MatchedUsageMessage::new(
                    event,
                    candidate.work_id,
                    candidate.recording_id,
                    candidate.confidence,
                    candidate.method,
                );
                self.producer
                    .send_json_until_shutdown(topics::MATCHED, Some(&key), &message, &self.shutdown)
                    .await?;

                info!(
                    event_id = %event.event_id,
                    work_id = %candidate.work_id,
                    method = %candidate.method,
                    confidence = candidate.confidence,
                    attempts = decision.attempts.len(),
                    "usage event matched"
                );
            }
            MatchOutcome::Unresolved { suggestions } => {
                retry_with_backoff(
                    || self.store.mark_outcome(event.event_id, ProcessingStatus::Unmatched),
                    &self.retry,
                    "mark event unmatched",
                )
                .await?;

                let suggested = suggestions.iter().map(|s| s.to_suggestion()).collect();
                let message = UnmatchedUsageMessage::new(event, suggested, UNMATCHED_REASON);
                self.producer
                    .send_json_until_shutdown(
                        topics::UNMATCHED,
                        Some(&key),
                        &message,
                        &self.shutdown,
                    )
                    .await?;

                info!(
                    event_id = %event.event_id,
                    suggestions = message.suggested_matches.len(),
                    attempts = decision.attempts.len(),
                    "usage event queued for review"
                );
            }
        }

        Ok(())
    }

    /// Route a failed event to the matching DLQ and stamp status `error`.
    /// Both writes are best-effort; the offset still commits.
    async fn dead_letter(
        &self,
        topic: &str,
        payload: &serde_json::Value,
        error: &(dyn std::fmt::Display + Send + Sync),
    ) {
        let record = MatchingDeadLetter::new(topic, payload.clone(), error);
        if let Err(send_err) = self
            .producer
            .send_json(topics::DLQ_MATCHING, None, &record)
            .await
        {
            error!(error = %send_err, "failed to dead-letter normalized event");
        }
    }
}

#[async_trait]
impl MessageHandler for MatchingEngine {
    async fn handle(
        &self,
        topic: &str,
        _key: Option<&str>,
        payload: serde_json::Value,
    ) -> Result<()> {
        let event: NormalizedUsageEvent = match serde_json::from_value(payload.clone()) {
            Ok(event) => event,
            Err(err) => {
                warn!(topic, error = %err, "undecodable normalized event, dead-lettering");
                self.dead_letter(topic, &payload, &err).await;
                return Ok(());
            }
        };

        match self.process(&event).await {
            Ok(()) => Ok(()),
            // Shutdown mid-publish: propagate so the consumer leaves the
            // offset uncommitted and the event is redelivered.
            Err(err) if self.shutdown.is_cancelled() => Err(err),
            Err(err) => {
                error!(
                    event_id = %event.event_id,
                    error = %err,
                    "matching failed, dead-lettering"
                );
                if let Err(mark_err) = self
                    .store
                    .mark_outcome(event.event_id, ProcessingStatus::Error)
                    .await
                {
                    error!(
                        event_id = %event.event_id,
                        error = %mark_err,
                        "failed to stamp error status"
                    );
                }
                self.dead_letter(topic, &payload, &err).await;
                Ok(())
            }
        }
    }
}
