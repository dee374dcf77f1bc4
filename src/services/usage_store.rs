//! Persistence layer for the tables the pipeline owns:
//! `usage_events` and `matched_usage`.

use pgvector::Vector;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{NormalizedUsageEvent, ProcessingStatus};
use crate::services::matching::MatchCandidate;

pub struct UsageEventStore {
    pool: PgPool,
}

impl UsageEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a normalized event with status `pending`.
    ///
    /// The event_id primary key is the idempotency anchor: redelivered
    /// messages that already produced a row are a no-op.
    pub async fn insert_event(&self, event: &NormalizedUsageEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO usage_events (
                id, source, source_event_id, isrc, iswc,
                reported_title, reported_artist, reported_album,
                usage_type, play_count, revenue_amount, currency,
                territory, usage_date, reporting_period,
                processing_status, ingested_at, content_embedding
            )
            VALUES (
                $1, $2, $3, $4, $5,
                $6, $7, $8,
                $9, $10, $11, $12,
                $13, $14, $15,
                $16, $17, $18
            )
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(event.event_id)
        .bind(&event.source)
        .bind(&event.source_event_id)
        .bind(&event.isrc)
        .bind(&event.iswc)
        .bind(&event.reported_title)
        .bind(&event.reported_artist)
        .bind(&event.reported_album)
        .bind(event.usage_type.as_str())
        .bind(event.play_count)
        .bind(event.revenue_amount)
        .bind(&event.currency)
        .bind(&event.territory)
        .bind(event.usage_date)
        .bind(&event.reporting_period)
        .bind(ProcessingStatus::Pending.as_str())
        .bind(event.ingested_at)
        .bind(event.content_embedding.clone().map(Vector::from))
        .execute(&self.pool)
        .await?;

        debug!(event_id = %event.event_id, "usage event persisted");
        Ok(())
    }

    /// Stamp a terminal status and `processed_at` on a usage event.
    pub async fn mark_outcome(&self, event_id: Uuid, status: ProcessingStatus) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE usage_events
            SET processing_status = $2, processed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(event_id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        debug!(event_id = %event_id, status = %status, "usage event status updated");
        Ok(())
    }

    /// Upsert a match row on the `(usage_event_id, work_id)` unique key so
    /// redelivered events and manual overrides converge on one row.
    pub async fn upsert_match(
        &self,
        usage_event_id: Uuid,
        candidate: &MatchCandidate,
        matched_by: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO matched_usage (
                usage_event_id, work_id, recording_id,
                match_confidence, match_method, matched_by, is_confirmed
            )
            VALUES ($1, $2, $3, $4, $5, $6, FALSE)
            ON CONFLICT (usage_event_id, work_id) DO UPDATE SET
                recording_id = EXCLUDED.recording_id,
                match_confidence = EXCLUDED.match_confidence,
                match_method = EXCLUDED.match_method,
                matched_by = EXCLUDED.matched_by,
                matched_at = NOW()
            "#,
        )
        .bind(usage_event_id)
        .bind(candidate.work_id)
        .bind(candidate.recording_id)
        .bind(candidate.confidence)
        .bind(candidate.method.as_str())
        .bind(matched_by)
        .execute(&self.pool)
        .await?;

        debug!(
            usage_event_id = %usage_event_id,
            work_id = %candidate.work_id,
            method = %candidate.method,
            "match persisted"
        );
        Ok(())
    }
}
