//! Exact identifier strategies: ISRC against recordings, ISWC against works.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::{MatchCandidate, MatchStrategy};
use crate::error::Result;
use crate::models::{MatchMethod, NormalizedUsageEvent};
use crate::services::normalizer::{clean_isrc, clean_iswc};

#[derive(sqlx::FromRow)]
struct RecordingRef {
    id: Uuid,
    work_id: Uuid,
}

/// ISRC uniquely identifies a recording; a hit resolves both the recording
/// and its owning work with full confidence.
pub struct IsrcExactStrategy {
    pool: PgPool,
    confidence: f64,
}

impl IsrcExactStrategy {
    pub fn new(pool: PgPool, confidence: f64) -> Self {
        Self { pool, confidence }
    }
}

#[async_trait]
impl MatchStrategy for IsrcExactStrategy {
    fn name(&self) -> &'static str {
        "isrc_exact"
    }

    async fn try_match(&self, event: &NormalizedUsageEvent) -> Result<Option<MatchCandidate>> {
        // Normalizers store cleaned ISRCs, but re-clean here so the strategy
        // is safe against events produced by other writers.
        let Some(isrc) = event.isrc.as_deref().and_then(clean_isrc) else {
            return Ok(None);
        };

        let recording = sqlx::query_as::<_, RecordingRef>(
            "SELECT id, work_id FROM recordings WHERE isrc = $1 LIMIT 1",
        )
        .bind(&isrc)
        .fetch_optional(&self.pool)
        .await?;

        Ok(recording.map(|recording| {
            debug!(isrc = %isrc, work_id = %recording.work_id, "ISRC match");
            MatchCandidate {
                work_id: recording.work_id,
                recording_id: Some(recording.id),
                confidence: self.confidence,
                method: MatchMethod::IsrcExact,
            }
        }))
    }

    async fn gather_suggestions(
        &self,
        _event: &NormalizedUsageEvent,
    ) -> Result<Vec<MatchCandidate>> {
        // Identifier lookups are binary; there is nothing to suggest.
        Ok(Vec::new())
    }
}

/// ISWC identifies the composition itself; a hit resolves the work but not
/// a specific recording.
pub struct IswcExactStrategy {
    pool: PgPool,
}

impl IswcExactStrategy {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MatchStrategy for IswcExactStrategy {
    fn name(&self) -> &'static str {
        "iswc_exact"
    }

    async fn try_match(&self, event: &NormalizedUsageEvent) -> Result<Option<MatchCandidate>> {
        let Some(iswc) = event.iswc.as_deref().and_then(clean_iswc) else {
            return Ok(None);
        };

        let work_id =
            sqlx::query_scalar::<_, Uuid>("SELECT id FROM works WHERE iswc = $1 LIMIT 1")
                .bind(&iswc)
                .fetch_optional(&self.pool)
                .await?;

        Ok(work_id.map(|work_id| {
            debug!(iswc = %iswc, work_id = %work_id, "ISWC match");
            MatchCandidate {
                work_id,
                recording_id: None,
                confidence: 1.0,
                method: MatchMethod::IswcExact,
            }
        }))
    }

    async fn gather_suggestions(
        &self,
        _event: &NormalizedUsageEvent,
    ) -> Result<Vec<MatchCandidate>> {
        Ok(Vec::new())
    }
}
