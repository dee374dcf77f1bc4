//! Semantic strategy backed by pgvector cosine search.
//!
//! Confidence is `1 - cosine_distance` between the event's content
//! embedding and the work title embeddings. Acceptance requires the
//! embedding threshold; anything down to the manual-review threshold is
//! carried as a suggestion.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::{MatchCandidate, MatchStrategy};
use crate::error::Result;
use crate::models::{MatchMethod, NormalizedUsageEvent};

#[derive(sqlx::FromRow)]
struct ScoredWork {
    work_id: Uuid,
    similarity: f64,
}

pub struct SemanticEmbeddingStrategy {
    pool: PgPool,
    accept_threshold: f64,
    review_threshold: f64,
    max_candidates: usize,
}

impl SemanticEmbeddingStrategy {
    pub fn new(
        pool: PgPool,
        accept_threshold: f64,
        review_threshold: f64,
        max_candidates: usize,
    ) -> Self {
        Self {
            pool,
            accept_threshold,
            review_threshold,
            max_candidates,
        }
    }

    async fn candidates(&self, embedding: &[f32]) -> Result<Vec<MatchCandidate>> {
        let query_vector = Vector::from(embedding.to_vec());
        let rows = sqlx::query_as::<_, ScoredWork>(
            r#"
            SELECT
                w.id AS work_id,
                (1 - (w.title_embedding <=> $1))::float8 AS similarity
            FROM works w
            WHERE w.title_embedding IS NOT NULL
                AND w.status = 'active'
            ORDER BY w.title_embedding <=> $1, w.id ASC
            LIMIT $2
            "#,
        )
        .bind(query_vector)
        .bind(self.max_candidates as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter(|row| row.similarity >= self.review_threshold)
            .map(|row| MatchCandidate {
                work_id: row.work_id,
                recording_id: None,
                confidence: row.similarity,
                method: MatchMethod::AiEmbedding,
            })
            .collect())
    }
}

#[async_trait]
impl MatchStrategy for SemanticEmbeddingStrategy {
    fn name(&self) -> &'static str {
        "ai_embedding"
    }

    async fn try_match(&self, event: &NormalizedUsageEvent) -> Result<Option<MatchCandidate>> {
        let Some(embedding) = event.content_embedding.as_deref() else {
            return Ok(None);
        };

        let candidates = self.candidates(embedding).await?;
        let best = candidates
            .into_iter()
            .next()
            .filter(|candidate| candidate.confidence >= self.accept_threshold);

        if let Some(candidate) = &best {
            debug!(
                event_id = %event.event_id,
                work_id = %candidate.work_id,
                confidence = candidate.confidence,
                "semantic match"
            );
        }
        Ok(best)
    }

    async fn gather_suggestions(
        &self,
        event: &NormalizedUsageEvent,
    ) -> Result<Vec<MatchCandidate>> {
        let Some(embedding) = event.content_embedding.as_deref() else {
            return Ok(Vec::new());
        };
        self.candidates(embedding).await
    }
}
