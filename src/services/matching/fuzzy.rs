//! Fuzzy lexical strategy backed by the pg_trgm extension.
//!
//! Two sub-queries run in parallel: recordings compared against
//! `title [+ " " + artist]` (artist-aware when the event names one) and
//! works compared against the title alone. Candidates are drawn at a
//! recall threshold one decile below the acceptance threshold so that
//! near-misses survive as review suggestions.

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::{sort_by_confidence, MatchCandidate, MatchStrategy};
use crate::error::Result;
use crate::models::{MatchMethod, NormalizedUsageEvent};

#[derive(sqlx::FromRow)]
struct ScoredRecording {
    recording_id: Uuid,
    work_id: Uuid,
    sim_score: f64,
}

#[derive(sqlx::FromRow)]
struct ScoredWork {
    work_id: Uuid,
    sim_score: f64,
}

pub struct FuzzyTitleStrategy {
    pool: PgPool,
    accept_threshold: f64,
    max_candidates: usize,
}

impl FuzzyTitleStrategy {
    pub fn new(pool: PgPool, accept_threshold: f64, max_candidates: usize) -> Self {
        Self {
            pool,
            accept_threshold,
            max_candidates,
        }
    }

    fn recall_threshold(&self) -> f64 {
        (self.accept_threshold - 0.1).max(0.0)
    }

    /// Candidate pool across both sub-queries, deduplicated by work_id
    /// keeping the higher similarity, ranked and bounded.
    async fn candidates(&self, title: &str, artist: Option<&str>) -> Result<Vec<MatchCandidate>> {
        let recall = self.recall_threshold();
        let (recordings, works) = tokio::try_join!(
            self.match_recordings(title, artist, recall),
            self.match_works(title, recall)
        )?;

        let mut best: std::collections::HashMap<Uuid, MatchCandidate> =
            std::collections::HashMap::new();
        for candidate in recordings.into_iter().chain(works) {
            match best.get(&candidate.work_id) {
                Some(existing) if existing.confidence >= candidate.confidence => {}
                _ => {
                    best.insert(candidate.work_id, candidate);
                }
            }
        }

        let mut merged: Vec<MatchCandidate> = best.into_values().collect();
        sort_by_confidence(&mut merged);
        merged.truncate(self.max_candidates);
        Ok(merged)
    }

    async fn match_recordings(
        &self,
        title: &str,
        artist: Option<&str>,
        recall: f64,
    ) -> Result<Vec<MatchCandidate>> {
        let rows = if let Some(artist) = artist {
            let search_text = format!("{title} {artist}");
            sqlx::query_as::<_, ScoredRecording>(
                r#"
                SELECT
                    r.id AS recording_id,
                    r.work_id,
                    similarity(
                        LOWER(r.title || ' ' || COALESCE(r.artist_name, '')),
                        LOWER($1)
                    )::float8 AS sim_score
                FROM recordings r
                WHERE similarity(
                    LOWER(r.title || ' ' || COALESCE(r.artist_name, '')),
                    LOWER($1)
                ) > $2
                ORDER BY sim_score DESC, r.work_id ASC
                LIMIT $3
                "#,
            )
            .bind(search_text)
            .bind(recall)
            .bind(self.max_candidates as i64)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, ScoredRecording>(
                r#"
                SELECT
                    r.id AS recording_id,
                    r.work_id,
                    similarity(LOWER(r.title), LOWER($1))::float8 AS sim_score
                FROM recordings r
                WHERE similarity(LOWER(r.title), LOWER($1)) > $2
                ORDER BY sim_score DESC, r.work_id ASC
                LIMIT $3
                "#,
            )
            .bind(title)
            .bind(recall)
            .bind(self.max_candidates as i64)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(rows
            .into_iter()
            .map(|row| MatchCandidate {
                work_id: row.work_id,
                recording_id: Some(row.recording_id),
                confidence: row.sim_score,
                method: MatchMethod::FuzzyTitle,
            })
            .collect())
    }

    async fn match_works(&self, title: &str, recall: f64) -> Result<Vec<MatchCandidate>> {
        let rows = sqlx::query_as::<_, ScoredWork>(
            r#"
            SELECT
                w.id AS work_id,
                similarity(LOWER(w.title), LOWER($1))::float8 AS sim_score
            FROM works w
            WHERE w.status = 'active'
                AND similarity(LOWER(w.title), LOWER($1)) > $2
            ORDER BY sim_score DESC, w.id ASC
            LIMIT $3
            "#,
        )
        .bind(title)
        .bind(recall)
        .bind(self.max_candidates as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| MatchCandidate {
                work_id: row.work_id,
                recording_id: None,
                confidence: row.sim_score,
                method: MatchMethod::FuzzyTitle,
            })
            .collect())
    }
}

#[async_trait]
impl MatchStrategy for FuzzyTitleStrategy {
    fn name(&self) -> &'static str {
        "fuzzy_title"
    }

    async fn try_match(&self, event: &NormalizedUsageEvent) -> Result<Option<MatchCandidate>> {
        let Some(title) = event.reported_title.as_deref() else {
            return Ok(None);
        };

        let candidates = self
            .candidates(title, event.reported_artist.as_deref())
            .await?;
        let best = candidates
            .into_iter()
            .next()
            .filter(|candidate| candidate.confidence >= self.accept_threshold);

        if let Some(candidate) = &best {
            debug!(
                title,
                work_id = %candidate.work_id,
                confidence = candidate.confidence,
                "fuzzy match"
            );
        }
        Ok(best)
    }

    async fn gather_suggestions(
        &self,
        event: &NormalizedUsageEvent,
    ) -> Result<Vec<MatchCandidate>> {
        let Some(title) = event.reported_title.as_deref() else {
            return Ok(Vec::new());
        };
        self.candidates(title, event.reported_artist.as_deref())
            .await
    }
}
