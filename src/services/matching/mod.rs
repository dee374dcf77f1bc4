//! Work/recording resolution for normalized usage events.
//!
//! Resolution is a cascaded list of strategies ordered from cheapest and
//! most certain (identifier lookups) to broadest (semantic similarity).
//! The cascade is a plain loop with a short-circuit: the first strategy
//! that clears its own acceptance threshold wins, and later strategies are
//! never consulted. Strategies that decline contribute ranked suggestions
//! for the human-review queue.

mod fuzzy;
mod identifier;
mod semantic;

pub use fuzzy::FuzzyTitleStrategy;
pub use identifier::{IsrcExactStrategy, IswcExactStrategy};
pub use semantic::SemanticEmbeddingStrategy;

use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::MatchingSettings;
use crate::error::Result;
use crate::models::{MatchMethod, NormalizedUsageEvent, SuggestedMatch};

/// A resolved candidate: the work (and recording, when the strategy can
/// name one) with a calibrated confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidate {
    pub work_id: Uuid,
    pub recording_id: Option<Uuid>,
    pub confidence: f64,
    pub method: MatchMethod,
}

impl MatchCandidate {
    pub fn to_suggestion(&self) -> SuggestedMatch {
        SuggestedMatch {
            work_id: self.work_id,
            recording_id: self.recording_id,
            confidence: self.confidence,
            method: self.method,
        }
    }
}

/// One strategy in the cascade.
#[async_trait]
pub trait MatchStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Return a candidate only when it clears this strategy's acceptance
    /// threshold. `Ok(None)` means "not confident", not "error".
    async fn try_match(&self, event: &NormalizedUsageEvent) -> Result<Option<MatchCandidate>>;

    /// Candidates below the acceptance threshold, for the review queue.
    async fn gather_suggestions(&self, event: &NormalizedUsageEvent)
        -> Result<Vec<MatchCandidate>>;
}

/// Record of one consulted strategy; the cascade stops appending at the
/// first accepting attempt.
#[derive(Debug, Clone)]
pub struct MatchAttempt {
    pub strategy: &'static str,
    pub accepted: bool,
    pub confidence: Option<f64>,
    pub suggestions: usize,
}

/// Terminal result of the cascade for one event.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Accepted(MatchCandidate),
    Unresolved { suggestions: Vec<MatchCandidate> },
}

/// The cascade's full decision, attempts included.
#[derive(Debug, Clone)]
pub struct MatchDecision {
    pub attempts: Vec<MatchAttempt>,
    pub outcome: MatchOutcome,
}

/// Ordered strategy list with early exit.
pub struct MatchCascade {
    strategies: Vec<Box<dyn MatchStrategy>>,
    max_suggestions: usize,
}

impl MatchCascade {
    pub fn new(strategies: Vec<Box<dyn MatchStrategy>>, max_suggestions: usize) -> Self {
        Self {
            strategies,
            max_suggestions,
        }
    }

    /// The production cascade: ISRC exact, ISWC exact, fuzzy lexical,
    /// vector semantic.
    pub fn for_pool(pool: PgPool, settings: &MatchingSettings) -> Self {
        let strategies: Vec<Box<dyn MatchStrategy>> = vec![
            Box::new(IsrcExactStrategy::new(
                pool.clone(),
                settings.isrc_confidence,
            )),
            Box::new(IswcExactStrategy::new(pool.clone())),
            Box::new(FuzzyTitleStrategy::new(
                pool.clone(),
                settings.fuzzy_threshold,
                settings.max_alternative_matches,
            )),
            Box::new(SemanticEmbeddingStrategy::new(
                pool,
                settings.embedding_threshold,
                settings.manual_review_threshold,
                settings.max_alternative_matches,
            )),
        ];
        Self::new(strategies, settings.max_alternative_matches)
    }

    /// Run the cascade. Strategy-internal errors are contained: the failed
    /// strategy records an attempt and the cascade continues.
    pub async fn resolve(&self, event: &NormalizedUsageEvent) -> MatchDecision {
        let mut attempts = Vec::with_capacity(self.strategies.len());
        let mut collected: Vec<MatchCandidate> = Vec::new();

        for strategy in &self.strategies {
            match strategy.try_match(event).await {
                Ok(Some(candidate)) => {
                    debug!(
                        event_id = %event.event_id,
                        strategy = strategy.name(),
                        work_id = %candidate.work_id,
                        confidence = candidate.confidence,
                        "strategy accepted"
                    );
                    attempts.push(MatchAttempt {
                        strategy: strategy.name(),
                        accepted: true,
                        confidence: Some(candidate.confidence),
                        suggestions: 0,
                    });
                    return MatchDecision {
                        attempts,
                        outcome: MatchOutcome::Accepted(candidate),
                    };
                }
                Ok(None) => {
                    let suggestions = match strategy.gather_suggestions(event).await {
                        Ok(suggestions) => suggestions,
                        Err(err) => {
                            warn!(
                                event_id = %event.event_id,
                                strategy = strategy.name(),
                                error = %err,
                                "suggestion gathering failed"
                            );
                            Vec::new()
                        }
                    };
                    attempts.push(MatchAttempt {
                        strategy: strategy.name(),
                        accepted: false,
                        confidence: None,
                        suggestions: suggestions.len(),
                    });
                    collected.extend(suggestions);
                }
                Err(err) => {
                    warn!(
                        event_id = %event.event_id,
                        strategy = strategy.name(),
                        error = %err,
                        "strategy failed, continuing cascade"
                    );
                    attempts.push(MatchAttempt {
                        strategy: strategy.name(),
                        accepted: false,
                        confidence: None,
                        suggestions: 0,
                    });
                }
            }
        }

        MatchDecision {
            attempts,
            outcome: MatchOutcome::Unresolved {
                suggestions: merge_suggestions(collected, self.max_suggestions),
            },
        }
    }
}

/// Merge candidates from multiple strategies: keep the highest confidence
/// per work, order by confidence descending with work_id as the
/// deterministic tie-break, and bound the list.
pub fn merge_suggestions(candidates: Vec<MatchCandidate>, limit: usize) -> Vec<MatchCandidate> {
    let mut best: std::collections::HashMap<Uuid, MatchCandidate> = std::collections::HashMap::new();
    for candidate in candidates {
        match best.get(&candidate.work_id) {
            Some(existing) if existing.confidence >= candidate.confidence => {}
            _ => {
                best.insert(candidate.work_id, candidate);
            }
        }
    }

    let mut merged: Vec<MatchCandidate> = best.into_values().collect();
    sort_by_confidence(&mut merged);
    merged.truncate(limit);
    merged
}

/// Confidence descending; identical confidences break by work_id ascending.
pub(crate) fn sort_by_confidence(candidates: &mut [MatchCandidate]) {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.work_id.cmp(&b.work_id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn event() -> NormalizedUsageEvent {
        NormalizedUsageEvent {
            event_id: Uuid::new_v4(),
            source: "generic".to_string(),
            source_event_id: None,
            isrc: None,
            iswc: None,
            reported_title: Some("Xyzzy".to_string()),
            reported_artist: None,
            reported_album: None,
            usage_type: crate::models::UsageType::Stream,
            play_count: 1,
            revenue_amount: None,
            currency: "USD".to_string(),
            territory: None,
            usage_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            reporting_period: None,
            ingested_at: Utc::now(),
            content_embedding: None,
        }
    }

    fn candidate(work_id: Uuid, confidence: f64) -> MatchCandidate {
        MatchCandidate {
            work_id,
            recording_id: None,
            confidence,
            method: MatchMethod::AiEmbedding,
        }
    }

    /// Strategy stub with canned behavior and a call counter.
    struct StubStrategy {
        name: &'static str,
        accepted: Option<MatchCandidate>,
        suggestions: Vec<MatchCandidate>,
        fail: bool,
        calls: Arc<AtomicUsize>,
    }

    impl StubStrategy {
        fn accepting(name: &'static str, candidate: MatchCandidate, calls: Arc<AtomicUsize>) -> Self {
            Self {
                name,
                accepted: Some(candidate),
                suggestions: Vec::new(),
                fail: false,
                calls,
            }
        }

        fn declining(
            name: &'static str,
            suggestions: Vec<MatchCandidate>,
            calls: Arc<AtomicUsize>,
        ) -> Self {
            Self {
                name,
                accepted: None,
                suggestions,
                fail: false,
                calls,
            }
        }

        fn failing(name: &'static str, calls: Arc<AtomicUsize>) -> Self {
            Self {
                name,
                accepted: None,
                suggestions: Vec::new(),
                fail: true,
                calls,
            }
        }
    }

    #[async_trait]
    impl MatchStrategy for StubStrategy {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn try_match(
            &self,
            _event: &NormalizedUsageEvent,
        ) -> Result<Option<MatchCandidate>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(crate::error::PipelineError::Matcher(
                    "stub failure".to_string(),
                ));
            }
            Ok(self.accepted.clone())
        }

        async fn gather_suggestions(
            &self,
            _event: &NormalizedUsageEvent,
        ) -> Result<Vec<MatchCandidate>> {
            Ok(self.suggestions.clone())
        }
    }

    #[tokio::test]
    async fn cascade_short_circuits_on_first_acceptance() {
        let first_calls = Arc::new(AtomicUsize::new(0));
        let second_calls = Arc::new(AtomicUsize::new(0));
        let winner = candidate(Uuid::new_v4(), 1.0);

        let cascade = MatchCascade::new(
            vec![
                Box::new(StubStrategy::accepting(
                    "isrc_exact",
                    winner.clone(),
                    first_calls.clone(),
                )),
                Box::new(StubStrategy::accepting(
                    "iswc_exact",
                    candidate(Uuid::new_v4(), 1.0),
                    second_calls.clone(),
                )),
            ],
            5,
        );

        let decision = cascade.resolve(&event()).await;

        match decision.outcome {
            MatchOutcome::Accepted(accepted) => assert_eq!(accepted, winner),
            MatchOutcome::Unresolved { .. } => panic!("expected acceptance"),
        }
        // Attempts stop at the first accepting strategy.
        assert_eq!(decision.attempts.len(), 1);
        assert!(decision.attempts[0].accepted);
        assert_eq!(first_calls.load(Ordering::SeqCst), 1);
        assert_eq!(second_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unresolved_cascade_merges_and_ranks_suggestions() {
        let calls = Arc::new(AtomicUsize::new(0));
        let shared_work = Uuid::new_v4();
        let other_work = Uuid::new_v4();

        let cascade = MatchCascade::new(
            vec![
                Box::new(StubStrategy::declining(
                    "fuzzy_title",
                    vec![candidate(shared_work, 0.78), candidate(other_work, 0.76)],
                    calls.clone(),
                )),
                Box::new(StubStrategy::declining(
                    "ai_embedding",
                    vec![candidate(shared_work, 0.81)],
                    calls.clone(),
                )),
            ],
            5,
        );

        let decision = cascade.resolve(&event()).await;
        let MatchOutcome::Unresolved { suggestions } = decision.outcome else {
            panic!("expected unresolved outcome");
        };

        assert_eq!(suggestions.len(), 2);
        // The shared work keeps its higher confidence from the second pass.
        assert_eq!(suggestions[0].work_id, shared_work);
        assert_eq!(suggestions[0].confidence, 0.81);
        assert_eq!(suggestions[1].work_id, other_work);
        assert_eq!(decision.attempts.len(), 2);
    }

    #[tokio::test]
    async fn strategy_failure_does_not_stop_the_cascade() {
        let calls = Arc::new(AtomicUsize::new(0));
        let winner = candidate(Uuid::new_v4(), 0.9);

        let cascade = MatchCascade::new(
            vec![
                Box::new(StubStrategy::failing("isrc_exact", calls.clone())),
                Box::new(StubStrategy::accepting(
                    "fuzzy_title",
                    winner.clone(),
                    calls.clone(),
                )),
            ],
            5,
        );

        let decision = cascade.resolve(&event()).await;
        assert!(matches!(decision.outcome, MatchOutcome::Accepted(ref c) if *c == winner));
        assert_eq!(decision.attempts.len(), 2);
        assert!(!decision.attempts[0].accepted);
    }

    #[test]
    fn merge_keeps_best_per_work_and_bounds_the_list() {
        let work_a = Uuid::new_v4();
        let work_b = Uuid::new_v4();
        let work_c = Uuid::new_v4();

        let merged = merge_suggestions(
            vec![
                candidate(work_a, 0.72),
                candidate(work_b, 0.68),
                candidate(work_a, 0.63),
                candidate(work_c, 0.63),
            ],
            2,
        );

        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].work_id, work_a);
        assert_eq!(merged[0].confidence, 0.72);
        assert_eq!(merged[1].work_id, work_b);
    }

    #[test]
    fn identical_confidences_break_by_work_id() {
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);

        let merged = merge_suggestions(vec![candidate(high, 0.7), candidate(low, 0.7)], 5);
        assert_eq!(merged[0].work_id, low);
        assert_eq!(merged[1].work_id, high);
    }

    #[test]
    fn suggestions_sort_strictly_descending() {
        let mut candidates = vec![
            candidate(Uuid::new_v4(), 0.63),
            candidate(Uuid::new_v4(), 0.72),
            candidate(Uuid::new_v4(), 0.68),
        ];
        sort_by_confidence(&mut candidates);
        let confidences: Vec<f64> = candidates.iter().map(|c| c.confidence).collect();
        assert_eq!(confidences, vec![0.72, 0.68, 0.63]);
    }
}
