//! Streaming usage-matching pipeline for a music-publishing platform.
//!
//! Raw consumption events from digital service providers are normalized
//! into a canonical shape, enriched with a content embedding, persisted,
//! and resolved to a canonical work (and recording, when available) with a
//! calibrated confidence score. Two stateless workers cooperate over the
//! message bus:
//!
//! - the **usage processor** consumes the raw DSP topics and emits
//!   normalized events, and
//! - the **matching engine** consumes normalized events and runs the
//!   cascaded resolver (exact identifier, fuzzy lexical, vector semantic),
//!   writing matched/unmatched outcomes for royalty settlement and human
//!   review.

pub mod config;
pub mod database;
pub mod error;
pub mod kafka;
pub mod models;
pub mod recovery;
pub mod services;
pub mod shutdown;
pub mod workers;

// Re-export commonly used types
pub use config::{ConfigError, MatchingSettings, Settings};
pub use error::{PipelineError, Result};
pub use kafka::{topics, EventConsumer, EventProducer, MessageHandler};
pub use models::{
    MatchMethod, MatchedUsageMessage, MatchingDeadLetter, NormalizedUsageEvent,
    ProcessingDeadLetter, ProcessingStatus, SuggestedMatch, UnmatchedUsageMessage, UsageType,
};
pub use recovery::{retry_with_backoff, retry_until_cancelled, RetryConfig};
pub use services::matching::{
    MatchCandidate, MatchCascade, MatchDecision, MatchOutcome, MatchStrategy,
};
pub use services::{EmbeddingClient, NormalizerRegistry, UsageEventStore};
pub use workers::{MatchingEngine, UsageProcessor};

/// Initialize structured logging from `RUST_LOG` or the configured level.
pub fn init_tracing(log_level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
