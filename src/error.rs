//! Error taxonomy for the usage pipeline.
//!
//! Failures are classified by how the workers must react to them: skip and
//! commit, dead-letter, retry bounded, or retry until shutdown. The variants
//! here carry the classification; the retry policy lives at the call sites.

use thiserror::Error;

/// Pipeline-wide error type.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input that can never be processed (bad JSON shape, unknown field
    /// types). Logged and skipped, never fatal.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A normalizer rejected the raw payload. Routed to the processing DLQ.
    #[error("normalization failed: {0}")]
    Normalization(String),

    /// Embedding provider unavailable or returned garbage. The event
    /// continues with a null embedding.
    #[error("embedding enrichment failed: {0}")]
    Enrichment(String),

    /// Database operation failed. Retried with bounded backoff; exhaustion
    /// dead-letters the event with status `error`.
    #[error("database operation failed: {0}")]
    Persistence(#[from] sqlx::Error),

    /// A publish failed after the database write. Retried until shutdown.
    #[error("publish to {topic} failed: {source}")]
    Publish {
        topic: String,
        #[source]
        source: rdkafka::error::KafkaError,
    },

    /// Bus-level failure outside of a publish (connect, subscribe, commit).
    #[error("message bus error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// Unexpected failure inside a matching strategy or the cascade body.
    #[error("matcher error: {0}")]
    Matcher(String),

    /// Message could not be encoded for the bus.
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The worker is shutting down and an unbounded retry was abandoned.
    #[error("operation aborted by shutdown")]
    ShuttingDown,
}

pub type Result<T> = std::result::Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_classification() {
        let err = PipelineError::Normalization("missing payload object".into());
        assert!(err.to_string().contains("normalization failed"));

        let err = PipelineError::Matcher("strategy panicked".into());
        assert!(err.to_string().contains("matcher error"));
    }
}
