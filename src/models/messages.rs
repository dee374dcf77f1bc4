//! Bus message schemas for matching outcomes and dead letters.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::usage_event::{MatchMethod, NormalizedUsageEvent, UsageType};

/// A candidate work carried on `usage.unmatched` for human review.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedMatch {
    pub work_id: Uuid,
    #[serde(default)]
    pub recording_id: Option<Uuid>,
    pub confidence: f64,
    pub method: MatchMethod,
}

/// Published to `usage.matched` once a confident match is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchedUsageMessage {
    pub usage_event_id: Uuid,
    pub source: String,
    pub usage_date: NaiveDate,
    #[serde(default)]
    pub territory: Option<String>,
    pub work_id: Uuid,
    #[serde(default)]
    pub recording_id: Option<Uuid>,
    pub match_confidence: f64,
    pub match_method: MatchMethod,
    pub usage_type: UsageType,
    pub play_count: i64,
    #[serde(default)]
    pub revenue_amount: Option<Decimal>,
    pub currency: String,
    pub matched_at: DateTime<Utc>,
}

impl MatchedUsageMessage {
    pub fn new(
        event: &NormalizedUsageEvent,
        work_id: Uuid,
        recording_id: Option<Uuid>,
        confidence: f64,
        method: MatchMethod,
    ) -> Self {
        Self {
            usage_event_id: event.event_id,
            source: event.source.clone(),
            usage_date: event.usage_date,
            territory: event.territory.clone(),
            work_id,
            recording_id,
            match_confidence: confidence,
            match_method: method,
            usage_type: event.usage_type,
            play_count: event.play_count,
            revenue_amount: event.revenue_amount,
            currency: event.currency.clone(),
            matched_at: Utc::now(),
        }
    }
}

/// Published to `usage.unmatched` when no strategy clears its threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedUsageMessage {
    pub usage_event_id: Uuid,
    pub source: String,
    #[serde(default)]
    pub source_event_id: Option<String>,
    #[serde(default)]
    pub isrc: Option<String>,
    #[serde(default)]
    pub reported_title: Option<String>,
    #[serde(default)]
    pub reported_artist: Option<String>,
    #[serde(default)]
    pub reported_album: Option<String>,
    pub usage_type: UsageType,
    pub play_count: i64,
    #[serde(default)]
    pub revenue_amount: Option<Decimal>,
    pub currency: String,
    #[serde(default)]
    pub territory: Option<String>,
    pub usage_date: NaiveDate,
    pub suggested_matches: Vec<SuggestedMatch>,
    pub reason: String,
    pub queued_at: DateTime<Utc>,
}

impl UnmatchedUsageMessage {
    pub fn new(
        event: &NormalizedUsageEvent,
        suggested_matches: Vec<SuggestedMatch>,
        reason: &str,
    ) -> Self {
        Self {
            usage_event_id: event.event_id,
            source: event.source.clone(),
            source_event_id: event.source_event_id.clone(),
            isrc: event.isrc.clone(),
            reported_title: event.reported_title.clone(),
            reported_artist: event.reported_artist.clone(),
            reported_album: event.reported_album.clone(),
            usage_type: event.usage_type,
            play_count: event.play_count,
            revenue_amount: event.revenue_amount,
            currency: event.currency.clone(),
            territory: event.territory.clone(),
            usage_date: event.usage_date,
            suggested_matches,
            reason: reason.to_string(),
            queued_at: Utc::now(),
        }
    }
}

/// Dead letter for raw payloads the processor could not handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingDeadLetter {
    pub event_data: serde_json::Value,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl ProcessingDeadLetter {
    pub fn new(event_data: serde_json::Value, error: impl ToString) -> Self {
        Self {
            event_data,
            error: error.to_string(),
            failed_at: Utc::now(),
        }
    }
}

/// Dead letter for normalized events the matcher could not resolve or persist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingDeadLetter {
    pub original_topic: String,
    pub event_data: serde_json::Value,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

impl MatchingDeadLetter {
    pub fn new(original_topic: &str, event_data: serde_json::Value, error: impl ToString) -> Self {
        Self {
            original_topic: original_topic.to_string(),
            event_data,
            error: error.to_string(),
            failed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn event() -> NormalizedUsageEvent {
        NormalizedUsageEvent {
            event_id: Uuid::new_v4(),
            source: "radio".to_string(),
            source_event_id: None,
            isrc: None,
            iswc: None,
            reported_title: Some("Xyzzy".to_string()),
            reported_artist: None,
            reported_album: None,
            usage_type: UsageType::RadioPlay,
            play_count: 3,
            revenue_amount: None,
            currency: "USD".to_string(),
            territory: Some("GB".to_string()),
            usage_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            reporting_period: Some("2024_03".to_string()),
            ingested_at: Utc::now(),
            content_embedding: None,
        }
    }

    #[test]
    fn matched_message_copies_event_fields() {
        let event = event();
        let work_id = Uuid::new_v4();
        let message =
            MatchedUsageMessage::new(&event, work_id, None, 0.92, MatchMethod::FuzzyTitle);

        assert_eq!(message.usage_event_id, event.event_id);
        assert_eq!(message.work_id, work_id);
        assert_eq!(message.usage_type, UsageType::RadioPlay);
        assert_eq!(message.match_method, MatchMethod::FuzzyTitle);

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["match_method"], serde_json::json!("fuzzy_title"));
        assert_eq!(json["usage_date"], serde_json::json!("2024-03-15"));
    }

    #[test]
    fn unmatched_message_carries_suggestions_and_reason() {
        let event = event();
        let suggestions = vec![SuggestedMatch {
            work_id: Uuid::new_v4(),
            recording_id: None,
            confidence: 0.72,
            method: MatchMethod::AiEmbedding,
        }];
        let message = UnmatchedUsageMessage::new(&event, suggestions, "no_confident_match");

        assert_eq!(message.reason, "no_confident_match");
        assert_eq!(message.suggested_matches.len(), 1);

        let json = serde_json::to_value(&message).unwrap();
        let decoded: UnmatchedUsageMessage = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, message);
    }
}
