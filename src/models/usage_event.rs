//! Canonical usage-event model and its enumerations.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Types of usage events reported by DSPs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    Stream,
    Download,
    RadioPlay,
    TvBroadcast,
    PublicPerformance,
    Sync,
    Mechanical,
}

impl UsageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageType::Stream => "stream",
            UsageType::Download => "download",
            UsageType::RadioPlay => "radio_play",
            UsageType::TvBroadcast => "tv_broadcast",
            UsageType::PublicPerformance => "public_performance",
            UsageType::Sync => "sync",
            UsageType::Mechanical => "mechanical",
        }
    }
}

impl fmt::Display for UsageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a usage event.
///
/// The workers only stamp `pending` and the terminal states; `processing`
/// and `disputed` exist in the schema for the review surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Processing,
    Matched,
    Unmatched,
    Disputed,
    Error,
}

impl ProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Matched => "matched",
            ProcessingStatus::Unmatched => "unmatched",
            ProcessingStatus::Disputed => "disputed",
            ProcessingStatus::Error => "error",
        }
    }
}

impl fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Methods used to resolve usage to works.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    IsrcExact,
    IswcExact,
    TitleArtistExact,
    FuzzyTitle,
    AiEmbedding,
    Manual,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::IsrcExact => "isrc_exact",
            MatchMethod::IswcExact => "iswc_exact",
            MatchMethod::TitleArtistExact => "title_artist_exact",
            MatchMethod::FuzzyTitle => "fuzzy_title",
            MatchMethod::AiEmbedding => "ai_embedding",
            MatchMethod::Manual => "manual",
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A DSP usage report normalized into the canonical shape.
///
/// This struct doubles as the `usage.normalized` bus message: `usage_date`
/// serializes as `YYYY-MM-DD`, timestamps as RFC 3339, and re-encoding a
/// decoded message yields the same JSON up to key ordering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedUsageEvent {
    pub event_id: Uuid,
    pub source: String,
    #[serde(default)]
    pub source_event_id: Option<String>,
    #[serde(default)]
    pub isrc: Option<String>,
    #[serde(default)]
    pub iswc: Option<String>,
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
    #[serde(default)]
    pub reporting_period: Option<String>,
    pub ingested_at: DateTime<Utc>,
    #[serde(default)]
    pub content_embedding: Option<Vec<f32>>,
}
