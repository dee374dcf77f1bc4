//! DSP-specific normalizers for raw usage payloads.
//!
//! One normalizer per source tag; the generic normalizer is the catch-all
//! for unrecognized tags. The cleaning rules here are shared by every
//! normalizer so that identifier formats, dates and counters come out
//! identical regardless of the reporting dialect.

mod apple_music;
mod generic;
mod spotify;

pub use apple_music::AppleMusicNormalizer;
pub use generic::GenericNormalizer;
pub use spotify::SpotifyNormalizer;

use chrono::{NaiveDate, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use crate::error::{PipelineError, Result};
use crate::models::{NormalizedUsageEvent, UsageType};

pub type RawPayload = Map<String, Value>;

/// A per-source translator from vendor payloads to the canonical event.
pub trait Normalizer: Send + Sync {
    /// Source tag this normalizer handles.
    fn source_name(&self) -> &'static str;

    /// Translate one raw payload into a normalized event.
    fn normalize(&self, raw: &RawPayload) -> Result<NormalizedUsageEvent>;
}

/// Dispatch table keyed by source tag.
pub struct NormalizerRegistry {
    spotify: SpotifyNormalizer,
    apple_music: AppleMusicNormalizer,
    generic: GenericNormalizer,
}

impl NormalizerRegistry {
    pub fn new() -> Self {
        Self {
            spotify: SpotifyNormalizer,
            apple_music: AppleMusicNormalizer,
            generic: GenericNormalizer,
        }
    }

    /// Resolve the normalizer for a source tag. Radio feeds and unknown
    /// sources fall through to the generic normalizer.
    pub fn for_source(&self, source: &str) -> &dyn Normalizer {
        match source {
            "spotify" => &self.spotify,
            "apple_music" => &self.apple_music,
            _ => &self.generic,
        }
    }

    /// Normalize a payload that must be a JSON object.
    pub fn normalize(&self, source: &str, payload: &Value) -> Result<NormalizedUsageEvent> {
        let raw = payload.as_object().ok_or_else(|| {
            PipelineError::Normalization("raw payload is not a JSON object".to_string())
        })?;
        self.for_source(source).normalize(raw)
    }
}

impl Default for NormalizerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// Shared cleaning rules.

/// Trim a raw string value; empty and non-string values become None.
pub(crate) fn clean_value_string(value: Option<&Value>) -> Option<String> {
    let text = value?.as_str()?.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// First alias whose value cleans to a non-empty string.
pub(crate) fn first_string(raw: &RawPayload, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| clean_value_string(raw.get(*key)))
}

/// Clean an ISRC: strip spaces and hyphens, uppercase, and accept only the
/// canonical 12-alphanumeric form.
pub fn clean_isrc(value: &str) -> Option<String> {
    let cleaned: String = value
        .chars()
        .filter(|c| *c != ' ' && *c != '-')
        .collect::<String>()
        .to_uppercase();

    if cleaned.len() == 12 && cleaned.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(cleaned)
    } else {
        None
    }
}

pub(crate) fn isrc_from(raw: &RawPayload, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| clean_value_string(raw.get(*key)))
        .and_then(|value| clean_isrc(&value))
}

/// Clean an ISWC: strip all whitespace and uppercase. Formats vary enough
/// that no length check applies.
pub fn clean_iswc(value: &str) -> Option<String> {
    let cleaned: String = value
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

pub(crate) fn iswc_from(raw: &RawPayload, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| clean_value_string(raw.get(*key)))
        .and_then(|value| clean_iswc(&value))
}

/// Map a raw usage-type string onto the enum. Unrecognized values default
/// to `stream`.
pub fn parse_usage_type(raw: Option<&str>) -> UsageType {
    let Some(raw) = raw else {
        return UsageType::Stream;
    };
    match raw.to_lowercase().as_str() {
        "stream" | "streaming" | "play" => UsageType::Stream,
        "download" | "purchase" => UsageType::Download,
        "radio" | "radio_play" => UsageType::RadioPlay,
        "broadcast" | "tv" | "tv_broadcast" => UsageType::TvBroadcast,
        "performance" | "public_performance" => UsageType::PublicPerformance,
        "sync" | "synchronization" => UsageType::Sync,
        "mechanical" => UsageType::Mechanical,
        _ => UsageType::Stream,
    }
}

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y", "%Y%m%d", "%m/%d/%Y",
];

/// Parse a date through the accepted vendor formats, in order. Total
/// failure falls back to the current UTC date.
pub fn parse_date(raw: Option<&str>) -> NaiveDate {
    if let Some(raw) = raw {
        let raw = raw.trim();
        for format in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
                return date;
            }
        }
    }
    Utc::now().date_naive()
}

pub(crate) fn date_from(raw: &RawPayload, keys: &[&str]) -> NaiveDate {
    parse_date(first_string(raw, keys).as_deref())
}

fn value_to_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

/// Extract a play count from the given aliases, flooring at 1: zero,
/// negative, absent and unparseable counts all normalize to a single play.
pub(crate) fn play_count_from(raw: &RawPayload, keys: &[&str]) -> i64 {
    keys.iter()
        .find_map(|key| raw.get(*key).and_then(value_to_i64))
        .unwrap_or(1)
        .max(1)
}

fn value_to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else {
                n.as_f64().and_then(Decimal::from_f64)
            }
        }
        Value::String(s) => s.trim().parse::<Decimal>().ok(),
        _ => None,
    }
}

/// Extract a revenue amount from the given aliases. Absent, zero, negative
/// and unparseable amounts all normalize to None.
pub(crate) fn revenue_from(raw: &RawPayload, keys: &[&str]) -> Option<Decimal> {
    keys.iter()
        .find_map(|key| raw.get(*key).and_then(value_to_decimal))
        .filter(|amount| *amount > Decimal::ZERO)
}

/// Territory codes are truncated to their first five characters.
pub(crate) fn territory_from(raw: &RawPayload, keys: &[&str]) -> Option<String> {
    first_string(raw, keys).map(|t| t.chars().take(5).collect())
}

/// Derive a `YYYY_MM` reporting period from a usage date.
pub fn reporting_period_for(date: NaiveDate) -> String {
    date.format("%Y_%m").to_string()
}
