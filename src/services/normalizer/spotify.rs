//! Normalizer for Spotify streaming reports.

use chrono::Utc;
use uuid::Uuid;

use super::{
    date_from, first_string, isrc_from, iswc_from, play_count_from, reporting_period_for,
    revenue_from, territory_from, Normalizer, RawPayload,
};
use crate::error::Result;
use crate::models::{NormalizedUsageEvent, UsageType};

/// Spotify reports carry `track_name`/`artist_name`/`album_name`, stream
/// counts under `streams` and earnings under `earnings`. Everything Spotify
/// delivers is a stream.
pub struct SpotifyNormalizer;

impl Normalizer for SpotifyNormalizer {
    fn source_name(&self) -> &'static str {
        "spotify"
    }

    fn normalize(&self, raw: &RawPayload) -> Result<NormalizedUsageEvent> {
        let usage_date = date_from(raw, &["date", "usage_date"]);
        let reporting_period = first_string(raw, &["reporting_period"])
            .unwrap_or_else(|| reporting_period_for(usage_date));

        Ok(NormalizedUsageEvent {
            event_id: Uuid::new_v4(),
            source: self.source_name().to_string(),
            source_event_id: first_string(raw, &["spotify_id", "source_event_id"]),
            isrc: isrc_from(raw, &["isrc"]),
            iswc: iswc_from(raw, &["iswc"]),
            reported_title: first_string(raw, &["track_name", "title"]),
            reported_artist: first_string(raw, &["artist_name", "artist"]),
            reported_album: first_string(raw, &["album_name", "album"]),
            usage_type: UsageType::Stream,
            play_count: play_count_from(raw, &["streams", "play_count"]),
            revenue_amount: revenue_from(raw, &["earnings", "revenue_amount"]),
            currency: first_string(raw, &["currency"]).unwrap_or_else(|| "USD".to_string()),
            territory: territory_from(raw, &["country", "territory"]),
            usage_date,
            reporting_period: Some(reporting_period),
            ingested_at: Utc::now(),
            content_embedding: None,
        })
    }
}
