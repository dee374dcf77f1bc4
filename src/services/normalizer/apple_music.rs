//! Normalizer for Apple Music consumption reports.

use chrono::Utc;
use uuid::Uuid;

use super::{
    date_from, first_string, isrc_from, iswc_from, parse_date, play_count_from,
    reporting_period_for, revenue_from, territory_from, Normalizer, RawPayload,
};
use crate::error::Result;
use crate::models::{NormalizedUsageEvent, UsageType};

/// Apple Music reports name fields differently (`song_name`,
/// `container_name`, `storefront`) and distinguish purchases from streams
/// through `product_type_identifier`.
pub struct AppleMusicNormalizer;

impl AppleMusicNormalizer {
    fn usage_type(raw: &RawPayload) -> UsageType {
        let product_type = raw
            .get("product_type_identifier")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_lowercase();
        if product_type.contains("download") || product_type.contains("purchase") {
            UsageType::Download
        } else {
            UsageType::Stream
        }
    }

    /// Apple provides `begin_date`/`end_date` for the reporting window; the
    /// period is derived from the window start when no explicit period is
    /// present, falling back to the usage date.
    fn reporting_period(raw: &RawPayload, usage_date: chrono::NaiveDate) -> String {
        if let Some(period) = first_string(raw, &["reporting_period"]) {
            return period;
        }
        let begin = first_string(raw, &["begin_date"]);
        let end = first_string(raw, &["end_date"]);
        if let (Some(begin), Some(_)) = (begin, end) {
            return reporting_period_for(parse_date(Some(&begin)));
        }
        reporting_period_for(usage_date)
    }
}

impl Normalizer for AppleMusicNormalizer {
    fn source_name(&self) -> &'static str {
        "apple_music"
    }

    fn normalize(&self, raw: &RawPayload) -> Result<NormalizedUsageEvent> {
        let usage_date = date_from(raw, &["begin_date", "usage_date", "date"]);

        Ok(NormalizedUsageEvent {
            event_id: Uuid::new_v4(),
            source: self.source_name().to_string(),
            source_event_id: first_string(raw, &["vendor_identifier", "source_event_id"]),
            isrc: isrc_from(raw, &["isrc", "apple_identifier"]),
            iswc: iswc_from(raw, &["iswc"]),
            reported_title: first_string(raw, &["song_name", "content_name", "title"]),
            reported_artist: first_string(raw, &["artist_name", "artist"]),
            reported_album: first_string(raw, &["container_name", "album_name", "album"]),
            usage_type: Self::usage_type(raw),
            play_count: play_count_from(raw, &["play_count", "quantity"]),
            revenue_amount: revenue_from(raw, &["royalty_amount", "revenue_amount"]),
            currency: first_string(raw, &["royalty_currency", "currency"])
                .unwrap_or_else(|| "USD".to_string()),
            territory: territory_from(raw, &["storefront", "territory"]),
            usage_date,
            reporting_period: Some(Self::reporting_period(raw, usage_date)),
            ingested_at: Utc::now(),
            content_embedding: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn normalize(value: serde_json::Value) -> NormalizedUsageEvent {
        AppleMusicNormalizer
            .normalize(value.as_object().unwrap())
            .unwrap()
    }

    #[test]
    fn normalizes_a_streaming_report() {
        let event = normalize(json!({
            "song_name": "Ode to Joy",
            "artist_name": "Berlin Philharmonic",
            "container_name": "Beethoven: Symphony No. 9",
            "apple_identifier": "DE-A12-84-00401",
            "play_count": 11,
            "storefront": "de",
            "begin_date": "2024-03-01",
            "end_date": "2024-03-31",
            "royalty_amount": "2.04",
            "royalty_currency": "EUR",
            "vendor_identifier": "am-5521"
        }));

        assert_eq!(event.source, "apple_music");
        assert_eq!(event.isrc.as_deref(), Some("DEA128400401"));
        assert_eq!(event.reported_title.as_deref(), Some("Ode to Joy"));
        assert_eq!(
            event.reported_album.as_deref(),
            Some("Beethoven: Symphony No. 9")
        );
        assert_eq!(event.usage_type, UsageType::Stream);
        assert_eq!(event.play_count, 11);
        assert_eq!(event.currency, "EUR");
        assert_eq!(event.territory.as_deref(), Some("de"));
        assert_eq!(
            event.usage_date,
            NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
        );
        assert_eq!(event.reporting_period.as_deref(), Some("2024_03"));
        assert_eq!(event.source_event_id.as_deref(), Some("am-5521"));
    }

    #[test]
    fn product_type_drives_download_classification() {
        for product_type in ["Song Download", "ALBUM PURCHASE", "purchase-bundle"] {
            let event = normalize(json!({
                "song_name": "X",
                "product_type_identifier": product_type
            }));
            assert_eq!(event.usage_type, UsageType::Download);
        }

        let event = normalize(json!({
            "song_name": "X",
            "product_type_identifier": "streaming-subscription"
        }));
        assert_eq!(event.usage_type, UsageType::Stream);

        let event = normalize(json!({ "song_name": "X" }));
        assert_eq!(event.usage_type, UsageType::Stream);
    }

    #[test]
    fn isrc_prefers_the_isrc_field_over_apple_identifier() {
        let event = normalize(json!({
            "isrc": "USRC11700001",
            "apple_identifier": "GBUM71203921"
        }));
        assert_eq!(event.isrc.as_deref(), Some("USRC11700001"));
    }

    #[test]
    fn reporting_period_prefers_the_window_start() {
        // Without an end date the period falls back to the usage date.
        let event = normalize(json!({
            "song_name": "X",
            "begin_date": "2024-02-01",
            "usage_date": "2024-03-15"
        }));
        assert_eq!(event.reporting_period.as_deref(), Some("2024_02"));

        let event = normalize(json!({
            "song_name": "X",
            "usage_date": "2024-03-15"
        }));
        assert_eq!(event.reporting_period.as_deref(), Some("2024_03"));
    }
}
