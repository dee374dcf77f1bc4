//! Catch-all normalizer for DSPs without a dedicated dialect.

use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use super::{
    date_from, first_string, isrc_from, iswc_from, parse_usage_type, play_count_from,
    reporting_period_for, revenue_from, territory_from, Normalizer, RawPayload,
};
use crate::error::Result;
use crate::models::NormalizedUsageEvent;

/// Tries the common field names in a fixed order; also serves radio feeds
/// and unknown sources.
pub struct GenericNormalizer;

impl GenericNormalizer {
    /// Vendor event ids are sometimes numeric; stringify them rather than
    /// dropping the identifier.
    fn source_event_id(raw: &RawPayload, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|key| match raw.get(*key) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }
}

impl Normalizer for GenericNormalizer {
    fn source_name(&self) -> &'static str {
        "generic"
    }

    fn normalize(&self, raw: &RawPayload) -> Result<NormalizedUsageEvent> {
        let usage_date = date_from(
            raw,
            &["date", "usage_date", "period_date", "transaction_date"],
        );
        let reporting_period = first_string(raw, &["reporting_period", "period", "period_code"])
            .unwrap_or_else(|| reporting_period_for(usage_date));

        // Payloads routed here from unknown topics may still name their
        // origin; keep it instead of the generic tag.
        let source =
            first_string(raw, &["source"]).unwrap_or_else(|| self.source_name().to_string());

        Ok(NormalizedUsageEvent {
            event_id: Uuid::new_v4(),
            source,
            source_event_id: Self::source_event_id(
                raw,
                &["source_event_id", "event_id", "transaction_id", "id"],
            ),
            isrc: isrc_from(raw, &["isrc", "ISRC", "recording_code"]),
            iswc: iswc_from(raw, &["iswc", "ISWC"]),
            reported_title: first_string(
                raw,
                &[
                    "title",
                    "track_name",
                    "song_name",
                    "name",
                    "track_title",
                    "reported_title",
                ],
            ),
            reported_artist: first_string(
                raw,
                &[
                    "artist",
                    "artist_name",
                    "performer",
                    "main_artist",
                    "reported_artist",
                ],
            ),
            reported_album: first_string(
                raw,
                &[
                    "album",
                    "album_name",
                    "release_name",
                    "album_title",
                    "reported_album",
                ],
            ),
            usage_type: parse_usage_type(
                first_string(raw, &["usage_type", "type", "transaction_type"]).as_deref(),
            ),
            play_count: play_count_from(
                raw,
                &[
                    "plays",
                    "play_count",
                    "streams",
                    "quantity",
                    "units",
                    "count",
                    "total_plays",
                    "stream_count",
                ],
            ),
            revenue_amount: revenue_from(
                raw,
                &[
                    "revenue",
                    "revenue_amount",
                    "amount",
                    "earnings",
                    "royalty",
                    "royalty_amount",
                    "net_revenue",
                    "gross_revenue",
                    "payment",
                ],
            ),
            currency: first_string(raw, &["currency", "currency_code", "royalty_currency"])
                .unwrap_or_else(|| "USD".to_string()),
            territory: territory_from(raw, &["country", "territory", "region", "country_code"]),
            usage_date,
            reporting_period: Some(reporting_period),
            ingested_at: Utc::now(),
            content_embedding: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UsageType;
    use chrono::NaiveDate;
    use serde_json::json;

    fn normalize(value: serde_json::Value) -> NormalizedUsageEvent {
        GenericNormalizer
            .normalize(value.as_object().unwrap())
            .unwrap()
    }

    #[test]
    fn normalizes_a_radio_style_report() {
        let event = normalize(json!({
            "title": "Lovesong",
            "artist": "The Cure",
            "plays": 7,
            "date": "2024-03-15",
            "region": "GB",
            "type": "radio",
            "transaction_id": 44812
        }));

        assert_eq!(event.source, "generic");
        assert_eq!(event.reported_title.as_deref(), Some("Lovesong"));
        assert_eq!(event.reported_artist.as_deref(), Some("The Cure"));
        assert_eq!(event.usage_type, UsageType::RadioPlay);
        assert_eq!(event.play_count, 7);
        assert_eq!(event.territory.as_deref(), Some("GB"));
        assert_eq!(
            event.usage_date,
            NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
        );
        assert_eq!(event.source_event_id.as_deref(), Some("44812"));
    }

    #[test]
    fn keeps_the_declared_source_tag() {
        let event = normalize(json!({ "title": "X", "source": "bandcamp" }));
        assert_eq!(event.source, "bandcamp");

        let event = normalize(json!({ "title": "X" }));
        assert_eq!(event.source, "generic");
    }

    #[test]
    fn walks_the_alias_chains_in_order() {
        let event = normalize(json!({
            "track_title": "Fallback Title",
            "performer": "Fallback Artist",
            "release_name": "Fallback Album",
            "units": "13",
            "royalty": 4.20,
            "currency_code": "JPY",
            "country_code": "JP",
            "period_code": "2024_Q1"
        }));

        assert_eq!(event.reported_title.as_deref(), Some("Fallback Title"));
        assert_eq!(event.reported_artist.as_deref(), Some("Fallback Artist"));
        assert_eq!(event.reported_album.as_deref(), Some("Fallback Album"));
        assert_eq!(event.play_count, 13);
        assert_eq!(event.revenue_amount, Some("4.20".parse().unwrap()));
        assert_eq!(event.currency, "JPY");
        assert_eq!(event.territory.as_deref(), Some("JP"));
        assert_eq!(event.reporting_period.as_deref(), Some("2024_Q1"));
    }

    #[test]
    fn uppercase_identifier_aliases_are_recognized() {
        let event = normalize(json!({
            "ISRC": "gb-um7-12-03921",
            "ISWC": "t 034 524 680 1"
        }));
        assert_eq!(event.isrc.as_deref(), Some("GBUM71203921"));
        assert_eq!(event.iswc.as_deref(), Some("T0345246801"));
    }

    #[test]
    fn unknown_usage_types_default_to_stream() {
        let event = normalize(json!({ "title": "X", "type": "subscription-bundle" }));
        assert_eq!(event.usage_type, UsageType::Stream);
    }

    #[test]
    fn currency_defaults_to_usd() {
        let event = normalize(json!({ "title": "X" }));
        assert_eq!(event.currency, "USD");
    }
}
