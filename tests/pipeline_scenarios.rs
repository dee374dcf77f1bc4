//! Scenario tests exercising the public pipeline surface end to end,
//! short of live Kafka/Postgres: raw payload in, normalized event and
//! outcome-message shapes out.

use chrono::NaiveDate;
use serde_json::json;
use uuid::Uuid;

use music_usage_pipeline::services::matching::{merge_suggestions, MatchCandidate};
use music_usage_pipeline::services::normalizer::clean_isrc;
use music_usage_pipeline::{
    topics, MatchMethod, NormalizedUsageEvent, NormalizerRegistry, SuggestedMatch,
    UnmatchedUsageMessage, UsageType,
};

fn normalize_from_topic(topic: &str, payload: serde_json::Value) -> NormalizedUsageEvent {
    let registry = NormalizerRegistry::new();
    let source = topics::source_for_topic(topic);
    registry.normalize(source, &payload).unwrap()
}

#[test]
fn spotify_isrc_report_normalizes_for_exact_matching() {
    let event = normalize_from_topic(
        "usage.raw.spotify",
        json!({
            "isrc": "US-RC1-17-00001",
            "streams": 42,
            "date": "2024-03-15",
            "country": "US"
        }),
    );

    assert_eq!(event.source, "spotify");
    assert_eq!(event.isrc.as_deref(), Some("USRC11700001"));
    assert_eq!(event.play_count, 42);
    assert_eq!(event.usage_type, UsageType::Stream);
    assert_eq!(event.territory.as_deref(), Some("US"));
    assert_eq!(
        event.usage_date,
        NaiveDate::from_ymd_opt(2024, 3, 15).unwrap()
    );
}

#[test]
fn isrc_lookup_key_is_stable_across_vendor_representations() {
    let keys: Vec<Option<String>> = [
        json!({ "isrc": "us-rc1-17-00001" }),
        json!({ "isrc": "US RC1 17 00001" }),
        json!({ "isrc": "USRC117 00001" }),
    ]
    .into_iter()
    .map(|payload| normalize_from_topic("usage.raw.spotify", payload).isrc)
    .collect();

    for key in &keys {
        assert_eq!(key.as_deref(), Some("USRC11700001"));
    }
    // Strategy-side re-cleaning converges on the same key.
    assert_eq!(
        clean_isrc("us-rc1-17-00001").as_deref(),
        Some("USRC11700001")
    );
}

#[test]
fn generic_radio_report_flows_through_the_catchall_normalizer() {
    let event = normalize_from_topic(
        "usage.raw.radio",
        json!({
            "title": "Lovesong",
            "artist": "The Cure",
            "plays": 7,
            "date": "2024-03-15"
        }),
    );

    assert_eq!(event.source, "generic");
    assert!(event.isrc.is_none());
    assert_eq!(event.reported_title.as_deref(), Some("Lovesong"));
    assert_eq!(event.reported_artist.as_deref(), Some("The Cure"));
    assert_eq!(event.play_count, 7);
}

#[test]
fn unknown_topics_route_to_the_generic_normalizer() {
    let event = normalize_from_topic(
        "usage.raw.some_new_dsp",
        json!({ "song_name": "Xyzzy", "quantity": "3" }),
    );
    assert_eq!(event.source, "generic");
    assert_eq!(event.reported_title.as_deref(), Some("Xyzzy"));
    assert_eq!(event.play_count, 3);
}

#[test]
fn normalized_bus_message_round_trips() {
    let event = normalize_from_topic(
        "usage.raw.apple_music",
        json!({
            "song_name": "Ode to Joy",
            "artist_name": "Berlin Philharmonic",
            "play_count": 2,
            "begin_date": "2024-03-01",
            "end_date": "2024-03-31",
            "royalty_amount": "0.42",
            "royalty_currency": "EUR",
            "storefront": "de"
        }),
    );

    let encoded = serde_json::to_value(&event).unwrap();
    let decoded: NormalizedUsageEvent = serde_json::from_value(encoded.clone()).unwrap();
    assert_eq!(decoded, event);
    assert_eq!(serde_json::to_value(&decoded).unwrap(), encoded);
}

#[test]
fn suggestion_lists_are_bounded_and_strictly_ranked() {
    let candidates: Vec<MatchCandidate> = [0.63, 0.72, 0.68, 0.61, 0.70, 0.66]
        .iter()
        .map(|confidence| MatchCandidate {
            work_id: Uuid::new_v4(),
            recording_id: None,
            confidence: *confidence,
            method: MatchMethod::AiEmbedding,
        })
        .collect();

    let merged = merge_suggestions(candidates, 5);
    assert_eq!(merged.len(), 5);
    for pair in merged.windows(2) {
        assert!(pair[0].confidence >= pair[1].confidence);
    }
    assert_eq!(merged[0].confidence, 0.72);
}

#[test]
fn unmatched_message_matches_the_review_queue_contract() {
    let event = normalize_from_topic(
        "usage.raw.generic",
        json!({ "title": "Xyzzy", "date": "2024-03-15" }),
    );

    let suggestions: Vec<SuggestedMatch> = [0.72, 0.68, 0.63]
        .iter()
        .map(|confidence| SuggestedMatch {
            work_id: Uuid::new_v4(),
            recording_id: None,
            confidence: *confidence,
            method: MatchMethod::AiEmbedding,
        })
        .collect();

    let message = UnmatchedUsageMessage::new(&event, suggestions, "no_confident_match");
    let encoded = serde_json::to_value(&message).unwrap();

    assert_eq!(encoded["reason"], json!("no_confident_match"));
    assert_eq!(encoded["usage_event_id"], json!(event.event_id));
    let confidences: Vec<f64> = encoded["suggested_matches"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["confidence"].as_f64().unwrap())
        .collect();
    assert_eq!(confidences, vec![0.72, 0.68, 0.63]);
    assert!(encoded["queued_at"].is_string());
}

#[test]
fn currency_defaults_to_usd_across_sources() {
    for topic in [
        "usage.raw.spotify",
        "usage.raw.apple_music",
        "usage.raw.radio",
        "usage.raw.generic",
    ] {
        let event = normalize_from_topic(topic, json!({ "title": "X" }));
        assert_eq!(event.currency, "USD", "source {topic}");
    }
}

#[test]
fn play_count_floor_holds_across_sources() {
    let zero_reports = [
        ("usage.raw.spotify", json!({ "streams": 0 })),
        ("usage.raw.apple_music", json!({ "play_count": -3 })),
        ("usage.raw.generic", json!({ "plays": "garbage" })),
        ("usage.raw.radio", json!({})),
    ];

    for (topic, payload) in zero_reports {
        let event = normalize_from_topic(topic, payload);
        assert!(event.play_count >= 1, "source {topic}");
    }
}
