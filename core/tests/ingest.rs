//! Ingestion of collector dumps, wallet attribution and config files.

use aci_core::{
    attribution::WalletAttribution,
    chat_features::ChatFeatureExtractor,
    config::{AciConfig, NormalizationMethod},
    error::AciError,
    evidence::{ClaimEvent, ClaimType, NegotiationTranscript, PaymentEvent, Sender},
    ingest::read_jsonl,
};
use chrono::{TimeZone, Utc};
use std::io::Cursor;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// A line that is not valid UTF-8 is skipped like any other bad record.
#[test]
fn invalid_utf8_line_is_skipped() {
    init_logging();
    let mut input = Vec::new();
    input.extend_from_slice(b"{\"group\": \"alpha\", \"claim_date\": \"2023-01-01\"}\n");
    input.extend_from_slice(b"{\"group\": \"\xff\xfe\", \"claim_date\": \"2023-01-02\"}\n");
    input.extend_from_slice(b"{\"group\": \"beta\", \"claim_date\": \"2023-01-03\"}\n");

    let read = read_jsonl::<ClaimEvent, _>(Cursor::new(input), "claims").unwrap();

    assert_eq!(read.records.len(), 2, "Parsed: {:?}", read.records);
    assert_eq!(read.skipped, 1);
    assert_eq!(read.records[1].group_id, "beta");
}

/// Publish dates, deadlines and payment outcomes are read when present.
#[test]
fn follow_through_fields_are_optional() {
    let claims = r#"
{"group": "play", "claim_date": "2023-03-01", "publish_date": "2023-03-10", "deadline": "2023-03-12 00:00:00"}
{"group": "play", "claim_date": "2023-03-02", "publish_date": "", "deadline": null}
"#;
    let read = read_jsonl::<ClaimEvent, _>(Cursor::new(claims), "claims").unwrap();
    assert_eq!(read.skipped, 0);
    assert_eq!(read.records[0].publish_date, Some(Utc.with_ymd_and_hms(2023, 3, 10, 0, 0, 0).unwrap()));
    assert_eq!(read.records[0].published_on_time(), Some(true));
    assert_eq!(read.records[1].publish_date, None);
    assert_eq!(read.records[1].published_on_time(), None);

    let chats = r#"{"group": "play", "chat_id": "c1", "meta": {"initialransom": "$ 10", "paid": true}, "messages": []}"#;
    let read = read_jsonl::<NegotiationTranscript, _>(Cursor::new(chats), "chats").unwrap();
    assert_eq!(read.records[0].ransom.paid, Some(true));
}

/// Raw collector field names are accepted and group names normalized.
#[test]
fn claims_accept_collector_fields() {
    let input = r#"
{"group": " LockBit3 ", "claim_date": "2023-04-01 10:30:00", "victim_legal_name": "Acme"}
{"group_id": "alphv", "timestamp": "2023-05-01T00:00:00Z", "claim_type": "extortion", "source_confidence": 0.6}
not json at all
{"group": "", "claim_date": "2023-04-01"}
{"group": "play", "claim_date": "yesterday"}
"#;
    init_logging();
    let read = read_jsonl::<ClaimEvent, _>(Cursor::new(input), "claims").unwrap();

    assert_eq!(read.records.len(), 2, "Parsed: {:?}", read.records);
    assert_eq!(read.skipped, 3);

    let first = &read.records[0];
    assert_eq!(first.group_id, "lockbit3");
    assert_eq!(first.timestamp, Utc.with_ymd_and_hms(2023, 4, 1, 10, 30, 0).unwrap());
    assert_eq!(first.claim_type, ClaimType::Post);
    assert_eq!(first.source_confidence, 1.0);
    assert_eq!(read.records[1].claim_type, ClaimType::Extortion);
}

/// Payment amounts may be numbers or formatted strings; the group is optional.
#[test]
fn payments_parse_amounts_and_missing_groups() {
    let input = r#"
{"address": "bc1q-a", "first_tx_at": 1672531200, "amount_usd": "$ 900,000"}
{"group": "Akira", "address": "bc1q-b", "first_tx_at": "2023-02-01", "amount_usd": 75000}
{"group": "akira", "address": "bc1q-c", "first_tx_at": "2023-02-02", "amount_usd": "N/A"}
"#;
    let read = read_jsonl::<PaymentEvent, _>(Cursor::new(input), "payments").unwrap();
    let p = &read.records;

    assert_eq!(p.len(), 3);
    assert_eq!(p[0].group_id, None);
    assert_eq!(p[0].amount, Some(900_000.0));
    assert_eq!(p[0].timestamp, Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap());
    assert_eq!(p[1].group_id.as_deref(), Some("akira"));
    assert_eq!(p[1].currency, "USD");
    assert_eq!(p[2].amount, None);
}

/// Transcripts in the collector layout map onto actor/victim messages.
#[test]
fn transcripts_accept_collector_layout() {
    let input = r#"{"group": "Conti", "chat_id": "20210601-x", "meta": {"initialransom": "$ 2,000,000", "negotiatedransom": "$ 500,000"}, "messages": [{"party": "conti", "content": "Pay.", "time": "2021-06-01 10:00"}, {"party": "Victim", "content": "No."}]}"#;
    let read = read_jsonl::<NegotiationTranscript, _>(Cursor::new(input), "chats").unwrap();
    let t = &read.records[0];

    assert_eq!(t.group_id, "conti");
    assert_eq!(t.negotiation_id, "20210601-x");
    assert_eq!(t.messages[0].sender, Sender::Actor);
    assert_eq!(t.messages[1].sender, Sender::Victim);
    assert_eq!(t.messages[1].timestamp, None);
    assert_eq!(t.ransom.initial_demand, Some(2_000_000.0));
    assert_eq!(t.ransom.negotiated_price, Some(500_000.0));
    assert!(t.has_monetary_amounts());
}

/// Wallet attribution fills missing groups only.
#[test]
fn attribution_resolves_known_wallets() {
    let mut table = WalletAttribution::new();
    table.insert("bc1q-a", " Akira ");
    table.insert("bc1q-b", "lockbit3");

    let payments = vec![
        payment(None, "bc1q-a"),
        payment(Some("play"), "bc1q-b"),
        payment(None, "bc1q-unknown"),
    ];
    let out = table.attribute(&payments);

    assert_eq!(out.resolved, 1);
    assert_eq!(out.unattributed, 1);
    assert_eq!(out.payments[0].group_id.as_deref(), Some("akira"));
    assert_eq!(out.payments[1].group_id.as_deref(), Some("play"), "Existing group kept");
    assert_eq!(out.payments[2].group_id, None);
}

fn payment(group: Option<&str>, wallet: &str) -> PaymentEvent {
    PaymentEvent {
        group_id: group.map(str::to_string),
        timestamp: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
        amount: None,
        currency: "USD".into(),
        wallet_id: wallet.into(),
    }
}

/// Partial config files take defaults for everything not given.
#[test]
fn config_file_partial_defaults() {
    let path = std::env::temp_dir().join(format!("aci-config-{}.json", std::process::id()));
    std::fs::write(&path, r#"{"evidence_floor": 4, "normalization": "percentile_rank"}"#).unwrap();

    let config = AciConfig::load(path.to_str().unwrap()).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(config.evidence_floor, 4);
    assert_eq!(config.normalization, NormalizationMethod::PercentileRank);
    assert_eq!(config.chat_feature_weights, AciConfig::default().chat_feature_weights);
}

/// Config validation rejects unusable values.
#[test]
fn config_validation() {
    assert!(AciConfig::default().validate().is_ok());

    let zero_floor = AciConfig { evidence_floor: 0, ..AciConfig::default() };
    assert!(matches!(zero_floor.validate(), Err(AciError::InvalidConfig(_))));

    let mut inverted = AciConfig::default();
    inverted.response_time_range_hours.min_hours = 80.0;
    assert!(matches!(inverted.validate(), Err(AciError::InvalidConfig(_))));

    let huge_gap = AciConfig { session_gap_hours: 1e18, ..AciConfig::default() };
    assert!(matches!(huge_gap.validate(), Err(AciError::InvalidConfig(_))));
    assert!(
        matches!(ChatFeatureExtractor::new(&huge_gap), Err(AciError::InvalidConfig(_))),
        "An out-of-range session gap must be an error, not a panic"
    );

    assert!(AciConfig::load("/nonexistent/aci.json").is_err());
}
