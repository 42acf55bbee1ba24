//! CSV tables: score output layout and chat feature interchange.

use aci_core::{
    aggregate::{EvidenceCounts, TimeWindow},
    chat_features::{ChatFeatureVector, FeatureSamples},
    csv::{read_chat_features, write_chat_features, write_scores, SCORE_COLUMNS},
    error::AciError,
    scoring::{AciScoreRecord, SubScores},
};
use chrono::{TimeZone, Utc};
use std::io::Cursor;

fn record(group: &str, window: TimeWindow) -> AciScoreRecord {
    AciScoreRecord {
        group_id: group.into(),
        window,
        aci_score: 84.0,
        sub_scores: SubScores {
            claim_activity:       None,
            payment_reliability:  Some(12.5),
            negotiation_behavior: Some(84.0),
        },
        confidence: 0.3,
        evidence_count: 3,
        evidence: EvidenceCounts { claims: 0, payments: 2, transcripts: 1 },
    }
}

fn render(records: &[AciScoreRecord]) -> Vec<String> {
    let mut buf = Vec::new();
    write_scores(&mut buf, records).unwrap();
    String::from_utf8(buf).unwrap().lines().map(str::to_string).collect()
}

/// Header is fixed; omitted sub-scores and unbounded edges are empty cells.
#[test]
fn score_table_layout() {
    let lines = render(&[record("alpha", TimeWindow::unbounded())]);

    assert_eq!(lines[0], SCORE_COLUMNS.join(","));
    assert_eq!(lines[1], "alpha,,,84.0000,,12.5000,84.0000,0.3000,3");
}

/// Year windows print both edges.
#[test]
fn score_table_prints_window_edges() {
    let lines = render(&[record("beta", TimeWindow::year(2022).unwrap())]);
    assert!(
        lines[1].starts_with("beta,2022-01-01T00:00:00Z,2023-01-01T00:00:00Z,"),
        "Unexpected row: {}",
        lines[1]
    );
}

/// Chat vectors written by one stage read back identically in the next.
#[test]
fn chat_features_survive_csv() {
    let vectors = vec![
        ChatFeatureVector {
            group_id: "alpha".into(),
            negotiation_id: "chat, \"one\"".into(),
            observed_at: Some(Utc.with_ymd_and_hms(2022, 5, 4, 3, 2, 1).unwrap()),
            responsiveness_score: Some(0.1 + 0.2),
            promise_fulfillment_rate: None,
            price_flexibility: Some(2.0 / 3.0),
            consistency_score: Some(1.0),
            sample_size: FeatureSamples {
                responsiveness: 4,
                promise_fulfillment: 0,
                price_flexibility: 1,
                consistency: 3,
            },
            paid: Some(false),
        },
        ChatFeatureVector {
            group_id: "beta".into(),
            negotiation_id: "b-1".into(),
            observed_at: None,
            responsiveness_score: None,
            promise_fulfillment_rate: None,
            price_flexibility: None,
            consistency_score: None,
            sample_size: FeatureSamples::default(),
            paid: None,
        },
    ];

    let mut buf = Vec::new();
    write_chat_features(&mut buf, &vectors).unwrap();
    let back = read_chat_features(Cursor::new(buf), "mem").unwrap();

    assert_eq!(back.skipped, 0);
    assert_eq!(back.records, vectors);
}

/// Columns are matched by name; absent optional columns default.
#[test]
fn reader_accepts_minimal_columns() {
    let input = "negotiation_id,group_id,consistency_score\n\
                 n1, LockBit3 ,0.75\n";
    let read = read_chat_features(Cursor::new(input), "mem").unwrap();
    let v = &read.records[0];

    assert_eq!(v.group_id, "lockbit3");
    assert_eq!(v.consistency_score, Some(0.75));
    assert_eq!(v.responsiveness_score, None);
    assert_eq!(v.sample_size.consistency, 1, "Defined feature without count weighs 1");
    assert_eq!(v.sample_size.responsiveness, 0);
}

/// Bad rows are skipped and counted; the rest still load.
#[test]
fn reader_skips_bad_rows() {
    let input = "group_id,negotiation_id,responsiveness_score\n\
                 alpha,n1,0.5\n\
                 alpha,n2,1.7\n\
                 ,n3,0.2\n\
                 beta,n4,abc\n\
                 beta,n5,\n";
    let read = read_chat_features(Cursor::new(input), "mem").unwrap();

    assert_eq!(read.skipped, 3, "Expected 3 skipped rows");
    let ids: Vec<&str> = read.records.iter().map(|v| v.negotiation_id.as_str()).collect();
    assert_eq!(ids, vec!["n1", "n5"]);
}

/// A header without the identifying columns is rejected outright.
#[test]
fn reader_requires_identity_columns() {
    let input = "group,chat\nalpha,n1\n";
    let err = read_chat_features(Cursor::new(input), "mem").unwrap_err();
    assert!(matches!(err, AciError::Csv { line: 1, .. }), "Got {err:?}");
}

/// Quoted fields may span lines and still read back intact.
#[test]
fn multiline_fields_survive_csv() {
    let vectors = vec![ChatFeatureVector {
        group_id: "alpha".into(),
        negotiation_id: "line one\nline two".into(),
        observed_at: None,
        responsiveness_score: Some(0.5),
        promise_fulfillment_rate: None,
        price_flexibility: None,
        consistency_score: None,
        sample_size: FeatureSamples { responsiveness: 2, ..FeatureSamples::default() },
        paid: Some(true),
    }];

    let mut buf = Vec::new();
    write_chat_features(&mut buf, &vectors).unwrap();
    let back = read_chat_features(Cursor::new(buf), "mem").unwrap();

    assert_eq!(back.skipped, 0);
    assert_eq!(back.records, vectors);
}

/// An unterminated quote costs the rows it swallows, not the whole file.
#[test]
fn unterminated_quote_skips_rows() {
    let input = "group_id,negotiation_id,responsiveness_score\n\
                 alpha,n1,0.5\n\
                 alpha,\"n2,0.5\n\
                 beta,n3,0.4\n";
    let read = read_chat_features(Cursor::new(input), "mem").unwrap();

    let ids: Vec<&str> = read.records.iter().map(|v| v.negotiation_id.as_str()).collect();
    assert_eq!(ids, vec!["n1"]);
    assert_eq!(read.skipped, 1, "Expected the open-quoted row skipped");
}
