//! Audit store: runs and their score records persist and read back.

use aci_core::{
    aggregate::{EvidenceCounts, TimeWindow},
    config::AciConfig,
    scoring::{AciScoreRecord, SubScores},
    store::ScoreStore,
    windowing::RunMode,
};
use chrono::{TimeZone, Utc};

fn store() -> ScoreStore {
    let store = ScoreStore::in_memory().expect("in-memory store");
    store.migrate().expect("migration");
    store
}

fn record(group: &str, window: TimeWindow, aci: f64) -> AciScoreRecord {
    AciScoreRecord {
        group_id: group.into(),
        window,
        aci_score: aci,
        sub_scores: SubScores {
            claim_activity:       Some(aci),
            payment_reliability:  None,
            negotiation_behavior: Some(1.0 / 3.0),
        },
        confidence: 0.7,
        evidence_count: 7,
        evidence: EvidenceCounts { claims: 5, payments: 0, transcripts: 2 },
    }
}

/// Records written for a run come back unchanged and in order.
#[test]
fn scores_round_trip_through_store() {
    let store = store();
    let created = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
    store
        .insert_run("run-1", RunMode::ByYear, &AciConfig::default(), "0.1.0-test", created)
        .unwrap();

    let records = vec![
        record("alpha", TimeWindow::year(2022).unwrap(), 71.25),
        record("beta", TimeWindow::as_of_year(2023).unwrap(), 0.1 + 0.2),
        record("gamma", TimeWindow::unbounded(), 100.0),
    ];
    store.insert_scores("run-1", &records).unwrap();

    assert_eq!(store.score_count("run-1").unwrap(), 3);
    assert_eq!(store.scores_for_run("run-1").unwrap(), records);
}

/// The run row keeps mode, version and the exact config used.
#[test]
fn run_metadata_recorded() {
    let store = store();
    let config = AciConfig { evidence_floor: 25, ..AciConfig::default() };
    let created = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
    store
        .insert_run("run-2", RunMode::AsOfYear(2023), &config, "0.1.0-test", created)
        .unwrap();

    let info = store.run_info("run-2").unwrap().expect("run exists");
    assert_eq!(info.mode, "as_of_year(2023)");
    assert_eq!(info.version, "0.1.0-test");
    assert_eq!(info.created_at, "2024-06-01T00:00:00Z");

    let stored: AciConfig = serde_json::from_str(&info.config_json).unwrap();
    assert_eq!(stored, config);

    assert!(store.run_info("missing").unwrap().is_none());
}

/// Runs are isolated from each other.
#[test]
fn scores_scoped_to_run() {
    let store = store();
    let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    for run in ["a", "b"] {
        store
            .insert_run(run, RunMode::Single, &AciConfig::default(), "t", created)
            .unwrap();
    }
    store
        .insert_scores("a", &[record("alpha", TimeWindow::unbounded(), 50.0)])
        .unwrap();

    assert_eq!(store.score_count("a").unwrap(), 1);
    assert_eq!(store.score_count("b").unwrap(), 0);
}

/// Scores cannot reference a run that was never recorded.
#[test]
fn scores_require_known_run() {
    let store = store();
    let result = store.insert_scores("ghost", &[record("alpha", TimeWindow::unbounded(), 1.0)]);
    assert!(result.is_err(), "Insert for unknown run should fail");
}

/// Run ids are unique.
#[test]
fn duplicate_run_rejected() {
    let store = store();
    let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    store
        .insert_run("dup", RunMode::Single, &AciConfig::default(), "t", created)
        .unwrap();
    assert!(store
        .insert_run("dup", RunMode::Single, &AciConfig::default(), "t", created)
        .is_err());
}

/// A run and its rows are written together.
#[test]
fn record_run_writes_run_and_rows() {
    let store = store();
    let created = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    let records = vec![
        record("alpha", TimeWindow::year(2022).unwrap(), 40.0),
        record("beta", TimeWindow::year(2022).unwrap(), 60.0),
    ];
    store
        .record_run("full", RunMode::ByYear, &AciConfig::default(), "t", created, &records)
        .unwrap();

    assert_eq!(store.run_info("full").unwrap().map(|i| i.mode), Some("by_year".to_string()));
    assert_eq!(store.scores_for_run("full").unwrap(), records);
}

/// A row that cannot be stored rolls back the whole run.
#[test]
fn failed_record_run_leaves_nothing_behind() {
    let store = store();
    let created = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
    // NaN binds as NULL and violates the NOT NULL score column.
    let records = vec![
        record("alpha", TimeWindow::unbounded(), 40.0),
        record("beta", TimeWindow::unbounded(), f64::NAN),
    ];

    let result = store.record_run("broken", RunMode::Single, &AciConfig::default(), "t", created, &records);

    assert!(result.is_err(), "Expected the NULL score to be rejected");
    assert!(store.run_info("broken").unwrap().is_none(), "Orphaned run row left behind");
    assert_eq!(store.score_count("broken").unwrap(), 0);
}
