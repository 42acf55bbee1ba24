//! SQLite audit store for scoring runs.
//!
//! RULE: Only store.rs talks to the database.
//! Every persisted run records the exact config it was scored with, so a
//! published score can be traced back and reproduced from raw inputs.

use crate::{
    aggregate::{EvidenceCounts, TimeWindow},
    config::AciConfig,
    error::AciResult,
    scoring::{AciScoreRecord, SubScores},
    types::RunId,
    windowing::RunMode,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, types::Type, Connection, OptionalExtension};

pub struct ScoreStore {
    conn: Connection,
}

/// Metadata of a persisted run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunInfo {
    pub run_id:      RunId,
    pub mode:        String,
    pub config_json: String,
    pub version:     String,
    pub created_at:  String,
}

impl ScoreStore {
    /// Open (or create) the audit database at `path`.
    pub fn open(path: &str) -> AciResult<Self> {
        let conn = Connection::open(path)?;
        // WAL only matters for real files; in-memory databases ignore it.
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> AciResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> AciResult<()> {
        self.conn
            .execute_batch(include_str!("../../migrations/001_scores.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    /// Persist a run and all of its rows in one transaction. On error
    /// nothing is written, so no run is left without its records.
    pub fn record_run(
        &self,
        run_id:     &str,
        mode:       RunMode,
        config:     &AciConfig,
        version:    &str,
        created_at: DateTime<Utc>,
        records:    &[AciScoreRecord],
    ) -> AciResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        write_run(&tx, run_id, mode, config, version, created_at)?;
        write_scores(&tx, run_id, records)?;
        tx.commit()?;
        log::debug!("run {run_id}: persisted {} score record(s)", records.len());
        Ok(())
    }

    pub fn insert_run(
        &self,
        run_id:     &str,
        mode:       RunMode,
        config:     &AciConfig,
        version:    &str,
        created_at: DateTime<Utc>,
    ) -> AciResult<()> {
        write_run(&self.conn, run_id, mode, config, version, created_at)
    }

    pub fn run_info(&self, run_id: &str) -> AciResult<Option<RunInfo>> {
        let info = self
            .conn
            .query_row(
                "SELECT run_id, mode, config_json, version, created_at
                 FROM score_run WHERE run_id = ?1",
                params![run_id],
                |row| {
                    Ok(RunInfo {
                        run_id:      row.get(0)?,
                        mode:        row.get(1)?,
                        config_json: row.get(2)?,
                        version:     row.get(3)?,
                        created_at:  row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(info)
    }

    // ── Score records ──────────────────────────────────────────

    /// Append rows to an existing run in one transaction.
    pub fn insert_scores(&self, run_id: &str, records: &[AciScoreRecord]) -> AciResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        write_scores(&tx, run_id, records)?;
        tx.commit()?;
        log::debug!("run {run_id}: persisted {} score record(s)", records.len());
        Ok(())
    }

    /// All rows of a run, in insertion order.
    pub fn scores_for_run(&self, run_id: &str) -> AciResult<Vec<AciScoreRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT group_id, window_start, window_end, aci_score,
                    claim_activity, payment_reliability, negotiation_behavior,
                    confidence, evidence_count,
                    claim_evidence, payment_evidence, transcript_evidence
             FROM score_record WHERE run_id = ?1
             ORDER BY id ASC",
        )?;
        let records = stmt
            .query_map(params![run_id], |row| {
                Ok(AciScoreRecord {
                    group_id: row.get(0)?,
                    window: TimeWindow {
                        start: parse_ts_column(row.get(1)?, 1)?,
                        end:   parse_ts_column(row.get(2)?, 2)?,
                    },
                    aci_score: row.get(3)?,
                    sub_scores: SubScores {
                        claim_activity:       row.get(4)?,
                        payment_reliability:  row.get(5)?,
                        negotiation_behavior: row.get(6)?,
                    },
                    confidence: row.get(7)?,
                    evidence_count: row.get(8)?,
                    evidence: EvidenceCounts {
                        claims:      row.get(9)?,
                        payments:    row.get(10)?,
                        transcripts: row.get(11)?,
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn score_count(&self, run_id: &str) -> AciResult<i64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM score_record WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn write_run(
    conn:       &Connection,
    run_id:     &str,
    mode:       RunMode,
    config:     &AciConfig,
    version:    &str,
    created_at: DateTime<Utc>,
) -> AciResult<()> {
    conn.execute(
        "INSERT INTO score_run (run_id, mode, config_json, version, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            run_id,
            mode.to_string(),
            serde_json::to_string(config)?,
            version,
            fmt_ts(created_at),
        ],
    )?;
    Ok(())
}

fn write_scores(conn: &Connection, run_id: &str, records: &[AciScoreRecord]) -> AciResult<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO score_record (
            run_id, group_id, window_start, window_end, aci_score,
            claim_activity, payment_reliability, negotiation_behavior,
            confidence, evidence_count,
            claim_evidence, payment_evidence, transcript_evidence)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    )?;
    for r in records {
        stmt.execute(params![
            run_id,
            r.group_id,
            r.window.start.map(fmt_ts),
            r.window.end.map(fmt_ts),
            r.aci_score,
            r.sub_scores.claim_activity,
            r.sub_scores.payment_reliability,
            r.sub_scores.negotiation_behavior,
            r.confidence,
            r.evidence_count,
            r.evidence.claims,
            r.evidence.payments,
            r.evidence.transcripts,
        ])?;
    }
    Ok(())
}

fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn parse_ts_column(raw: Option<String>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}
