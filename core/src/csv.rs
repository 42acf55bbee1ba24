//! CSV tables: chat feature vectors (in and out) and score records (out).
//!
//! Column order is fixed. Score tables carry the same columns in every
//! run mode; unbounded window edges and omitted sub-scores are empty
//! cells. Quoted fields may span lines.

use crate::{
    chat_features::{ChatFeatureVector, FeatureSamples},
    error::{AciError, AciResult},
    ingest::Ingested,
    scoring::AciScoreRecord,
    timestamp::parse_timestamp,
    types::normalize_group_id,
};
use chrono::{DateTime, SecondsFormat, Utc};
use std::{
    collections::HashMap,
    io::{Read, Write},
};

pub const SCORE_COLUMNS: [&str; 9] = [
    "group_id",
    "window_start",
    "window_end",
    "aci_score",
    "claim_activity",
    "payment_reliability",
    "negotiation_behavior",
    "confidence",
    "evidence_count",
];

pub const CHAT_COLUMNS: [&str; 12] = [
    "group_id",
    "negotiation_id",
    "observed_at",
    "responsiveness_score",
    "promise_fulfillment_rate",
    "price_flexibility",
    "consistency_score",
    "responsiveness_samples",
    "promise_fulfillment_samples",
    "price_flexibility_samples",
    "consistency_samples",
    "paid",
];

// ── Writers ──────────────────────────────────────────────────────────────────

pub fn write_scores<W: Write>(out: W, records: &[AciScoreRecord]) -> AciResult<()> {
    let mut wtr = ::csv::Writer::from_writer(out);
    wtr.write_record(SCORE_COLUMNS)?;
    for r in records {
        let row = [
            r.group_id.clone(),
            fmt_ts(r.window.start),
            fmt_ts(r.window.end),
            fmt_score(Some(r.aci_score)),
            fmt_score(r.sub_scores.claim_activity),
            fmt_score(r.sub_scores.payment_reliability),
            fmt_score(r.sub_scores.negotiation_behavior),
            format!("{:.4}", r.confidence),
            r.evidence_count.to_string(),
        ];
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_chat_features<W: Write>(out: W, vectors: &[ChatFeatureVector]) -> AciResult<()> {
    let mut wtr = ::csv::Writer::from_writer(out);
    wtr.write_record(CHAT_COLUMNS)?;
    for v in vectors {
        let s = &v.sample_size;
        let row = [
            v.group_id.clone(),
            v.negotiation_id.clone(),
            fmt_ts(v.observed_at),
            fmt_feature(v.responsiveness_score),
            fmt_feature(v.promise_fulfillment_rate),
            fmt_feature(v.price_flexibility),
            fmt_feature(v.consistency_score),
            s.responsiveness.to_string(),
            s.promise_fulfillment.to_string(),
            s.price_flexibility.to_string(),
            s.consistency.to_string(),
            v.paid.map(|p| p.to_string()).unwrap_or_default(),
        ];
        wtr.write_record(row)?;
    }
    wtr.flush()?;
    Ok(())
}

// ── Reader ───────────────────────────────────────────────────────────────────

/// Read chat feature vectors. Columns are matched by header name;
/// `group_id` and `negotiation_id` are required, the rest are optional.
/// A defined feature without a sample count counts as one sample.
/// Bad rows, including malformed quoting, are logged and skipped.
pub fn read_chat_features<R: Read>(reader: R, source: &str) -> AciResult<Ingested<ChatFeatureVector>> {
    let mut rdr = ::csv::ReaderBuilder::new()
        .trim(::csv::Trim::All)
        .from_reader(reader);

    let header = rdr.headers()?.clone();
    if header.is_empty() {
        log::info!("{source}: empty chat feature table");
        return Ok(Ingested { records: Vec::new(), skipped: 0 });
    }
    let index: HashMap<String, usize> = header
        .iter()
        .enumerate()
        .map(|(i, name)| (name.to_string(), i))
        .collect();
    for required in ["group_id", "negotiation_id"] {
        if !index.contains_key(required) {
            return Err(AciError::Csv {
                line: 1,
                reason: format!("missing required column '{required}'"),
            });
        }
    }

    let mut records = Vec::new();
    let mut skipped = 0;
    for result in rdr.records() {
        let row = match result {
            Ok(row) => row,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                skipped += 1;
                log::warn!("{source}: skipping row: {e}");
                continue;
            }
        };
        match parse_chat_row(&row, &index) {
            Ok(v) => records.push(v),
            Err(reason) => {
                skipped += 1;
                let line = row.position().map_or(0, |p| p.line());
                log::warn!("{source}:{line}: skipping row: {reason}");
            }
        }
    }

    log::info!("{source}: {} chat vector(s) read, {skipped} skipped", records.len());
    Ok(Ingested { records, skipped })
}

fn parse_chat_row(row: &::csv::StringRecord, index: &HashMap<String, usize>) -> Result<ChatFeatureVector, String> {
    let get = |name: &str| field(row, index, name);

    let group_id = normalize_group_id(get("group_id"));
    if group_id.is_empty() {
        return Err("empty group_id".into());
    }
    let negotiation_id = get("negotiation_id").to_string();
    if negotiation_id.is_empty() {
        return Err("empty negotiation_id".into());
    }

    let observed_at = match get("observed_at") {
        "" => None,
        raw => Some(parse_timestamp(raw).ok_or_else(|| format!("bad observed_at '{raw}'"))?),
    };

    let responsiveness = parse_feature(get("responsiveness_score"))?;
    let fulfillment = parse_feature(get("promise_fulfillment_rate"))?;
    let flexibility = parse_feature(get("price_flexibility"))?;
    let consistency = parse_feature(get("consistency_score"))?;

    Ok(ChatFeatureVector {
        group_id,
        negotiation_id,
        observed_at,
        responsiveness_score: responsiveness,
        promise_fulfillment_rate: fulfillment,
        price_flexibility: flexibility,
        consistency_score: consistency,
        sample_size: FeatureSamples {
            responsiveness:      parse_samples(get("responsiveness_samples"), responsiveness)?,
            promise_fulfillment: parse_samples(get("promise_fulfillment_samples"), fulfillment)?,
            price_flexibility:   parse_samples(get("price_flexibility_samples"), flexibility)?,
            consistency:         parse_samples(get("consistency_samples"), consistency)?,
        },
        paid: parse_paid(get("paid"))?,
    })
}

fn field<'a>(row: &'a ::csv::StringRecord, index: &HashMap<String, usize>, name: &str) -> &'a str {
    index.get(name).and_then(|&i| row.get(i)).unwrap_or("")
}

fn parse_feature(raw: &str) -> Result<Option<f64>, String> {
    if raw.is_empty() {
        return Ok(None);
    }
    let v: f64 = raw.parse().map_err(|_| format!("bad feature value '{raw}'"))?;
    if !(0.0..=1.0).contains(&v) {
        return Err(format!("feature value {v} outside [0, 1]"));
    }
    Ok(Some(v))
}

fn parse_samples(raw: &str, feature: Option<f64>) -> Result<u32, String> {
    if raw.is_empty() {
        return Ok(u32::from(feature.is_some()));
    }
    raw.parse().map_err(|_| format!("bad sample count '{raw}'"))
}

fn parse_paid(raw: &str) -> Result<Option<bool>, String> {
    match raw.to_ascii_lowercase().as_str() {
        ""              => Ok(None),
        "true" | "1"    => Ok(Some(true)),
        "false" | "0"   => Ok(Some(false)),
        other           => Err(format!("bad paid flag '{other}'")),
    }
}

// ── Field helpers ────────────────────────────────────────────────────────────

fn fmt_ts(ts: Option<DateTime<Utc>>) -> String {
    ts.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default()
}

fn fmt_score(v: Option<f64>) -> String {
    v.map(|v| format!("{v:.4}")).unwrap_or_default()
}

/// Shortest representation that parses back to the same f64.
fn fmt_feature(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}
