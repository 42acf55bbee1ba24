//! Timestamp parsing for ingested records.
//!
//! Collector dumps carry RFC 3339 strings, naive "YYYY-MM-DD HH:MM:SS"
//! strings, bare dates and unix seconds. Everything is normalized to UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer};

use crate::types::Year;

const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

/// Parse a timestamp string. Returns None for anything unrecognized.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Midnight UTC on January 1st of `year`.
pub fn year_start(year: Year) -> Option<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).single()
}

/// Recover a date from a leading `YYYYMMDD` in an identifier
/// (negotiation ids are often the chat's opening date).
pub fn date_from_id_prefix(id: &str) -> Option<DateTime<Utc>> {
    let prefix = id.get(..8)?;
    if !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let date = NaiveDate::parse_from_str(prefix, "%Y%m%d").ok()?;
    let year = prefix[..4].parse::<Year>().ok()?;
    if !(2000..=2100).contains(&year) {
        return None;
    }
    date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Unix(i64),
    Text(String),
}

impl RawTimestamp {
    fn resolve(self) -> Option<DateTime<Utc>> {
        match self {
            RawTimestamp::Unix(secs) => Utc.timestamp_opt(secs, 0).single(),
            RawTimestamp::Text(s)    => parse_timestamp(&s),
        }
    }
}

/// Required timestamp field. Unparseable values reject the record.
pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    RawTimestamp::deserialize(deserializer)?
        .resolve()
        .ok_or_else(|| de::Error::custom("unrecognized timestamp"))
}

/// Optional timestamp field. Unparseable values become None.
pub mod option {
    use super::RawTimestamp;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<RawTimestamp> = Option::deserialize(deserializer)?;
        Ok(raw.and_then(RawTimestamp::resolve))
    }
}
