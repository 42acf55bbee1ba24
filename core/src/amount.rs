//! Monetary amount parsing.
//!
//! Negotiation dumps report amounts as numbers or as free text such as
//! "$ 900,000", "75000 USD" or "N/A".

use serde::{Deserialize, Deserializer};

const NULL_MARKERS: [&str; 5] = ["n/a", "na", "none", "null", "-"];

/// Parse a textual amount. Returns None for null markers, text without
/// digits, and negative or non-finite values.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let s = raw.trim().to_lowercase();
    if s.is_empty() || NULL_MARKERS.contains(&s.as_str()) {
        return None;
    }
    let start = s.find(|c: char| c.is_ascii_digit())?;
    let digits: String = s[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.')
        .filter(|c| *c != ',')
        .collect();
    let value: f64 = digits.trim_end_matches('.').parse().ok()?;
    valid(value)
}

fn valid(value: f64) -> Option<f64> {
    (value.is_finite() && value >= 0.0).then_some(value)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAmount {
    Number(f64),
    Text(String),
}

/// Optional amount field accepting numbers, numeric strings or null.
pub fn deserialize_option<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawAmount> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(RawAmount::Number(v)) => valid(v),
        Some(RawAmount::Text(s))   => parse_amount(&s),
        None                       => None,
    })
}
