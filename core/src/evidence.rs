//! Evidence records: the immutable inputs of every scoring run.
//!
//! RULE: Evidence is never mutated after ingestion. Everything derived
//! from it (chat vectors, profiles, scores) is rebuilt on every run.
//!
//! Field aliases accept the raw collector dumps (`group`, `claim_date`,
//! `first_tx_at`, `amount_usd`, `address`, `chat_id`, `party`, `content`).

use crate::{
    amount,
    timestamp,
    types::{normalize_group_id, GroupId, NegotiationId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

// ── Claims ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    Leak,
    Extortion,
    #[default]
    Post,
}

/// A public extortion claim posted by a group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimEvent {
    #[serde(alias = "group", deserialize_with = "de_group_id")]
    pub group_id: GroupId,
    #[serde(alias = "claim_date", deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, alias = "victim_legal_name")]
    pub victim_id: Option<String>,
    #[serde(default)]
    pub claim_type: ClaimType,
    #[serde(default = "default_source_confidence")]
    pub source_confidence: f64,
    /// When the victim's data was actually leaked, if it was.
    #[serde(default, deserialize_with = "timestamp::option::deserialize")]
    pub publish_date: Option<DateTime<Utc>>,
    /// Publication deadline announced with the claim.
    #[serde(default, deserialize_with = "timestamp::option::deserialize")]
    pub deadline: Option<DateTime<Utc>>,
}

impl ClaimEvent {
    /// Source confidence clamped to [0, 1]; non-finite values weigh nothing.
    pub fn weight(&self) -> f64 {
        if self.source_confidence.is_finite() {
            self.source_confidence.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    /// Some(true) when published no later than the deadline. None unless
    /// both dates are known.
    pub fn published_on_time(&self) -> Option<bool> {
        Some(self.publish_date? <= self.deadline?)
    }
}

fn default_source_confidence() -> f64 {
    1.0
}

// ── Payments ─────────────────────────────────────────────────────────────────

/// An observed ransom payment. `group_id` is None until attributed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentEvent {
    #[serde(default, alias = "group", alias = "family", deserialize_with = "de_opt_group_id")]
    pub group_id: Option<GroupId>,
    #[serde(alias = "first_tx_at", deserialize_with = "timestamp::deserialize")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, alias = "amount_usd", deserialize_with = "amount::deserialize_option")]
    pub amount: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(alias = "address")]
    pub wallet_id: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

// ── Negotiations ─────────────────────────────────────────────────────────────

/// Which side of a negotiation sent a message.
///
/// Collector dumps label the victim explicitly and the actor by group
/// name, so anything that is not "victim" is the actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    Actor,
    Victim,
}

impl<'de> Deserialize<'de> for Sender {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        if raw.trim().eq_ignore_ascii_case("victim") {
            Ok(Sender::Victim)
        } else {
            Ok(Sender::Actor)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(alias = "party")]
    pub sender: Sender,
    #[serde(default, alias = "time", deserialize_with = "timestamp::option::deserialize")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, alias = "content")]
    pub text: String,
    #[serde(default, deserialize_with = "amount::deserialize_option")]
    pub offered_amount: Option<f64>,
    #[serde(default, deserialize_with = "amount::deserialize_option")]
    pub demanded_amount: Option<f64>,
}

/// Ransom summary some sources attach to a transcript.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RansomSummary {
    #[serde(default, alias = "initialransom", deserialize_with = "amount::deserialize_option")]
    pub initial_demand: Option<f64>,
    #[serde(default, alias = "negotiatedransom", deserialize_with = "amount::deserialize_option")]
    pub negotiated_price: Option<f64>,
    /// Whether the victim paid, when the source says so.
    #[serde(default)]
    pub paid: Option<bool>,
}

impl RansomSummary {
    pub fn has_amounts(&self) -> bool {
        self.initial_demand.is_some() || self.negotiated_price.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationTranscript {
    #[serde(alias = "group", deserialize_with = "de_group_id")]
    pub group_id: GroupId,
    #[serde(alias = "chat_id")]
    pub negotiation_id: NegotiationId,
    #[serde(default, deserialize_with = "timestamp::option::deserialize")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub messages: Vec<Message>,
    #[serde(default, alias = "meta")]
    pub ransom: RansomSummary,
}

impl NegotiationTranscript {
    pub fn count_from(&self, sender: Sender) -> usize {
        self.messages.iter().filter(|m| m.sender == sender).count()
    }

    /// True when any message or the ransom summary carries an amount.
    pub fn has_monetary_amounts(&self) -> bool {
        self.ransom.has_amounts()
            || self
                .messages
                .iter()
                .any(|m| m.demanded_amount.is_some() || m.offered_amount.is_some())
    }

    /// When the negotiation happened: explicit start, else the first
    /// timestamped message, else a `YYYYMMDD` prefix of the id.
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
            .or_else(|| self.messages.iter().find_map(|m| m.timestamp))
            .or_else(|| timestamp::date_from_id_prefix(&self.negotiation_id))
    }
}

// ── Serde helpers ────────────────────────────────────────────────────────────

fn de_group_id<'de, D>(deserializer: D) -> Result<GroupId, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let id = normalize_group_id(&raw);
    if id.is_empty() {
        return Err(serde::de::Error::custom("empty group id"));
    }
    Ok(id)
}

fn de_opt_group_id<'de, D>(deserializer: D) -> Result<Option<GroupId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw
        .map(|r| normalize_group_id(&r))
        .filter(|id| !id.is_empty()))
}
