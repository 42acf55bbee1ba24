//! Chat feature extraction: negotiation transcript → behavioral vector.
//!
//! One ChatFeatureVector per transcript. Every feature is tri-state:
//! a value in [0, 1], or None when the transcript carries no evidence
//! for it. None is never treated as zero downstream.
//!
//! Features:
//!   1. responsiveness_score      inverted median victim→actor reply gap
//!   2. promise_fulfillment_rate  committed sessions later reported done
//!   3. price_flexibility         reduction from initial demand to final price
//!   4. consistency_score         1 - CV of restated demands per session
//!
//! Each feature carries its own sample count so aggregation can weight
//! transcripts by evidence volume.

use crate::{
    commitment::{CommitmentKind, CommitmentLexicon, CommitmentMatcher},
    config::{AciConfig, ResponseTimeRange},
    error::{AciError, AciResult},
    evidence::{Message, NegotiationTranscript, Sender},
    types::{GroupId, NegotiationId},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::ops::Range;

// ── Public types ─────────────────────────────────────────────────────────────

/// Per-feature evidence counts for one transcript.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSamples {
    pub responsiveness:      u32,
    pub promise_fulfillment: u32,
    pub price_flexibility:   u32,
    pub consistency:         u32,
}

impl FeatureSamples {
    pub fn total(&self) -> u32 {
        self.responsiveness + self.promise_fulfillment + self.price_flexibility + self.consistency
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatFeatureVector {
    pub group_id: GroupId,
    pub negotiation_id: NegotiationId,
    pub observed_at: Option<DateTime<Utc>>,
    pub responsiveness_score: Option<f64>,
    pub promise_fulfillment_rate: Option<f64>,
    pub price_flexibility: Option<f64>,
    pub consistency_score: Option<f64>,
    pub sample_size: FeatureSamples,
    /// Payment outcome copied from the transcript. Not a scored feature.
    pub paid: Option<bool>,
}

impl ChatFeatureVector {
    /// Vector with every feature undefined. Used when a transcript has
    /// no monetary amounts at all.
    pub fn undefined(transcript: &NegotiationTranscript) -> Self {
        Self {
            group_id: transcript.group_id.clone(),
            negotiation_id: transcript.negotiation_id.clone(),
            observed_at: transcript.observed_at(),
            responsiveness_score: None,
            promise_fulfillment_rate: None,
            price_flexibility: None,
            consistency_score: None,
            sample_size: FeatureSamples::default(),
            paid: transcript.ransom.paid,
        }
    }

    /// True when at least one feature has a value backed by samples.
    pub fn has_defined_features(&self) -> bool {
        let s = &self.sample_size;
        (self.responsiveness_score.is_some() && s.responsiveness > 0)
            || (self.promise_fulfillment_rate.is_some() && s.promise_fulfillment > 0)
            || (self.price_flexibility.is_some() && s.price_flexibility > 0)
            || (self.consistency_score.is_some() && s.consistency > 0)
    }
}

// ── Extractor ────────────────────────────────────────────────────────────────

pub struct ChatFeatureExtractor {
    response_range: ResponseTimeRange,
    session_gap:    Duration,
    matcher:        Box<dyn CommitmentMatcher>,
}

impl ChatFeatureExtractor {
    /// Build an extractor using the default commitment lexicon.
    pub fn new(config: &AciConfig) -> AciResult<Self> {
        config.validate()?;
        let gap_seconds = (config.session_gap_hours * 3600.0).round() as i64;
        let session_gap = Duration::try_seconds(gap_seconds).ok_or_else(|| {
            AciError::InvalidConfig(format!(
                "session_gap_hours {} is out of range",
                config.session_gap_hours
            ))
        })?;
        Ok(Self {
            response_range: config.response_time_range_hours.clone(),
            session_gap,
            matcher:        Box::new(CommitmentLexicon::v1()),
        })
    }

    /// Swap the commitment matching strategy.
    pub fn with_matcher(mut self, matcher: Box<dyn CommitmentMatcher>) -> Self {
        self.matcher = matcher;
        self
    }

    pub fn matcher_version(&self) -> &str {
        self.matcher.version()
    }

    /// Extract the feature vector for one transcript.
    ///
    /// Fails with MalformedTranscript unless both parties sent at least
    /// one message. A transcript without any monetary amount yields a
    /// vector with every feature undefined.
    pub fn extract(&self, transcript: &NegotiationTranscript) -> AciResult<ChatFeatureVector> {
        for (sender, label) in [(Sender::Actor, "actor"), (Sender::Victim, "victim")] {
            if transcript.count_from(sender) == 0 {
                return Err(AciError::MalformedTranscript {
                    negotiation_id: transcript.negotiation_id.clone(),
                    reason: format!("no {label} messages"),
                });
            }
        }

        match self.compute(transcript) {
            Err(AciError::InsufficientData { negotiation_id }) => {
                log::debug!("transcript {negotiation_id}: no monetary amounts, features undefined");
                Ok(ChatFeatureVector::undefined(transcript))
            }
            other => other,
        }
    }

    /// Extract every transcript, skipping malformed ones.
    pub fn extract_all(&self, transcripts: &[NegotiationTranscript]) -> Vec<ChatFeatureVector> {
        let mut out = Vec::with_capacity(transcripts.len());
        for transcript in transcripts {
            match self.extract(transcript) {
                Ok(v) => out.push(v),
                Err(e) => log::warn!("skipping transcript: {e}"),
            }
        }
        log::info!(
            "extracted {} chat vectors from {} transcripts (matcher {})",
            out.len(),
            transcripts.len(),
            self.matcher_version()
        );
        out
    }

    fn compute(&self, transcript: &NegotiationTranscript) -> AciResult<ChatFeatureVector> {
        if !transcript.has_monetary_amounts() {
            return Err(AciError::InsufficientData {
                negotiation_id: transcript.negotiation_id.clone(),
            });
        }

        let messages = &transcript.messages;
        let sessions = self.sessions(messages);

        let gaps = self.response_gaps_hours(messages);
        let responsiveness = median(&gaps).map(|m| self.responsiveness_from_median(m));
        let (fulfillment, committed_sessions) = self.promise_fulfillment(messages, &sessions);
        let flexibility = price_flexibility(transcript);
        let (consistency, demand_samples) = consistency(messages, &sessions);

        Ok(ChatFeatureVector {
            group_id: transcript.group_id.clone(),
            negotiation_id: transcript.negotiation_id.clone(),
            observed_at: transcript.observed_at(),
            responsiveness_score: responsiveness,
            promise_fulfillment_rate: fulfillment,
            price_flexibility: flexibility,
            consistency_score: consistency,
            sample_size: FeatureSamples {
                responsiveness:      if responsiveness.is_some() { gaps.len() as u32 } else { 0 },
                promise_fulfillment: committed_sessions,
                price_flexibility:   u32::from(flexibility.is_some()),
                consistency:         demand_samples,
            },
            paid: transcript.ransom.paid,
        })
    }

    /// Split messages into sessions at idle gaps longer than session_gap.
    /// Untimestamped messages stay in the current session.
    fn sessions(&self, messages: &[Message]) -> Vec<Range<usize>> {
        let mut out = Vec::new();
        let mut start = 0;
        let mut last_ts: Option<DateTime<Utc>> = None;

        for (i, msg) in messages.iter().enumerate() {
            if let Some(ts) = msg.timestamp {
                if let Some(prev) = last_ts {
                    if ts - prev > self.session_gap && i > start {
                        out.push(start..i);
                        start = i;
                    }
                }
                last_ts = Some(ts);
            }
        }
        if start < messages.len() {
            out.push(start..messages.len());
        }
        out
    }

    /// Gap in hours between the first victim message of each unanswered
    /// run and the next actor message. Missing timestamps count as the
    /// slowest bucket.
    fn response_gaps_hours(&self, messages: &[Message]) -> Vec<f64> {
        let slowest = self.response_range.max_hours;
        let mut gaps = Vec::new();
        let mut waiting: Option<&Message> = None;

        for msg in messages {
            match msg.sender {
                Sender::Victim => {
                    if waiting.is_none() {
                        waiting = Some(msg);
                    }
                }
                Sender::Actor => {
                    if let Some(asked) = waiting.take() {
                        let gap = match (asked.timestamp, msg.timestamp) {
                            (Some(a), Some(b)) => ((b - a).num_seconds() as f64 / 3600.0).max(0.0),
                            _ => slowest,
                        };
                        gaps.push(gap);
                    }
                }
            }
        }
        gaps
    }

    fn responsiveness_from_median(&self, median_hours: f64) -> f64 {
        let lo = self.response_range.min_hours;
        let hi = self.response_range.max_hours;
        (1.0 - (median_hours - lo) / (hi - lo)).clamp(0.0, 1.0)
    }

    /// Share of committed sessions whose every commitment kind is reported
    /// fulfilled by a later message. Sessions without commitments are
    /// excluded from the denominator.
    fn promise_fulfillment(
        &self,
        messages: &[Message],
        sessions: &[Range<usize>],
    ) -> (Option<f64>, u32) {
        let mut committed = 0u32;
        let mut fulfilled = 0u32;

        for session in sessions {
            // First position at which each kind was promised in this session.
            let mut promised: Vec<(CommitmentKind, usize)> = Vec::new();
            for i in session.clone() {
                let msg = &messages[i];
                if msg.sender != Sender::Actor {
                    continue;
                }
                for kind in self.matcher.commitments(&msg.text) {
                    if !promised.iter().any(|(k, _)| *k == kind) {
                        promised.push((kind, i));
                    }
                }
            }
            if promised.is_empty() {
                continue;
            }

            committed += 1;
            let kept = promised.iter().all(|(kind, at)| {
                messages[at + 1..]
                    .iter()
                    .any(|m| self.matcher.fulfillments(&m.text).contains(kind))
            });
            if kept {
                fulfilled += 1;
            }
        }

        if committed == 0 {
            (None, 0)
        } else {
            (Some(f64::from(fulfilled) / f64::from(committed)), committed)
        }
    }
}

// ── Pure helpers ─────────────────────────────────────────────────────────────

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// `(initial_demand - final_price) / initial_demand`, clamped to [0, 1].
///
/// Initial demand is the first actor demand; final price is the last
/// amount (offered or demanded) after it. Falls back to the transcript's
/// ransom summary when the messages do not carry both.
fn price_flexibility(transcript: &NegotiationTranscript) -> Option<f64> {
    let messages = &transcript.messages;
    let from_messages = messages
        .iter()
        .position(|m| m.sender == Sender::Actor && m.demanded_amount.is_some())
        .and_then(|i| {
            let initial = messages[i].demanded_amount?;
            let final_price = messages[i + 1..]
                .iter()
                .rev()
                .find_map(|m| m.offered_amount.or(m.demanded_amount))?;
            Some((initial, final_price))
        });

    let (initial, final_price) = from_messages.or_else(|| {
        let summary = &transcript.ransom;
        Some((summary.initial_demand?, summary.negotiated_price?))
    })?;

    if initial <= 0.0 {
        return None;
    }
    Some(((initial - final_price) / initial).clamp(0.0, 1.0))
}

/// 1 minus the demand-weighted mean coefficient of variation of actor
/// demands, over sessions with at least two demands.
fn consistency(messages: &[Message], sessions: &[Range<usize>]) -> (Option<f64>, u32) {
    let mut weighted_cv = 0.0;
    let mut samples = 0u32;

    for session in sessions {
        let demands: Vec<f64> = messages[session.clone()]
            .iter()
            .filter(|m| m.sender == Sender::Actor)
            .filter_map(|m| m.demanded_amount)
            .collect();
        if demands.len() < 2 {
            continue;
        }
        let n = demands.len() as f64;
        let mean = demands.iter().sum::<f64>() / n;
        if mean <= 0.0 {
            continue;
        }
        let variance = demands.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / n;
        weighted_cv += (variance.sqrt() / mean) * n;
        samples += demands.len() as u32;
    }

    if samples == 0 {
        (None, 0)
    } else {
        let mean_cv = weighted_cv / f64::from(samples);
        (Some((1.0 - mean_cv).clamp(0.0, 1.0)), samples)
    }
}
