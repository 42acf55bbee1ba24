//! Credibility scoring: GroupProfile + cohort → ACI score record.
//!
//! Sub-scores (0–100):
//!   claim_activity       = mean(norm(claim count), norm(confidence-weighted volume))
//!   payment_reliability  = mean(norm(payment count), norm(payment volume))
//!   negotiation_behavior = weighted chat features × 100
//!
//! Claim and payment metrics are normalized against the window's cohort,
//! restricted to the groups that have evidence for that source. Chat
//! features are already on [0, 1] and are used as-is.
//!
//! RULE: A sub-score without evidence is omitted, never zero-filled.
//! Its weight is redistributed over the sub-scores that are present.

use crate::{
    aggregate::{EvidenceCounts, GroupProfile, TimeWindow},
    config::{AciConfig, NormalizationMethod},
    error::{AciError, AciResult},
    types::GroupId,
};
use serde::{Deserialize, Serialize};

/// Width below which a cohort range is treated as degenerate.
const RANGE_EPSILON: f64 = 1e-12;

// ── Public types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub claim_activity:       Option<f64>,
    pub payment_reliability:  Option<f64>,
    pub negotiation_behavior: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AciScoreRecord {
    pub group_id: GroupId,
    pub window: TimeWindow,
    /// Overall index in [0, 100].
    pub aci_score: f64,
    pub sub_scores: SubScores,
    /// Evidence sufficiency in [0, 1], independent of the score.
    pub confidence: f64,
    pub evidence_count: u32,
    pub evidence: EvidenceCounts,
}

// ── Scorer ───────────────────────────────────────────────────────────────────

pub struct Scorer {
    config: AciConfig,
}

impl Scorer {
    /// Fails with InvalidWeightConfig before any scoring if the weights
    /// are unusable.
    pub fn new(config: AciConfig) -> AciResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AciConfig {
        &self.config
    }

    /// Score one profile relative to its window's cohort.
    ///
    /// The profile is always part of its own reference population; a
    /// cohort entry with the same group id is replaced by it.
    pub fn score(&self, profile: &GroupProfile, cohort: &[GroupProfile]) -> AciResult<AciScoreRecord> {
        let peers: Vec<&GroupProfile> = cohort
            .iter()
            .filter(|p| p.group_id != profile.group_id)
            .chain(std::iter::once(profile))
            .collect();

        let sub_scores = SubScores {
            claim_activity:       self.claim_activity(profile, &peers),
            payment_reliability:  self.payment_reliability(profile, &peers),
            negotiation_behavior: self.negotiation_behavior(profile),
        };

        let w = &self.config.sub_score_weights;
        let aci = weighted_mean(&[
            (sub_scores.claim_activity, w.claim_activity),
            (sub_scores.payment_reliability, w.payment_reliability),
            (sub_scores.negotiation_behavior, w.negotiation_behavior),
        ])
        .ok_or_else(|| AciError::NoScorableEvidence {
            group_id: profile.group_id.clone(),
        })?;

        let evidence_count = profile.evidence.total();
        let confidence =
            (f64::from(evidence_count) / f64::from(self.config.evidence_floor)).min(1.0);

        Ok(AciScoreRecord {
            group_id: profile.group_id.clone(),
            window: profile.window.clone(),
            aci_score: aci.clamp(0.0, 100.0),
            sub_scores,
            confidence,
            evidence_count,
            evidence: profile.evidence,
        })
    }

    /// Score every profile of one window against the whole window.
    /// Profiles with no scorable sub-score are logged and left out.
    pub fn score_cohort(&self, cohort: &[GroupProfile]) -> Vec<AciScoreRecord> {
        let mut out = Vec::with_capacity(cohort.len());
        for profile in cohort {
            match self.score(profile, cohort) {
                Ok(record) => {
                    if record.confidence < 1.0 {
                        log::debug!(
                            "group {} low confidence {:.2} ({} records)",
                            record.group_id,
                            record.confidence,
                            record.evidence_count
                        );
                    }
                    out.push(record);
                }
                Err(e) => log::warn!("window {}: {e}", profile.window),
            }
        }
        out
    }

    fn claim_activity(&self, profile: &GroupProfile, peers: &[&GroupProfile]) -> Option<f64> {
        if profile.claims.count == 0 {
            return None;
        }
        let with_claims: Vec<&&GroupProfile> = peers.iter().filter(|p| p.claims.count > 0).collect();
        let counts: Vec<f64> = with_claims.iter().map(|p| f64::from(p.claims.count)).collect();
        let volumes: Vec<f64> = with_claims.iter().map(|p| p.claims.weighted_volume).collect();

        let frequency = self.normalize(f64::from(profile.claims.count), &counts);
        let volume = self.normalize(profile.claims.weighted_volume, &volumes);
        Some(100.0 * (frequency + volume) / 2.0)
    }

    fn payment_reliability(&self, profile: &GroupProfile, peers: &[&GroupProfile]) -> Option<f64> {
        if profile.payments.count == 0 {
            return None;
        }
        let counts: Vec<f64> = peers
            .iter()
            .filter(|p| p.payments.count > 0)
            .map(|p| f64::from(p.payments.count))
            .collect();
        let frequency = self.normalize(f64::from(profile.payments.count), &counts);

        if profile.payments.volume_count == 0 {
            return Some(100.0 * frequency);
        }
        let volumes: Vec<f64> = peers
            .iter()
            .filter(|p| p.payments.volume_count > 0)
            .map(|p| p.payments.volume)
            .collect();
        let volume = self.normalize(profile.payments.volume, &volumes);
        Some(100.0 * (frequency + volume) / 2.0)
    }

    fn negotiation_behavior(&self, profile: &GroupProfile) -> Option<f64> {
        let chat = &profile.chat;
        let w = &self.config.chat_feature_weights;
        weighted_mean(&[
            (chat.responsiveness, w.responsiveness),
            (chat.promise_fulfillment, w.promise_fulfillment),
            (chat.price_flexibility, w.price_flexibility),
            (chat.consistency, w.consistency),
        ])
        .map(|v| (100.0 * v).clamp(0.0, 100.0))
    }

    /// Scale `value` into [0, 1] against `population` (which contains it).
    fn normalize(&self, value: f64, population: &[f64]) -> f64 {
        match self.config.normalization {
            NormalizationMethod::MinMax         => min_max(value, population),
            NormalizationMethod::PercentileRank => percentile_rank(value, population),
        }
    }
}

// ── Pure helpers ─────────────────────────────────────────────────────────────

/// Weighted mean over the present values; absent values drop out and their
/// weight is redistributed. None if nothing present carries weight.
pub fn weighted_mean(parts: &[(Option<f64>, f64)]) -> Option<f64> {
    let (sum, weight) = parts
        .iter()
        .filter_map(|(v, w)| v.map(|v| (v * w, *w)))
        .fold((0.0, 0.0), |(s, tw), (x, w)| (s + x, tw + w));
    (weight > 0.0).then(|| sum / weight)
}

/// Min-max scaling. A degenerate range maps every member to 1.0.
fn min_max(value: f64, population: &[f64]) -> f64 {
    let lo = population.iter().copied().fold(value, f64::min);
    let hi = population.iter().copied().fold(value, f64::max);
    if hi - lo < RANGE_EPSILON {
        return 1.0;
    }
    ((value - lo) / (hi - lo)).clamp(0.0, 1.0)
}

/// Share of the population at or below `value`.
fn percentile_rank(value: f64, population: &[f64]) -> f64 {
    if population.is_empty() {
        return 1.0;
    }
    let at_or_below = population.iter().filter(|p| **p <= value).count();
    at_or_below as f64 / population.len() as f64
}
