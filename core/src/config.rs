//! Scoring configuration.
//!
//! RULE: The core never parses CLI flags. The runner loads an AciConfig
//! (or uses the defaults) and hands it to Scorer / ChatFeatureExtractor,
//! which validate it before any computation starts.

use crate::error::{AciError, AciResult};
use serde::{Deserialize, Serialize};

/// Tolerance for weight vectors summing to 1.0.
pub const WEIGHT_EPSILON: f64 = 1e-6;

/// Ten years. Larger idle gaps never split a real negotiation.
pub const MAX_SESSION_GAP_HOURS: f64 = 87_600.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubScoreWeights {
    pub claim_activity:       f64,
    pub payment_reliability:  f64,
    pub negotiation_behavior: f64,
}

impl Default for SubScoreWeights {
    fn default() -> Self {
        Self {
            claim_activity:       1.0 / 3.0,
            payment_reliability:  1.0 / 3.0,
            negotiation_behavior: 1.0 / 3.0,
        }
    }
}

impl SubScoreWeights {
    fn named(&self) -> [(&'static str, f64); 3] {
        [
            ("claim_activity", self.claim_activity),
            ("payment_reliability", self.payment_reliability),
            ("negotiation_behavior", self.negotiation_behavior),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatFeatureWeights {
    pub responsiveness:      f64,
    pub promise_fulfillment: f64,
    pub price_flexibility:   f64,
    pub consistency:         f64,
}

impl Default for ChatFeatureWeights {
    fn default() -> Self {
        Self {
            responsiveness:      0.20,
            promise_fulfillment: 0.35,
            price_flexibility:   0.15,
            consistency:         0.30,
        }
    }
}

impl ChatFeatureWeights {
    fn named(&self) -> [(&'static str, f64); 4] {
        [
            ("responsiveness", self.responsiveness),
            ("promise_fulfillment", self.promise_fulfillment),
            ("price_flexibility", self.price_flexibility),
            ("consistency", self.consistency),
        ]
    }
}

/// Reference range for actor response times. Gaps at or below `min_hours`
/// score 1.0, gaps at or above `max_hours` score 0.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseTimeRange {
    pub min_hours: f64,
    pub max_hours: f64,
}

impl Default for ResponseTimeRange {
    fn default() -> Self {
        Self { min_hours: 0.0, max_hours: 72.0 }
    }
}

/// How sub-score metrics are scaled against the window's cohort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMethod {
    #[default]
    MinMax,
    PercentileRank,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AciConfig {
    /// Evidence count at which confidence reaches 1.0.
    pub evidence_floor: u32,
    pub sub_score_weights: SubScoreWeights,
    pub chat_feature_weights: ChatFeatureWeights,
    pub response_time_range_hours: ResponseTimeRange,
    /// Idle gap that starts a new negotiation session.
    pub session_gap_hours: f64,
    pub normalization: NormalizationMethod,
    /// Only payments in this currency contribute to payment volume.
    pub reporting_currency: String,
}

impl Default for AciConfig {
    fn default() -> Self {
        Self {
            evidence_floor: 10,
            sub_score_weights: SubScoreWeights::default(),
            chat_feature_weights: ChatFeatureWeights::default(),
            response_time_range_hours: ResponseTimeRange::default(),
            session_gap_hours: 24.0,
            normalization: NormalizationMethod::MinMax,
            reporting_currency: "USD".into(),
        }
    }
}

impl AciConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    /// The result is validated before it is returned.
    pub fn load(path: &str) -> AciResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: AciConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would silently corrupt every score.
    pub fn validate(&self) -> AciResult<()> {
        check_weights("sub_score_weights", &self.sub_score_weights.named())?;
        check_weights("chat_feature_weights", &self.chat_feature_weights.named())?;

        if self.evidence_floor == 0 {
            return Err(AciError::InvalidConfig("evidence_floor must be > 0".into()));
        }

        let range = &self.response_time_range_hours;
        if !(range.min_hours.is_finite() && range.max_hours.is_finite())
            || range.min_hours < 0.0
            || range.max_hours <= range.min_hours
        {
            return Err(AciError::InvalidConfig(format!(
                "response_time_range_hours must satisfy 0 <= min < max, got [{}, {}]",
                range.min_hours, range.max_hours
            )));
        }

        if !self.session_gap_hours.is_finite()
            || self.session_gap_hours <= 0.0
            || self.session_gap_hours > MAX_SESSION_GAP_HOURS
        {
            return Err(AciError::InvalidConfig(format!(
                "session_gap_hours must be in (0, {MAX_SESSION_GAP_HOURS}], got {}",
                self.session_gap_hours
            )));
        }

        if self.reporting_currency.trim().is_empty() {
            return Err(AciError::InvalidConfig("reporting_currency is empty".into()));
        }
        Ok(())
    }
}

fn check_weights(name: &str, weights: &[(&'static str, f64)]) -> AciResult<()> {
    for (field, w) in weights {
        if !w.is_finite() || *w < 0.0 {
            return Err(AciError::InvalidWeightConfig {
                name: name.to_string(),
                reason: format!("{field} = {w} is negative or not finite"),
            });
        }
    }
    let sum: f64 = weights.iter().map(|(_, w)| w).sum();
    if (sum - 1.0).abs() > WEIGHT_EPSILON {
        return Err(AciError::InvalidWeightConfig {
            name: name.to_string(),
            reason: format!("weights sum to {sum}, expected 1.0"),
        });
    }
    Ok(())
}
