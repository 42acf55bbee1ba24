//! Evidence aggregation: per-group profiles for one time window.
//!
//! RULE: Profiles are rebuilt from the raw evidence on every call.
//! Nothing is cached between windows or runs.
//!
//! A group gets a profile only if it has at least one piece of evidence
//! inside the window: a claim, an attributed payment, or a chat vector
//! with at least one defined feature.

use crate::{
    chat_features::{ChatFeatureVector, FeatureSamples},
    config::AciConfig,
    evidence::{ClaimEvent, ClaimType, PaymentEvent},
    timestamp::year_start,
    types::{GroupId, Year},
};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

// ── Time windows ─────────────────────────────────────────────────────────────

/// Half-open interval `[start, end)`. A None bound is unbounded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Option<DateTime<Utc>>,
    pub end:   Option<DateTime<Utc>>,
}

impl TimeWindow {
    pub fn unbounded() -> Self {
        Self { start: None, end: None }
    }

    /// The calendar year `[Y-01-01, Y+1-01-01)`.
    pub fn year(year: Year) -> Option<Self> {
        Some(Self {
            start: Some(year_start(year)?),
            end:   Some(year_start(year.checked_add(1)?)?),
        })
    }

    /// Everything before `Y+1-01-01`.
    pub fn as_of_year(year: Year) -> Option<Self> {
        Some(Self {
            start: None,
            end:   Some(year_start(year.checked_add(1)?)?),
        })
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts < e)
    }

    /// Undated evidence only belongs to the fully unbounded window.
    pub fn contains_opt(&self, ts: Option<DateTime<Utc>>) -> bool {
        match ts {
            Some(ts) => self.contains(ts),
            None     => self.is_unbounded(),
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let edge = |b: Option<DateTime<Utc>>, inf: &str| {
            b.map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_else(|| inf.to_string())
        };
        write!(f, "[{}, {})", edge(self.start, "-inf"), edge(self.end, "+inf"))
    }
}

// ── Profile types ────────────────────────────────────────────────────────────

/// Number of records per evidence source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceCounts {
    pub claims:      u32,
    pub payments:    u32,
    pub transcripts: u32,
}

impl EvidenceCounts {
    pub fn total(&self) -> u32 {
        self.claims + self.payments + self.transcripts
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimStats {
    pub count: u32,
    /// Sum of source_confidence over the group's claims.
    pub weighted_volume: f64,
    pub leaks:      u32,
    pub extortions: u32,
    pub posts:      u32,
    /// Claims whose data was actually leaked.
    pub published:  u32,
    pub with_deadline: u32,
    /// Claims with both a deadline and a publish date.
    pub with_deadline_and_publish: u32,
    /// Of those, published no later than the deadline.
    pub on_time: u32,
}

impl ClaimStats {
    /// Share of claims followed by a leak. None without claims.
    pub fn publish_rate(&self) -> Option<f64> {
        ratio(self.published, self.count)
    }

    /// Share of deadline-bearing leaks that met the deadline.
    /// None unless some claim has both dates.
    pub fn on_time_publish_rate(&self) -> Option<f64> {
        ratio(self.on_time, self.with_deadline_and_publish)
    }
}

fn ratio(part: u32, whole: u32) -> Option<f64> {
    (whole > 0).then(|| f64::from(part) / f64::from(whole))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentStats {
    pub count: u32,
    /// Total amount paid in the reporting currency.
    pub volume: f64,
    /// Payments that contributed to `volume`.
    pub volume_count: u32,
}

/// Sample-weighted chat features across a group's transcripts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatStats {
    pub responsiveness:      Option<f64>,
    pub promise_fulfillment: Option<f64>,
    pub price_flexibility:   Option<f64>,
    pub consistency:         Option<f64>,
    pub samples: FeatureSamples,
    /// Transcripts whose payment outcome is known, and how many of them paid.
    pub paid_known: u32,
    pub paid:       u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupProfile {
    pub group_id: GroupId,
    pub window:   TimeWindow,
    pub claims:   ClaimStats,
    pub payments: PaymentStats,
    pub chat:     ChatStats,
    pub evidence: EvidenceCounts,
}

// ── Aggregator ───────────────────────────────────────────────────────────────

pub struct EvidenceAggregator {
    reporting_currency: String,
}

impl EvidenceAggregator {
    pub fn new(config: &AciConfig) -> Self {
        Self {
            reporting_currency: config.reporting_currency.trim().to_string(),
        }
    }

    /// Group all evidence inside `window` by actor group.
    ///
    /// Unattributed payments and chat vectors without defined features
    /// are skipped. Chat features are averaged per feature, weighting each
    /// transcript by that feature's own sample count.
    pub fn aggregate(
        &self,
        claims:       &[ClaimEvent],
        payments:     &[PaymentEvent],
        chat_vectors: &[ChatFeatureVector],
        window:       &TimeWindow,
    ) -> BTreeMap<GroupId, GroupProfile> {
        let mut builders: BTreeMap<GroupId, ProfileBuilder> = BTreeMap::new();

        for claim in claims.iter().filter(|c| window.contains(c.timestamp)) {
            builders
                .entry(claim.group_id.clone())
                .or_default()
                .add_claim(claim);
        }

        let mut unattributed = 0usize;
        for payment in payments.iter().filter(|p| window.contains(p.timestamp)) {
            let Some(group_id) = &payment.group_id else {
                unattributed += 1;
                continue;
            };
            builders
                .entry(group_id.clone())
                .or_default()
                .add_payment(payment, &self.reporting_currency);
        }

        let mut empty_vectors = 0usize;
        for vector in chat_vectors.iter().filter(|v| window.contains_opt(v.observed_at)) {
            if !vector.has_defined_features() {
                empty_vectors += 1;
                continue;
            }
            builders
                .entry(vector.group_id.clone())
                .or_default()
                .add_chat(vector);
        }

        if unattributed > 0 || empty_vectors > 0 {
            log::debug!(
                "window {window}: skipped {unattributed} unattributed payments, \
                 {empty_vectors} chat vectors without defined features"
            );
        }

        builders
            .into_iter()
            .map(|(group_id, b)| {
                let profile = b.finish(group_id.clone(), window.clone());
                (group_id, profile)
            })
            .collect()
    }
}

#[derive(Default)]
struct WeightedMean {
    sum:    f64,
    weight: u32,
}

impl WeightedMean {
    fn add(&mut self, value: Option<f64>, weight: u32) {
        if let Some(v) = value {
            if weight > 0 && v.is_finite() {
                self.sum += v * f64::from(weight);
                self.weight += weight;
            }
        }
    }

    fn value(&self) -> Option<f64> {
        (self.weight > 0).then(|| self.sum / f64::from(self.weight))
    }
}

#[derive(Default)]
struct ProfileBuilder {
    claims:         ClaimStats,
    payments:       PaymentStats,
    responsiveness: WeightedMean,
    fulfillment:    WeightedMean,
    flexibility:    WeightedMean,
    consistency:    WeightedMean,
    transcripts:    u32,
    paid_known:     u32,
    paid:           u32,
}

impl ProfileBuilder {
    fn add_claim(&mut self, claim: &ClaimEvent) {
        self.claims.count += 1;
        self.claims.weighted_volume += claim.weight();
        match claim.claim_type {
            ClaimType::Leak      => self.claims.leaks += 1,
            ClaimType::Extortion => self.claims.extortions += 1,
            ClaimType::Post      => self.claims.posts += 1,
        }
        if claim.publish_date.is_some() {
            self.claims.published += 1;
        }
        if claim.deadline.is_some() {
            self.claims.with_deadline += 1;
        }
        if let Some(on_time) = claim.published_on_time() {
            self.claims.with_deadline_and_publish += 1;
            self.claims.on_time += u32::from(on_time);
        }
    }

    fn add_payment(&mut self, payment: &PaymentEvent, reporting_currency: &str) {
        self.payments.count += 1;
        if let Some(amount) = payment.amount {
            if payment.currency.trim().eq_ignore_ascii_case(reporting_currency) {
                self.payments.volume += amount;
                self.payments.volume_count += 1;
            }
        }
    }

    fn add_chat(&mut self, v: &ChatFeatureVector) {
        let s = &v.sample_size;
        self.responsiveness.add(v.responsiveness_score, s.responsiveness);
        self.fulfillment.add(v.promise_fulfillment_rate, s.promise_fulfillment);
        self.flexibility.add(v.price_flexibility, s.price_flexibility);
        self.consistency.add(v.consistency_score, s.consistency);
        self.transcripts += 1;
        if let Some(paid) = v.paid {
            self.paid_known += 1;
            self.paid += u32::from(paid);
        }
    }

    fn finish(self, group_id: GroupId, window: TimeWindow) -> GroupProfile {
        let chat = ChatStats {
            responsiveness:      self.responsiveness.value(),
            promise_fulfillment: self.fulfillment.value(),
            price_flexibility:   self.flexibility.value(),
            consistency:         self.consistency.value(),
            samples: FeatureSamples {
                responsiveness:      self.responsiveness.weight,
                promise_fulfillment: self.fulfillment.weight,
                price_flexibility:   self.flexibility.weight,
                consistency:         self.consistency.weight,
            },
            paid_known: self.paid_known,
            paid:       self.paid,
        };
        GroupProfile {
            evidence: EvidenceCounts {
                claims:      self.claims.count,
                payments:    self.payments.count,
                transcripts: self.transcripts,
            },
            group_id,
            window,
            claims: self.claims,
            payments: self.payments,
            chat,
        }
    }
}
