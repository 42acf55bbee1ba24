//! Temporal windowing controller: runs aggregate + score per window.
//!
//! MODES:
//!   single         one unbounded window over all evidence
//!   by_year        disjoint calendar years spanning the observed data
//!   as_of_year(Y)  one cumulative window ending at Y+1-01-01
//!
//! RULES:
//!   - Each window is aggregated and scored with its own cohort.
//!   - Nothing computed for one window is visible to another.
//!   - Output is ordered by window start, then group id.

use crate::{
    aggregate::{EvidenceAggregator, GroupProfile, TimeWindow},
    chat_features::ChatFeatureVector,
    config::AciConfig,
    error::{AciError, AciResult},
    evidence::{ClaimEvent, PaymentEvent},
    scoring::{AciScoreRecord, Scorer},
    types::Year,
};
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "year", rename_all = "snake_case")]
pub enum RunMode {
    Single,
    ByYear,
    AsOfYear(Year),
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Single       => write!(f, "single"),
            RunMode::ByYear       => write!(f, "by_year"),
            RunMode::AsOfYear(y)  => write!(f, "as_of_year({y})"),
        }
    }
}

/// Borrowed view of one run's evidence.
#[derive(Clone, Copy)]
pub struct EvidenceSet<'a> {
    pub claims:       &'a [ClaimEvent],
    pub payments:     &'a [PaymentEvent],
    pub chat_vectors: &'a [ChatFeatureVector],
}

impl EvidenceSet<'_> {
    /// Earliest and latest timestamp across every source.
    fn observed_range(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let stamps = self
            .claims
            .iter()
            .map(|c| c.timestamp)
            .chain(self.payments.iter().map(|p| p.timestamp))
            .chain(self.chat_vectors.iter().filter_map(|v| v.observed_at));
        stamps.fold(None, |range, ts| match range {
            None           => Some((ts, ts)),
            Some((lo, hi)) => Some((lo.min(ts), hi.max(ts))),
        })
    }
}

pub struct WindowController {
    aggregator: EvidenceAggregator,
    scorer:     Scorer,
}

impl WindowController {
    /// Validates the config; a bad weight vector aborts here, before
    /// any window is touched.
    pub fn new(config: AciConfig) -> AciResult<Self> {
        let aggregator = EvidenceAggregator::new(&config);
        let scorer = Scorer::new(config)?;
        Ok(Self { aggregator, scorer })
    }

    pub fn scorer(&self) -> &Scorer {
        &self.scorer
    }

    /// Score every window of `mode` and assemble the output table.
    pub fn run(
        &self,
        mode:         RunMode,
        claims:       &[ClaimEvent],
        payments:     &[PaymentEvent],
        chat_vectors: &[ChatFeatureVector],
    ) -> AciResult<Vec<AciScoreRecord>> {
        let evidence = EvidenceSet { claims, payments, chat_vectors };
        let windows = self.windows(mode, &evidence)?;
        log::info!("run {mode}: {} window(s)", windows.len());

        let per_window = self.score_windows(&windows, &evidence)?;
        let records: Vec<AciScoreRecord> = per_window.into_iter().flatten().collect();
        log::info!("run {mode}: {} score record(s)", records.len());
        Ok(records)
    }

    /// The windows a run of `mode` covers, in chronological order.
    pub fn windows(&self, mode: RunMode, evidence: &EvidenceSet<'_>) -> AciResult<Vec<TimeWindow>> {
        match mode {
            RunMode::Single => Ok(vec![TimeWindow::unbounded()]),
            RunMode::AsOfYear(year) => TimeWindow::as_of_year(year)
                .map(|w| vec![w])
                .ok_or_else(|| year_out_of_range(year)),
            RunMode::ByYear => {
                let Some((first, last)) = evidence.observed_range() else {
                    return Ok(Vec::new());
                };
                (first.year()..=last.year())
                    .map(|y| TimeWindow::year(y).ok_or_else(|| year_out_of_range(y)))
                    .collect()
            }
        }
    }

    /// Aggregate and score one window. Fails with EmptyCohort when no
    /// group has evidence inside it.
    pub fn score_window(
        &self,
        window:   &TimeWindow,
        evidence: &EvidenceSet<'_>,
    ) -> AciResult<Vec<AciScoreRecord>> {
        let profiles: Vec<GroupProfile> = self
            .aggregator
            .aggregate(evidence.claims, evidence.payments, evidence.chat_vectors, window)
            .into_values()
            .collect();

        if profiles.is_empty() {
            return Err(AciError::EmptyCohort { window: window.to_string() });
        }
        log::debug!("window {window}: cohort of {} group(s)", profiles.len());
        Ok(self.scorer.score_cohort(&profiles))
    }

    fn score_window_or_empty(
        &self,
        window:   &TimeWindow,
        evidence: &EvidenceSet<'_>,
    ) -> AciResult<Vec<AciScoreRecord>> {
        match self.score_window(window, evidence) {
            Err(AciError::EmptyCohort { window }) => {
                log::info!("window {window}: no group with evidence, emitting no rows");
                Ok(Vec::new())
            }
            other => other,
        }
    }

    #[cfg(feature = "parallel")]
    fn score_windows(
        &self,
        windows:  &[TimeWindow],
        evidence: &EvidenceSet<'_>,
    ) -> AciResult<Vec<Vec<AciScoreRecord>>> {
        use rayon::prelude::*;
        windows
            .par_iter()
            .map(|w| self.score_window_or_empty(w, evidence))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn score_windows(
        &self,
        windows:  &[TimeWindow],
        evidence: &EvidenceSet<'_>,
    ) -> AciResult<Vec<Vec<AciScoreRecord>>> {
        windows
            .iter()
            .map(|w| self.score_window_or_empty(w, evidence))
            .collect()
    }
}

fn year_out_of_range(year: Year) -> AciError {
    AciError::Other(anyhow::anyhow!("year {year} is out of range"))
}
