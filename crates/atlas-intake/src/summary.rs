//! Summary counters derived from a session's result records.
//!
//! Records are opaque to the stream layer; this module only peeks at the
//! `confidence_score` and `qa_flags` fields the validation backend attaches.

use serde::{Deserialize, Serialize};

use crate::severity::Severity;
use crate::state::SessionState;

/// Confidence bands used to bucket result records.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceTiers {
    /// Scores at or above this are high confidence (auto-approve band).
    pub high: f64,
    /// Scores at or above this (and below `high`) are medium confidence.
    pub medium: f64,
}

impl Default for ConfidenceTiers {
    fn default() -> Self {
        Self {
            high: 0.7,
            medium: 0.4,
        }
    }
}

/// Confidence band of one record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    High,
    Medium,
    Low,
}

impl ConfidenceTiers {
    pub fn tier(&self, score: f64) -> Tier {
        if score >= self.high {
            Tier::High
        } else if score >= self.medium {
            Tier::Medium
        } else {
            Tier::Low
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub high_confidence: usize,
    pub medium_confidence: usize,
    pub low_confidence: usize,
    /// Records without a numeric `confidence_score`.
    pub unscored: usize,
    /// Records carrying at least one QA flag.
    pub flagged_for_review: usize,
    pub average_confidence: Option<f64>,
    pub log_errors: usize,
    pub log_warnings: usize,
}

impl Summary {
    pub fn from_results(results: &[serde_json::Value], tiers: &ConfidenceTiers) -> Self {
        let mut summary = Summary {
            total: results.len(),
            ..Summary::default()
        };
        let mut score_sum = 0.0;
        for record in results {
            match confidence_score(record) {
                Some(score) => {
                    score_sum += score;
                    match tiers.tier(score) {
                        Tier::High => summary.high_confidence += 1,
                        Tier::Medium => summary.medium_confidence += 1,
                        Tier::Low => summary.low_confidence += 1,
                    }
                }
                None => summary.unscored += 1,
            }
            if has_qa_flags(record) {
                summary.flagged_for_review += 1;
            }
        }
        let scored = summary.scored();
        if scored > 0 {
            summary.average_confidence = Some(score_sum / scored as f64);
        }
        summary
    }

    /// Result counters plus error and warning counts from the log.
    pub fn from_state(state: &SessionState, tiers: &ConfidenceTiers) -> Self {
        let mut summary = Self::from_results(&state.results, tiers);
        for entry in &state.log {
            match entry.severity {
                Severity::Error => summary.log_errors += 1,
                Severity::Warning => summary.log_warnings += 1,
                Severity::Info | Severity::Success => {}
            }
        }
        summary
    }

    pub fn scored(&self) -> usize {
        self.high_confidence + self.medium_confidence + self.low_confidence
    }

    /// Share of scored records in the high band.
    pub fn pass_rate(&self) -> Option<f64> {
        let scored = self.scored();
        (scored > 0).then(|| self.high_confidence as f64 / scored as f64)
    }
}

fn confidence_score(record: &serde_json::Value) -> Option<f64> {
    record.get("confidence_score").and_then(|v| v.as_f64())
}

fn has_qa_flags(record: &serde_json::Value) -> bool {
    record
        .get("qa_flags")
        .and_then(|v| v.as_array())
        .is_some_and(|flags| !flags.is_empty())
}
