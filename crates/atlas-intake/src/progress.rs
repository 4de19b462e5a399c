use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::errors::IntakeError;
use crate::stage::{StageId, StageTable};

/// Stage and record progress inferred from log text.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    /// Stages seen so far, in first-seen order, each at most once.
    pub stages_reached: Vec<StageId>,
    pub current_stage: Option<StageId>,
    /// `0` until a "processed N of M" line is seen.
    pub processed_count: u64,
    /// `0` until a total or "N of M" line is seen.
    pub expected_total: u64,
}

impl Progress {
    /// Share of `total_stages` reached so far, in percent.
    pub fn stage_completion(&self, total_stages: usize) -> f64 {
        if total_stages == 0 {
            return 0.0;
        }
        let reached = self.stages_reached.len().min(total_stages);
        reached as f64 * 100.0 / total_stages as f64
    }

    /// Processed records over the expected total, in percent.
    pub fn record_completion(&self) -> Option<f64> {
        (self.expected_total > 0)
            .then(|| (self.processed_count as f64 * 100.0 / self.expected_total as f64).min(100.0))
    }

    pub fn has_reached(&self, stage: StageId) -> bool {
        self.stages_reached.contains(&stage)
    }
}

/// Regex sources for the two record-count patterns.
///
/// `total_records` must capture the total in group 1; `processed` must capture
/// the processed count in group 1 and the total in group 2.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressPatterns {
    pub total_records: String,
    pub processed: String,
}

impl Default for ProgressPatterns {
    fn default() -> Self {
        Self {
            total_records: r"(?i)\bfound\s+(\d+)\s+(?:provider\s+)?records?\b".to_string(),
            processed: r"(?i)\bprocess(?:ing|ed)\s+(?:record\s+)?(\d+)\s*(?:/|of)\s*(\d+)"
                .to_string(),
        }
    }
}

/// Maps log lines to stage transitions and record counters.
#[derive(Clone, Debug)]
pub struct ProgressTracker {
    stages: StageTable,
    total_records: Regex,
    processed: Regex,
}

impl ProgressTracker {
    pub fn new(stages: StageTable, patterns: &ProgressPatterns) -> Result<Self, IntakeError> {
        Ok(Self {
            stages,
            total_records: compile("total_records", &patterns.total_records)?,
            processed: compile("processed", &patterns.processed)?,
        })
    }

    pub fn stages(&self) -> &StageTable {
        &self.stages
    }

    /// Applies one log line to `progress` and returns the stage it named.
    ///
    /// Counters follow the last matching line; a line without a match leaves
    /// them untouched.
    pub fn observe(&self, progress: &mut Progress, content: &str) -> Option<StageId> {
        let stage = self.stages.detect(content).map(|rule| rule.stage);
        if let Some(stage) = stage {
            progress.current_stage = Some(stage);
            if !progress.has_reached(stage) {
                progress.stages_reached.push(stage);
            }
        }

        if let Some(total) = capture_u64(&self.total_records, content, 1) {
            progress.expected_total = total;
        }
        if let Some(caps) = self.processed.captures(content) {
            if let Some(done) = caps.get(1).and_then(|m| m.as_str().parse().ok()) {
                progress.processed_count = done;
            }
            if let Some(total) = caps.get(2).and_then(|m| m.as_str().parse().ok()) {
                progress.expected_total = total;
            }
        }
        stage
    }
}

fn compile(name: &str, pattern: &str) -> Result<Regex, IntakeError> {
    Regex::new(pattern)
        .map_err(|e| IntakeError::Config(format!("invalid progress pattern `{name}`: {e}")))
}

fn capture_u64(re: &Regex, text: &str, group: usize) -> Option<u64> {
    re.captures(text)?.get(group)?.as_str().parse().ok()
}
