use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::RunFailure;
use crate::progress::Progress;
use crate::severity::Severity;
use crate::stage::StageId;

/// One line of the user-visible run log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub message: String,
    pub severity: Severity,
    /// Wall-clock time the line was folded, not when the backend wrote it.
    pub timestamp: DateTime<Utc>,
}

/// Coarse lifecycle of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Idle,
    Running,
    Completed,
    Failed,
    /// Abandoned by the caller (aborted, superseded or cleared) before it
    /// finished.
    Cancelled,
}

/// Everything accumulated for one validation run.
///
/// `log` and `results` are append-only for the lifetime of the run.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub log: Vec<LogEntry>,
    /// Result records in arrival order, untouched.
    pub results: Vec<serde_json::Value>,
    #[serde(flatten)]
    pub progress: Progress,
    pub is_running: bool,
    pub is_complete: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub cancelled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<RunFailure>,
    /// Payloads dropped because they did not parse.
    #[serde(default)]
    pub dropped_payloads: u64,
}

impl SessionState {
    /// Fresh state for a run that has just been submitted.
    pub fn started() -> Self {
        Self {
            is_running: true,
            ..Self::default()
        }
    }

    pub fn status(&self) -> RunStatus {
        if self.failure.is_some() {
            RunStatus::Failed
        } else if self.is_complete {
            RunStatus::Completed
        } else if self.cancelled {
            RunStatus::Cancelled
        } else if self.is_running {
            RunStatus::Running
        } else {
            RunStatus::Idle
        }
    }

    /// A finished, failed or cancelled run accepts no more events.
    pub fn is_terminal(&self) -> bool {
        self.is_complete || self.cancelled || self.failure.is_some()
    }

    pub fn stages_reached(&self) -> &[StageId] {
        &self.progress.stages_reached
    }

    pub fn current_stage(&self) -> Option<StageId> {
        self.progress.current_stage
    }

    pub fn last_log(&self) -> Option<&LogEntry> {
        self.log.last()
    }
}
