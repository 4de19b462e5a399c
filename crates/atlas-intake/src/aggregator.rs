use chrono::{DateTime, Utc};
use tracing::debug;

use crate::errors::RunFailure;
use crate::event::StreamEvent;
use crate::progress::ProgressTracker;
use crate::severity::{Severity, SeverityRules};
use crate::stage::{StageId, StageTable};
use crate::state::{LogEntry, SessionState};

/// What a single fold did to the session.
#[derive(Clone, Debug, PartialEq)]
pub enum Fold {
    /// A log line was appended.
    Logged {
        severity: Severity,
        stage: Option<StageId>,
    },
    /// A result record was appended at `index`.
    Collected { index: usize },
    /// The run was marked complete.
    Completed,
    /// The session was already terminal; nothing changed.
    Ignored,
}

/// Folds classified stream events into a [`SessionState`].
#[derive(Clone, Debug)]
pub struct Aggregator {
    severity: SeverityRules,
    tracker: ProgressTracker,
}

impl Aggregator {
    pub fn new(severity: SeverityRules, tracker: ProgressTracker) -> Self {
        Self { severity, tracker }
    }

    pub fn stages(&self) -> &StageTable {
        self.tracker.stages()
    }

    pub fn severity_rules(&self) -> &SeverityRules {
        &self.severity
    }

    /// Applies one event, stamping log lines with the current time.
    pub fn fold(&self, state: &mut SessionState, event: StreamEvent) -> Fold {
        self.fold_at(state, event, Utc::now())
    }

    /// Applies one event with an explicit capture time.
    pub fn fold_at(&self, state: &mut SessionState, event: StreamEvent, now: DateTime<Utc>) -> Fold {
        if state.is_terminal() {
            debug!(?event, "session already terminal; event ignored");
            return Fold::Ignored;
        }
        match event {
            StreamEvent::Log { content } => {
                let severity = self.severity.classify(&content);
                let stage = self.tracker.observe(&mut state.progress, &content);
                state.log.push(LogEntry {
                    message: content,
                    severity,
                    timestamp: now,
                });
                Fold::Logged { severity, stage }
            }
            StreamEvent::Result { payload } => {
                state.results.push(payload);
                Fold::Collected {
                    index: state.results.len() - 1,
                }
            }
            StreamEvent::Complete => {
                state.is_running = false;
                state.is_complete = true;
                Fold::Completed
            }
        }
    }

    /// Marks the run complete when the stream ended without a completion
    /// event. Returns `false` if the session was already terminal.
    pub fn close(&self, state: &mut SessionState) -> bool {
        if state.is_terminal() {
            return false;
        }
        state.is_running = false;
        state.is_complete = true;
        true
    }

    /// Stops a run the caller abandoned. No log line is added and nothing
    /// already folded is removed. Returns `false` if the session was already
    /// terminal.
    pub fn cancel(&self, state: &mut SessionState) -> bool {
        if state.is_terminal() {
            return false;
        }
        state.is_running = false;
        state.cancelled = true;
        true
    }

    /// Records a terminal failure: one synthetic error line, then stop.
    ///
    /// `is_complete` stays false so a failed run is distinguishable from a
    /// finished one.
    pub fn fail(&self, state: &mut SessionState, failure: RunFailure) {
        if state.is_terminal() {
            return;
        }
        state.log.push(LogEntry {
            message: format!("ERROR: {failure}"),
            severity: Severity::Error,
            timestamp: Utc::now(),
        });
        state.is_running = false;
        state.failure = Some(failure);
    }
}
