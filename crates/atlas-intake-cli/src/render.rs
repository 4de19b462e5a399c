//! Plain-text rendering of a run for the terminal.

use std::fmt::Write as _;

use atlas_intake::{LogEntry, RunOutcome, RunReport, SessionState, Severity, StageTable, Summary};

pub fn severity_marker(severity: Severity) -> &'static str {
    match severity {
        Severity::Info => "   ",
        Severity::Success => " ok",
        Severity::Warning => "  !",
        Severity::Error => "ERR",
    }
}

/// One log line, prefixed with its severity and the stage it advanced to.
pub fn log_line(entry: &LogEntry, stage: Option<&str>) -> String {
    let time = entry.timestamp.format("%H:%M:%S");
    match stage {
        Some(stage) => format!(
            "{time} {} [{stage}] {}",
            severity_marker(entry.severity),
            entry.message
        ),
        None => format!("{time} {} {}", severity_marker(entry.severity), entry.message),
    }
}

/// `[x] NPI Verification` style checklist of every configured stage.
pub fn stage_checklist(stages: &StageTable, state: &SessionState) -> String {
    let mut out = String::new();
    for rule in stages.iter() {
        let mark = if state.current_stage() == Some(rule.stage) && state.is_running {
            '>'
        } else if state.progress.has_reached(rule.stage) {
            'x'
        } else {
            ' '
        };
        let _ = writeln!(out, "  [{mark}] {} {}", rule.icon, rule.label);
    }
    out
}

pub fn outcome_label(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Completed => "completed".to_string(),
        RunOutcome::StreamClosed => "completed (stream closed without completion event)".to_string(),
        RunOutcome::Failed(failure) => format!("failed: {failure}"),
        RunOutcome::Cancelled => "cancelled".to_string(),
        RunOutcome::Superseded => "superseded".to_string(),
    }
}

fn percent(value: f64) -> String {
    format!("{value:.0}%")
}

/// Closing block printed after the run ends.
pub fn report(stages: &StageTable, report: &RunReport, summary: &Summary) -> String {
    let state = &report.state;
    let mut out = String::new();
    let _ = writeln!(out, "\n{} {}", report.run_id, outcome_label(&report.outcome));
    out.push_str(&stage_checklist(stages, state));

    let _ = writeln!(
        out,
        "  stages: {}",
        percent(state.progress.stage_completion(stages.len()))
    );
    if let Some(done) = state.progress.record_completion() {
        let _ = writeln!(
            out,
            "  records: {}/{} ({})",
            state.progress.processed_count,
            state.progress.expected_total,
            percent(done)
        );
    }

    let _ = writeln!(
        out,
        "  results: {} (high {}, medium {}, low {}, unscored {})",
        summary.total,
        summary.high_confidence,
        summary.medium_confidence,
        summary.low_confidence,
        summary.unscored
    );
    if let Some(avg) = summary.average_confidence {
        let _ = writeln!(out, "  average confidence: {avg:.2}");
    }
    if summary.flagged_for_review > 0 {
        let _ = writeln!(out, "  flagged for review: {}", summary.flagged_for_review);
    }
    if summary.log_errors + summary.log_warnings > 0 {
        let _ = writeln!(
            out,
            "  log: {} errors, {} warnings",
            summary.log_errors, summary.log_warnings
        );
    }
    if state.dropped_payloads > 0 {
        let _ = writeln!(out, "  dropped malformed payloads: {}", state.dropped_payloads);
    }
    out
}

/// Machine-readable report for `--json`.
pub fn report_json(report: &RunReport, summary: &Summary) -> serde_json::Value {
    serde_json::json!({
        "run_id": report.run_id,
        "outcome": outcome_label(&report.outcome),
        "status": report.state.status(),
        "summary": summary,
        "state": report.state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_intake::{ConfidenceTiers, IngestConfig, RunFailure, RunId, StageId, StreamEvent};
    use chrono::TimeZone as _;

    fn entry(message: &str, severity: Severity) -> LogEntry {
        LogEntry {
            message: message.to_string(),
            severity,
            timestamp: chrono::Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 5).single().expect("timestamp"),
        }
    }

    #[test]
    fn log_line_includes_time_marker_and_stage() {
        let line = log_line(&entry("NPI lookup failed", Severity::Error), Some("NPI Verification"));
        assert_eq!(line, "09:30:05 ERR [NPI Verification] NPI lookup failed");
        let plain = log_line(&entry("Reading CSV file...", Severity::Info), None);
        assert_eq!(plain, "09:30:05     Reading CSV file...");
    }

    #[test]
    fn checklist_marks_reached_and_current_stages() {
        let config = IngestConfig::default();
        let aggregator = config.aggregator().expect("aggregator");
        let mut state = SessionState::started();
        aggregator.fold(&mut state, StreamEvent::log("Running npi registry check"));
        aggregator.fold(&mut state, StreamEvent::log("Validating address"));

        let checklist = stage_checklist(&config.stages, &state);
        let lines: Vec<_> = checklist.lines().collect();
        assert_eq!(lines.len(), StageId::ALL.len());
        assert!(lines[0].starts_with("  [x]"));
        assert!(lines[1].starts_with("  [>]"));
        assert!(lines[2].starts_with("  [ ]"));
    }

    #[test]
    fn failed_report_names_the_failure() {
        let config = IngestConfig::default();
        let report = RunReport {
            run_id: RunId(2),
            outcome: RunOutcome::Failed(RunFailure::Stalled { seconds: 30 }),
            state: SessionState::default(),
        };
        let summary = Summary::from_state(&report.state, &ConfidenceTiers::default());
        let text = super::report(&config.stages, &report, &summary);
        assert!(text.starts_with("\nrun-2 failed:"));
        assert!(text.contains("results: 0"));

        let json = report_json(&report, &summary);
        assert_eq!(json["run_id"], 2);
        assert_eq!(json["summary"]["total"], 0);
    }

    #[test]
    fn aborted_run_reports_cancelled_status() {
        let aggregator = IngestConfig::default().aggregator().expect("aggregator");
        let mut state = SessionState::started();
        aggregator.fold(&mut state, StreamEvent::log("Reading CSV file..."));
        aggregator.cancel(&mut state);
        let report = RunReport {
            run_id: RunId(1),
            outcome: RunOutcome::Cancelled,
            state,
        };
        let summary = Summary::from_state(&report.state, &ConfidenceTiers::default());
        let json = report_json(&report, &summary);
        assert_eq!(json["status"], "cancelled");
        assert_eq!(json["outcome"], "cancelled");
        assert_eq!(json["state"]["log"].as_array().map(Vec::len), Some(1));
    }
}
