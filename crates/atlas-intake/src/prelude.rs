//! Common imports for typical ingestion usage.
pub use crate::{
    AbortHandle, FoldStep, HttpSource, IngestConfig, IntakeError, LogEntry, NoopObserver, RunId,
    RunOutcome, RunReport, RunStatus, Session, SessionObserver, SessionState, Severity,
    SourceConfig, StageId, StreamSource, Summary, Upload,
};
