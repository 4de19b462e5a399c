//! Streaming ingestion of provider validation runs.
//!
//! The validation backend answers a file upload with a server-sent-event
//! stream of log lines, result records and a final completion signal. This
//! crate turns that byte stream into a [`SessionState`] the caller can render
//! incrementally: raw chunks are decoded, framed into event blocks,
//! classified, and folded into the state one event at a time.
//!
//! # Driving a run
//!
//! ```no_run
//! use atlas_intake::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), IntakeError> {
//! let config = IngestConfig::default();
//! let session = Session::new(config.aggregator()?, config.run_options());
//! let source = HttpSource::new(SourceConfig::default())?;
//!
//! let mut print_lines = |_run: RunId, _step: &FoldStep, state: &SessionState| {
//!     if let Some(entry) = state.last_log() {
//!         println!("[{}] {}", entry.severity, entry.message);
//!     }
//! };
//! let report = session
//!     .begin_run()
//!     .drive_source(&source, Upload::from_path("providers.csv".as_ref())?, &mut print_lines)
//!     .await;
//!
//! let summary = Summary::from_state(&report.state, &config.tiers);
//! println!("{} records, {} flagged", summary.total, summary.flagged_for_review);
//! # Ok(())
//! # }
//! ```

/// Folding classified events into session state.
pub mod aggregator;
/// `data:` line classification.
pub mod classifier;
/// TOML-loadable keyword and marker tables.
pub mod config;
/// Incremental UTF-8 decoding.
pub mod decoder;
/// Public error types.
pub mod errors;
/// Stream event model.
pub mod event;
/// Blank-line event framing.
pub mod framer;
/// Per-chunk decode/frame/classify/fold pipeline.
pub mod pipeline;
/// Common imports for typical usage.
pub mod prelude;
/// Stage and record-count tracking.
pub mod progress;
/// Async run driver, cancellation and run identity.
pub mod run;
/// Log severity rules.
pub mod severity;
/// Byte stream sources (HTTP upload, recorded replay).
pub mod source;
/// Pipeline stage identifiers and keyword table.
pub mod stage;
/// Session state accumulated by a run.
pub mod state;
/// Summary counters over result records.
pub mod summary;

pub use aggregator::{Aggregator, Fold};
pub use config::IngestConfig;
pub use errors::{IntakeError, RunFailure, TransportError};
pub use event::StreamEvent;
pub use pipeline::{ChunkOutcome, FoldStep, IngestPipeline};
pub use progress::{Progress, ProgressTracker};
pub use run::{
    AbortHandle, ByteStream, NoopObserver, RunDriver, RunId, RunOptions, RunOutcome, RunReport,
    Session, SessionObserver, Snapshot,
};
pub use severity::{Severity, SeverityRules};
pub use source::{HttpSource, ReplaySource, SourceConfig, StreamSource, Upload};
pub use stage::{StageId, StageTable};
pub use state::{LogEntry, RunStatus, SessionState};
pub use summary::{ConfidenceTiers, Summary};
