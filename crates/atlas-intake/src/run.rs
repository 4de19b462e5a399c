use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt as _};
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::aggregator::Aggregator;
use crate::errors::{RunFailure, TransportError};
use crate::pipeline::{FoldStep, IngestPipeline};
use crate::source::{StreamSource, Upload};
use crate::state::SessionState;

/// Response body as a stream of raw chunks.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, TransportError>> + Send + 'static>>;

/// Monotonic identifier of a run within a [`Session`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run-{}", self.0)
    }
}

/// Per-run driver options.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Fail the run when no chunk arrives for this long.
    pub idle_timeout: Option<Duration>,
}

/// Latest published state of a session, tagged with the run that produced it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub run_id: RunId,
    pub state: SessionState,
}

/// Callback invoked after every applied fold.
pub trait SessionObserver: Send {
    fn on_fold(&mut self, run_id: RunId, step: &FoldStep, state: &SessionState);
}

impl<F> SessionObserver for F
where
    F: FnMut(RunId, &FoldStep, &SessionState) + Send,
{
    fn on_fold(&mut self, run_id: RunId, step: &FoldStep, state: &SessionState) {
        self(run_id, step, state)
    }
}

/// Observer that ignores every fold.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl SessionObserver for NoopObserver {
    fn on_fold(&mut self, _run_id: RunId, _step: &FoldStep, _state: &SessionState) {}
}

/// How a run ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// A completion event arrived.
    Completed,
    /// The stream ended without a completion event.
    StreamClosed,
    /// Transport failure or idle timeout.
    Failed(RunFailure),
    /// The caller aborted the run.
    Cancelled,
    /// A newer run started (or the session was cleared) while this one was
    /// still reading.
    Superseded,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed | Self::StreamClosed)
    }
}

/// Final result of [`RunDriver::drive`].
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport {
    pub run_id: RunId,
    pub outcome: RunOutcome,
    /// The run's own accumulated state, whether or not it is still current.
    pub state: SessionState,
}

/// Handle used to request cancellation of a running driver.
#[derive(Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    /// Requests cancellation. The driver stops before reading another chunk.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// Owner of the published state for consecutive validation runs.
///
/// Only the most recent run may publish. Starting a new run or clearing the
/// session wakes every older driver, which then drops its stream and returns
/// [`RunOutcome::Superseded`] even if its stream has gone quiet.
pub struct Session {
    session_id: uuid::Uuid,
    aggregator: Arc<Aggregator>,
    options: RunOptions,
    generation: watch::Sender<u64>,
    snapshot: Arc<watch::Sender<Snapshot>>,
}

impl Session {
    pub fn new(aggregator: Aggregator, options: RunOptions) -> Self {
        let (tx, _rx) = watch::channel(Snapshot::default());
        let (generation, _rx) = watch::channel(0);
        Self {
            session_id: uuid::Uuid::new_v4(),
            aggregator: Arc::new(aggregator),
            options,
            generation,
            snapshot: Arc::new(tx),
        }
    }

    pub fn session_id(&self) -> uuid::Uuid {
        self.session_id
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Receiver that observes the state after every processed chunk.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.borrow().clone()
    }

    pub fn current_run(&self) -> RunId {
        RunId(*self.generation.borrow())
    }

    /// Starts a new run, superseding any run still in flight.
    pub fn begin_run(&self) -> RunDriver {
        let run_id = self.advance();
        let state = SessionState::started();
        self.snapshot.send_replace(Snapshot {
            run_id,
            state: state.clone(),
        });
        debug!(session_id = %self.session_id, %run_id, "run started");

        let (abort_tx, abort_rx) = watch::channel(false);
        RunDriver {
            run_id,
            session_id: self.session_id,
            generation: self.generation.subscribe(),
            snapshot: self.snapshot.clone(),
            pipeline: IngestPipeline::new(self.aggregator.clone()),
            state,
            options: self.options.clone(),
            abort_rx,
            abort_handle: AbortHandle {
                tx: Arc::new(abort_tx),
            },
        }
    }

    /// Drops the current run's state and publishes an idle session.
    pub fn clear(&self) {
        let run_id = self.advance();
        self.snapshot.send_replace(Snapshot {
            run_id,
            state: SessionState::default(),
        });
        debug!(session_id = %self.session_id, %run_id, "session cleared");
    }

    fn advance(&self) -> RunId {
        let mut next = 0;
        self.generation.send_modify(|generation| {
            *generation += 1;
            next = *generation;
        });
        RunId(next)
    }
}

/// Sequential read loop for one run.
///
/// The only suspension point is the wait for the next chunk; everything done
/// with a chunk finishes before the next one is requested.
pub struct RunDriver {
    run_id: RunId,
    session_id: uuid::Uuid,
    generation: watch::Receiver<u64>,
    snapshot: Arc<watch::Sender<Snapshot>>,
    pipeline: IngestPipeline,
    state: SessionState,
    options: RunOptions,
    abort_rx: watch::Receiver<bool>,
    abort_handle: AbortHandle,
}

impl RunDriver {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort_handle.clone()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Opens the upload on `source` and drives the resulting stream.
    ///
    /// A source that fails to open fails the run the same way a mid-stream
    /// transport error does.
    pub async fn drive_source<O>(self, source: &dyn StreamSource, upload: Upload, observer: &mut O) -> RunReport
    where
        O: SessionObserver + ?Sized,
    {
        match source.open(upload).await {
            Ok(stream) => self.drive(stream, observer).await,
            Err(err) => self.fail(&err),
        }
    }

    /// Reads `stream` until the run reaches a terminal outcome.
    ///
    /// The stream is dropped when this returns.
    pub async fn drive<S, O>(mut self, mut stream: S, observer: &mut O) -> RunReport
    where
        S: Stream<Item = Result<Bytes, TransportError>> + Unpin,
        O: SessionObserver + ?Sized,
    {
        let mut session_alive = true;
        let outcome = loop {
            if !self.is_current() {
                break RunOutcome::Superseded;
            }
            if *self.abort_rx.borrow() {
                break RunOutcome::Cancelled;
            }

            let next = tokio::select! {
                biased;
                changed = self.abort_rx.changed() => {
                    match changed {
                        Ok(()) if *self.abort_rx.borrow() => break RunOutcome::Cancelled,
                        _ => continue,
                    }
                }
                changed = self.generation.changed(), if session_alive => {
                    // a dropped session can no longer supersede this run
                    session_alive = changed.is_ok();
                    continue;
                }
                next = next_chunk(&mut stream, self.options.idle_timeout) => next,
            };

            match next {
                Some(Ok(chunk)) => {
                    if !self.is_current() {
                        break RunOutcome::Superseded;
                    }
                    let run_id = self.run_id;
                    let outcome = self.pipeline.push_chunk(&mut self.state, &chunk, |step, state| {
                        observer.on_fold(run_id, step, state)
                    });
                    debug!(%run_id, bytes = chunk.len(), blocks = outcome.blocks, folds = outcome.folds, "chunk processed");
                    self.publish();
                    if outcome.completed {
                        break RunOutcome::Completed;
                    }
                }
                Some(Err(err)) => {
                    warn!(session_id = %self.session_id, run_id = %self.run_id, error = %err, "validation stream failed");
                    let failure = RunFailure::from(&err);
                    self.pipeline.aggregator().fail(&mut self.state, failure.clone());
                    self.publish();
                    break RunOutcome::Failed(failure);
                }
                None => {
                    if !self.is_current() {
                        break RunOutcome::Superseded;
                    }
                    let run_id = self.run_id;
                    let tail = self.pipeline.finish(&mut self.state, |step, state| {
                        observer.on_fold(run_id, step, state)
                    });
                    if tail.completed {
                        self.publish();
                        break RunOutcome::Completed;
                    }
                    self.pipeline.aggregator().close(&mut self.state);
                    self.publish();
                    break RunOutcome::StreamClosed;
                }
            }
        };
        drop(stream);

        if matches!(outcome, RunOutcome::Cancelled | RunOutcome::Superseded) {
            self.pipeline.aggregator().cancel(&mut self.state);
            if outcome == RunOutcome::Cancelled {
                self.publish();
            }
        }
        debug!(session_id = %self.session_id, run_id = %self.run_id, ?outcome, "run finished");
        RunReport {
            run_id: self.run_id,
            outcome,
            state: self.state,
        }
    }

    fn fail(mut self, err: &TransportError) -> RunReport {
        warn!(session_id = %self.session_id, run_id = %self.run_id, error = %err, "validation stream could not be opened");
        let failure = RunFailure::from(err);
        self.pipeline.aggregator().fail(&mut self.state, failure.clone());
        self.publish();
        RunReport {
            run_id: self.run_id,
            outcome: RunOutcome::Failed(failure),
            state: self.state,
        }
    }

    fn is_current(&self) -> bool {
        *self.generation.borrow() == self.run_id.0
    }

    /// Publishes this run's state unless a newer run owns the session.
    fn publish(&self) {
        let run_id = self.run_id;
        let state = &self.state;
        self.snapshot.send_if_modified(|snapshot| {
            if snapshot.run_id != run_id {
                return false;
            }
            snapshot.state = state.clone();
            true
        });
    }
}

async fn next_chunk<S>(stream: &mut S, idle_timeout: Option<Duration>) -> Option<Result<Bytes, TransportError>>
where
    S: Stream<Item = Result<Bytes, TransportError>> + Unpin,
{
    match idle_timeout {
        Some(window) => match tokio::time::timeout(window, stream.next()).await {
            Ok(next) => next,
            Err(_) => Some(Err(TransportError::idle_timeout(window))),
        },
        None => stream.next().await,
    }
}
