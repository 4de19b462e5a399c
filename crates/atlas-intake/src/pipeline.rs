use std::sync::Arc;

use tracing::debug;

use crate::aggregator::{Aggregator, Fold};
use crate::classifier::classify_block;
use crate::decoder::ChunkDecoder;
use crate::framer::EventFramer;
use crate::state::SessionState;

/// One applied fold, numbered from zero within a run.
#[derive(Clone, Debug, PartialEq)]
pub struct FoldStep {
    pub seq: u64,
    pub fold: Fold,
}

/// What one chunk did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChunkOutcome {
    pub blocks: usize,
    pub folds: usize,
    /// A completion event was folded; the caller should stop reading.
    pub completed: bool,
}

/// Decode → frame → classify → fold, one chunk at a time.
///
/// All work for a chunk runs to completion before `push_chunk` returns, so a
/// state observed between chunks never holds a half-applied event.
pub struct IngestPipeline {
    decoder: ChunkDecoder,
    framer: EventFramer,
    aggregator: Arc<Aggregator>,
    seq: u64,
}

impl IngestPipeline {
    pub fn new(aggregator: Arc<Aggregator>) -> Self {
        Self {
            decoder: ChunkDecoder::default(),
            framer: EventFramer::default(),
            aggregator,
            seq: 0,
        }
    }

    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Processes one raw chunk, calling `on_fold` after every applied fold.
    pub fn push_chunk<F>(&mut self, state: &mut SessionState, chunk: &[u8], on_fold: F) -> ChunkOutcome
    where
        F: FnMut(&FoldStep, &SessionState),
    {
        let text = self.decoder.decode(chunk);
        self.process_text(state, &text, on_fold)
    }

    /// Flushes the decoder and framer at end of stream.
    ///
    /// A trailing block without its blank-line terminator is still
    /// dispatched.
    pub fn finish<F>(&mut self, state: &mut SessionState, mut on_fold: F) -> ChunkOutcome
    where
        F: FnMut(&FoldStep, &SessionState),
    {
        let tail = self.decoder.finish();
        let mut outcome = self.process_text(state, &tail, &mut on_fold);
        if outcome.completed {
            return outcome;
        }
        if let Some(block) = self.framer.finish() {
            debug!(bytes = block.len(), "dispatching unterminated trailing block");
            let rest = self.process_block(state, &block, &mut on_fold);
            outcome.blocks += rest.blocks;
            outcome.folds += rest.folds;
            outcome.completed = rest.completed;
        }
        outcome
    }

    fn process_text<F>(&mut self, state: &mut SessionState, text: &str, mut on_fold: F) -> ChunkOutcome
    where
        F: FnMut(&FoldStep, &SessionState),
    {
        let mut outcome = ChunkOutcome::default();
        for block in self.framer.push(text) {
            let step = self.process_block(state, &block, &mut on_fold);
            outcome.blocks += step.blocks;
            outcome.folds += step.folds;
            if step.completed {
                outcome.completed = true;
                break;
            }
        }
        outcome
    }

    fn process_block<F>(&mut self, state: &mut SessionState, block: &str, on_fold: &mut F) -> ChunkOutcome
    where
        F: FnMut(&FoldStep, &SessionState),
    {
        let mut outcome = ChunkOutcome {
            blocks: 1,
            ..ChunkOutcome::default()
        };
        let classified = classify_block(block);
        state.dropped_payloads += classified.malformed as u64;
        for event in classified.events {
            let fold = self.aggregator.fold(state, event);
            if fold == Fold::Ignored {
                continue;
            }
            let step = FoldStep {
                seq: self.seq,
                fold,
            };
            self.seq += 1;
            outcome.folds += 1;
            on_fold(&step, state);
            if step.fold == Fold::Completed {
                outcome.completed = true;
                break;
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IngestConfig;
    use crate::severity::Severity;
    use crate::stage::StageId;

    const SCENARIO: &[u8] = b"data: {\"type\":\"log\",\"content\":\"Running npi registry check\"}\n\n\
        data: {\"type\":\"result\",\"data\":{\"id\":1}}\n\n\
        data: {\"type\":\"complete\"}\n\n";

    fn aggregator() -> Arc<Aggregator> {
        Arc::new(IngestConfig::default().aggregator().expect("aggregator"))
    }

    fn pipeline() -> IngestPipeline {
        IngestPipeline::new(aggregator())
    }

    fn run_split(aggregator: &Arc<Aggregator>, a: usize, b: usize) -> SessionState {
        let mut pipeline = IngestPipeline::new(aggregator.clone());
        let mut state = SessionState::started();
        for chunk in [&SCENARIO[..a], &SCENARIO[a..b], &SCENARIO[b..]] {
            if pipeline.push_chunk(&mut state, chunk, |_, _| {}).completed {
                break;
            }
        }
        state
    }

    #[test]
    fn three_chunk_scenario_at_every_split() {
        let aggregator = aggregator();
        for a in 0..=SCENARIO.len() {
            for b in (a..=SCENARIO.len()).step_by(5) {
                let state = run_split(&aggregator, a, b);
                assert_eq!(state.log.len(), 1, "split {a},{b}");
                assert_eq!(state.log[0].message, "Running npi registry check");
                assert_eq!(state.log[0].severity, Severity::Info);
                assert_eq!(state.results, vec![serde_json::json!({"id": 1})]);
                assert_eq!(state.stages_reached(), &[StageId::Npi]);
                assert!(state.is_complete);
                assert!(!state.is_running);
            }
        }
    }

    #[test]
    fn folds_after_completion_in_the_same_chunk_are_skipped() {
        let mut pipeline = pipeline();
        let mut state = SessionState::started();
        let chunk = b"data: {\"type\":\"close\"}\n\ndata: {\"type\":\"log\",\"content\":\"late\"}\n\n";
        let outcome = pipeline.push_chunk(&mut state, chunk, |_, _| {});
        assert!(outcome.completed);
        assert_eq!(outcome.folds, 1);
        assert!(state.log.is_empty());
    }

    #[test]
    fn observer_sees_every_fold_in_order() {
        let mut pipeline = pipeline();
        let mut state = SessionState::started();
        let mut seen = Vec::new();
        pipeline.push_chunk(&mut state, SCENARIO, |step, snapshot| {
            seen.push((step.seq, step.fold.clone(), snapshot.log.len(), snapshot.results.len()));
        });
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].0, 0);
        assert!(matches!(seen[0].1, Fold::Logged { stage: Some(StageId::Npi), .. }));
        assert_eq!((seen[1].0, seen[1].2, seen[1].3), (1, 1, 1));
        assert_eq!(seen[2].1, Fold::Completed);
    }

    #[test]
    fn malformed_payloads_are_counted_not_fatal() {
        let mut pipeline = pipeline();
        let mut state = SessionState::started();
        let chunk = b"data: {oops\ndata: {\"type\":\"log\",\"content\":\"ok\"}\n\n";
        pipeline.push_chunk(&mut state, chunk, |_, _| {});
        assert_eq!(state.log.len(), 1);
        assert_eq!(state.log[0].message, "ok");
        assert_eq!(state.dropped_payloads, 1);
        assert!(state.is_running);
    }

    #[test]
    fn unterminated_final_block_is_dispatched_on_finish() {
        let mut pipeline = pipeline();
        let mut state = SessionState::started();
        pipeline.push_chunk(&mut state, b"data: {\"type\":\"log\",\"content\":\"tail\"}", |_, _| {});
        assert!(state.log.is_empty());
        let outcome = pipeline.finish(&mut state, |_, _| {});
        assert_eq!(outcome.folds, 1);
        assert_eq!(state.log[0].message, "tail");
    }
}
