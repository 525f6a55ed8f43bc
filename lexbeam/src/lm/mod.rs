use std::fmt::Debug;
use std::hash::Hash;

mod bigram;

pub use bigram::{BigramLm, BigramState, SENTENCE_BEGIN, SENTENCE_END, UNKNOWN_WORD};

/// Stateful word-level language model queried by the decoder.
///
/// Scores are returned in the model's native log units; the decoder applies
/// its own `lm_weight`. States must compare equal exactly when every future
/// score from them is identical, since the decoder merges hypotheses on
/// state equality.
pub trait LanguageModel: Send + Sync {
    type State: Clone + Eq + Hash + Debug + Send;

    /// State at the beginning of an utterance. With `start_with_nothing` the
    /// state carries no sentence-begin context.
    fn start(&self, start_with_nothing: bool) -> Self::State;

    fn score(&self, state: &Self::State, word: usize) -> (Self::State, f32);

    /// Sentence-end transition.
    fn finish(&self, state: &Self::State) -> (Self::State, f32);
}

/// Language model that scores everything as zero. Useful for lexicon-only
/// decoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroLm;

impl LanguageModel for ZeroLm {
    type State = ();

    fn start(&self, _start_with_nothing: bool) -> Self::State {}

    fn score(&self, _state: &Self::State, _word: usize) -> (Self::State, f32) {
        ((), 0.0)
    }

    fn finish(&self, _state: &Self::State) -> (Self::State, f32) {
        ((), 0.0)
    }
}
