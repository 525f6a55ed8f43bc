use std::sync::Arc;
use std::time::Instant;

use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::error::DecoderError;
use crate::lexicon::Trie;
use crate::lm::LanguageModel;

mod candidates;
pub mod config;
mod history;
mod search;
pub mod state;

use candidates::{CandidateBuffer, Selection};
use history::FrameHistory;
use search::{rank_tokens, SearchContext};

pub use config::{CriterionType, DecoderOptions};
pub use state::{DecodeResult, HypRef, Hypothesis};

/// Token and word ids with a fixed role in the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub sil: usize,
    /// Required for CTC, unused for ASG.
    pub blank: Option<usize>,
    /// Word label emitted for out-of-lexicon spellings when `unk_score` is finite.
    pub unk_word: Option<usize>,
}

impl SpecialTokens {
    pub fn ctc(sil: usize, blank: usize) -> Self {
        Self {
            sil,
            blank: Some(blank),
            unk_word: None,
        }
    }

    pub fn asg(sil: usize) -> Self {
        Self {
            sil,
            blank: None,
            unk_word: None,
        }
    }

    pub fn with_unk_word(mut self, unk: usize) -> Self {
        self.unk_word = Some(unk);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePhase {
    NotStarted,
    Decoding,
    Ended,
}

/// Lexicon-constrained beam search over per-frame token scores.
///
/// One instance decodes one utterance at a time. The trie and LM are shared
/// read-only, so independent instances can run on separate threads.
pub struct LexiconDecoder<L: LanguageModel> {
    options: DecoderOptions,
    trie: Arc<Trie>,
    lm: Arc<L>,
    special: SpecialTokens,
    transitions: Option<Array2<f32>>,
    history: FrameHistory<L::State>,
    candidates: CandidateBuffer<L::State>,
    token_order: Vec<usize>,
    /// Emission width fixed by the first `decode_step` of an utterance.
    n_tokens: Option<usize>,
    phase: DecodePhase,
}

impl<L: LanguageModel> LexiconDecoder<L> {
    pub fn new(
        options: DecoderOptions,
        trie: Arc<Trie>,
        lm: Arc<L>,
        special: SpecialTokens,
    ) -> Result<Self, DecoderError> {
        options.validate()?;
        if options.criterion == CriterionType::Ctc && special.blank.is_none() {
            return Err(DecoderError::InvalidConfig(
                "CTC decoding requires a blank token".to_string(),
            ));
        }
        if options.unk_enabled() && special.unk_word.is_none() {
            return Err(DecoderError::InvalidConfig(
                "unk_score is set but no unknown-word label was given".to_string(),
            ));
        }

        log::debug!(
            "Lexicon decoder initialized (beam={}, threshold={}, lm_weight={}, criterion={:?})",
            options.beam_size,
            options.beam_threshold,
            options.lm_weight,
            options.criterion
        );

        Ok(Self {
            options,
            trie,
            lm,
            special,
            transitions: None,
            history: FrameHistory::default(),
            candidates: CandidateBuffer::default(),
            token_order: Vec::new(),
            n_tokens: None,
            phase: DecodePhase::NotStarted,
        })
    }

    /// ASG token-to-token transition scores, indexed `[next, prev]`.
    pub fn with_transitions(mut self, transitions: Array2<f32>) -> Result<Self, DecoderError> {
        let (rows, cols) = transitions.dim();
        if rows != cols {
            return Err(DecoderError::InvalidConfig(format!(
                "transition matrix must be square, got {rows}x{cols}"
            )));
        }
        self.transitions = Some(transitions);
        Ok(self)
    }

    pub fn options(&self) -> &DecoderOptions {
        &self.options
    }

    pub fn phase(&self) -> DecodePhase {
        self.phase
    }

    pub fn decode_begin(&mut self) {
        let root = Hypothesis {
            lm_state: self.lm.start(false),
            lex: self.trie.root(),
            parent: None,
            score: 0.0,
            am_score: 0.0,
            lm_score: 0.0,
            token: Some(self.special.sil),
            word: None,
            prev_blank: false,
        };
        self.history.reset(root);
        self.candidates.reset();
        self.n_tokens = None;
        self.phase = DecodePhase::Decoding;
    }

    /// Extends the beam by every row of `emissions` (`frames x tokens`).
    pub fn decode_step(&mut self, emissions: ArrayView2<f32>) -> Result<(), DecoderError> {
        if self.phase != DecodePhase::Decoding {
            log::warn!("decode_step called in phase {:?}; ignoring", self.phase);
            return Ok(());
        }
        let (frames, n_tokens) = emissions.dim();
        self.check_token_count(n_tokens)?;
        self.n_tokens = Some(n_tokens);

        let start = Instant::now();
        for row in emissions.rows() {
            self.decode_frame(row);
        }
        log::debug!(
            "decode_step completed in {:?} (frames: {}, hypotheses: {})",
            start.elapsed(),
            frames,
            self.n_hypothesis()
        );
        Ok(())
    }

    fn check_token_count(&self, n_tokens: usize) -> Result<(), DecoderError> {
        if let Some(expected) = self.n_tokens {
            if expected != n_tokens {
                return Err(DecoderError::EmissionShape(format!(
                    "emissions have {n_tokens} tokens but this utterance started with {expected}"
                )));
            }
        }
        if self.special.sil >= n_tokens {
            return Err(DecoderError::EmissionShape(format!(
                "silence token {} outside {} token scores",
                self.special.sil, n_tokens
            )));
        }
        if let Some(blank) = self.special.blank {
            if self.options.criterion == CriterionType::Ctc && blank >= n_tokens {
                return Err(DecoderError::EmissionShape(format!(
                    "blank token {blank} outside {n_tokens} token scores"
                )));
            }
        }
        if let Some(transitions) = &self.transitions {
            if self.options.criterion == CriterionType::Asg && transitions.nrows() != n_tokens {
                return Err(DecoderError::EmissionShape(format!(
                    "transition matrix is {0}x{0} but emissions have {1} tokens",
                    transitions.nrows(),
                    n_tokens
                )));
            }
        }
        Ok(())
    }

    fn decode_frame(&mut self, scores: ArrayView1<f32>) {
        let Self {
            options,
            trie,
            lm,
            special,
            transitions,
            history,
            candidates,
            token_order,
            ..
        } = self;

        let Some(prev_frame) = history.current_abs() else {
            return;
        };
        rank_tokens(&scores, options.beam_size_token, token_order);

        let ctx = SearchContext {
            options,
            trie: &**trie,
            lm: &**lm,
            special: *special,
            transitions: transitions.as_ref(),
            token_order,
            first_frame: prev_frame == 0,
        };

        candidates.reset();
        for (slot, prev) in history.current().iter().enumerate() {
            let prev_ref = HypRef {
                frame: prev_frame,
                slot,
            };
            ctx.extend(prev, prev_ref, &scores, candidates);
        }

        let mut next = history.take_spare();
        candidates.store(
            &mut next,
            Selection {
                beam_size: options.beam_size,
                beam_threshold: options.beam_threshold,
                log_add: options.log_add,
                return_sorted: false,
            },
        );
        if next.is_empty() {
            log::debug!("No hypotheses survived frame {}", prev_frame + 1);
        }
        history.push_frame(next);
    }

    /// Scores sentence end for every hypothesis of the last frame and appends
    /// the final, sorted frame. Only valid once per `decode_begin`.
    pub fn decode_end(&mut self) {
        if self.phase != DecodePhase::Decoding {
            log::warn!("decode_end called in phase {:?}; ignoring", self.phase);
            return;
        }
        let Some(prev_frame) = self.history.current_abs() else {
            return;
        };

        self.candidates.reset();
        for (slot, prev) in self.history.current().iter().enumerate() {
            let (lm_state, lm_end) = self.lm.finish(&prev.lm_state);
            let lm_end = f64::from(lm_end);
            self.candidates.add(
                Hypothesis {
                    lm_state,
                    lex: prev.lex,
                    parent: Some(HypRef {
                        frame: prev_frame,
                        slot,
                    }),
                    score: prev.score + self.options.lm_weight * lm_end,
                    am_score: prev.am_score,
                    lm_score: prev.lm_score + lm_end,
                    token: None,
                    word: None,
                    prev_blank: false,
                },
                self.options.beam_threshold,
            );
        }

        let mut last = self.history.take_spare();
        self.candidates.store(
            &mut last,
            Selection {
                beam_size: self.options.beam_size,
                beam_threshold: self.options.beam_threshold,
                log_add: self.options.log_add,
                return_sorted: true,
            },
        );
        self.history.push_frame(last);
        self.phase = DecodePhase::Ended;
    }

    /// Runs a whole utterance and returns every final hypothesis, best first.
    pub fn decode(&mut self, emissions: ArrayView2<f32>) -> Result<Vec<DecodeResult>, DecoderError> {
        self.decode_begin();
        self.decode_step(emissions)?;
        self.decode_end();
        Ok(self.get_all_final_hypothesis())
    }

    /// Best path ending `look_back` frames before the newest frame.
    pub fn get_best_hypothesis(&self, look_back: usize) -> DecodeResult {
        let Some(current) = self.history.current_index() else {
            return DecodeResult::default();
        };
        let Some(target) = current.checked_sub(look_back) else {
            return DecodeResult::default();
        };
        if !self.history.is_reportable(target) {
            return DecodeResult::default();
        }
        self.history
            .find_best_ancestor(look_back)
            .map(|r| self.history.trace(r))
            .unwrap_or_default()
    }

    /// Every hypothesis of the newest frame, in frame order (best first after
    /// `decode_end`).
    pub fn get_all_final_hypothesis(&self) -> Vec<DecodeResult> {
        let (Some(current), Some(frame)) = (self.history.current_index(), self.history.current_abs())
        else {
            return Vec::new();
        };
        if !self.history.is_reportable(current) {
            return Vec::new();
        }
        (0..self.history.current().len())
            .map(|slot| self.history.trace(HypRef { frame, slot }))
            .collect()
    }

    pub fn n_hypothesis(&self) -> usize {
        self.history.current().len()
    }

    pub fn n_decoded_frames_in_buffer(&self) -> usize {
        self.history.len()
    }

    /// Hypotheses retained at local frame `frame` (0 is the oldest retained).
    pub fn frame_hypotheses(&self, frame: usize) -> &[Hypothesis<L::State>] {
        self.history.frame(frame)
    }

    pub fn hypothesis(&self, r: HypRef) -> Option<&Hypothesis<L::State>> {
        self.history.get(r)
    }

    /// Absolute frame number of local frame 0.
    pub fn first_retained_frame(&self) -> usize {
        self.history
            .current_abs()
            .zip(self.history.current_index())
            .map(|(abs, local)| abs - local)
            .unwrap_or(0)
    }

    /// Frees history that can no longer change the best path within
    /// `look_back` frames. A no-op when fewer than `look_back + 1` frames have
    /// been decoded since the last prune.
    pub fn prune(&mut self, look_back: usize) {
        if self.phase == DecodePhase::NotStarted {
            return;
        }
        if !self.history.prune(look_back) {
            log::debug!("Not enough decoded frames to prune with look_back={look_back}");
        }
    }
}
