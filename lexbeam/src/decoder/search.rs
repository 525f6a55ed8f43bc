use std::cmp::Ordering;

use ndarray::{Array2, ArrayView1};

use crate::lexicon::Trie;
use crate::lm::LanguageModel;

use super::candidates::CandidateBuffer;
use super::config::{CriterionType, DecoderOptions};
use super::state::{HypRef, Hypothesis};
use super::SpecialTokens;

/// Everything candidate generation reads for one frame.
pub(super) struct SearchContext<'a, L: LanguageModel> {
    pub options: &'a DecoderOptions,
    pub trie: &'a Trie,
    pub lm: &'a L,
    pub special: SpecialTokens,
    pub transitions: Option<&'a Array2<f32>>,
    /// Tokens to try for child extension, best first.
    pub token_order: &'a [usize],
    /// True while producing the first frame after the root.
    pub first_frame: bool,
}

impl<L: LanguageModel> SearchContext<'_, L> {
    /// Proposes every extension of `prev` for one frame of acoustic scores.
    pub fn extend(
        &self,
        prev: &Hypothesis<L::State>,
        prev_ref: HypRef,
        scores: &ArrayView1<f32>,
        out: &mut CandidateBuffer<L::State>,
    ) {
        let opts = self.options;
        let threshold = opts.beam_threshold;
        let root = self.trie.root();
        let at_root = prev.lex == root;
        let ctc = opts.criterion == CriterionType::Ctc;
        let lex_max = if at_root {
            0.0
        } else {
            f64::from(self.trie.max_score(prev.lex))
        };

        for &n in self.token_order {
            let Some(child) = self.trie.child(prev.lex, n) else {
                continue;
            };
            let am = self.am_score(scores, n, prev.token);
            let mut score = prev.score + am;
            if n == self.special.sil {
                score += opts.sil_score;
            }

            // A repeated CTC token without a blank in between is the same
            // emission, not a new step down the trie.
            if (!ctc || prev.prev_blank || prev.token != Some(n)) && self.trie.has_children(child) {
                let lm = f64::from(self.trie.max_score(child)) - lex_max;
                out.add(
                    Hypothesis {
                        lm_state: prev.lm_state.clone(),
                        lex: child,
                        parent: Some(prev_ref),
                        score: score + opts.lm_weight * lm,
                        am_score: prev.am_score + am,
                        lm_score: prev.lm_score + lm,
                        token: Some(n),
                        word: None,
                        prev_blank: false,
                    },
                    threshold,
                );
            }

            let labels = self.trie.labels(child);
            // Single-token word predicted on consecutive frames: emit it once.
            let repeated_from_root = at_root && prev.token == Some(n);
            if !repeated_from_root {
                for &label in labels {
                    let (lm_state, lm_raw) = self.lm.score(&prev.lm_state, label);
                    let lm = f64::from(lm_raw) - lex_max;
                    out.add(
                        Hypothesis {
                            lm_state,
                            lex: root,
                            parent: Some(prev_ref),
                            score: score + opts.lm_weight * lm + opts.word_score,
                            am_score: prev.am_score + am,
                            lm_score: prev.lm_score + lm,
                            token: Some(n),
                            word: Some(label),
                            prev_blank: false,
                        },
                        threshold,
                    );
                }
            }

            if labels.is_empty() && opts.unk_enabled() {
                if let Some(unk) = self.special.unk_word {
                    let (lm_state, lm_raw) = self.lm.score(&prev.lm_state, unk);
                    let lm = f64::from(lm_raw) - lex_max;
                    out.add(
                        Hypothesis {
                            lm_state,
                            lex: root,
                            parent: Some(prev_ref),
                            score: score + opts.lm_weight * lm + opts.unk_score,
                            am_score: prev.am_score + am,
                            lm_score: prev.lm_score + lm,
                            token: Some(n),
                            word: Some(unk),
                            prev_blank: false,
                        },
                        threshold,
                    );
                }
            }
        }

        // Stay on the same trie node: silence at the root, otherwise the
        // previous token again.
        if !ctc || !prev.prev_blank || at_root {
            let stay = if at_root { Some(self.special.sil) } else { prev.token };
            if let Some(n) = stay {
                let am = self.am_score(scores, n, prev.token);
                let mut score = prev.score + am;
                if n == self.special.sil {
                    score += opts.sil_score;
                }
                out.add(
                    Hypothesis {
                        lm_state: prev.lm_state.clone(),
                        lex: prev.lex,
                        parent: Some(prev_ref),
                        score,
                        am_score: prev.am_score + am,
                        lm_score: prev.lm_score,
                        token: Some(n),
                        word: None,
                        prev_blank: false,
                    },
                    threshold,
                );
            }
        }

        if ctc {
            if let Some(blank) = self.special.blank {
                let am = f64::from(scores[blank]);
                out.add(
                    Hypothesis {
                        lm_state: prev.lm_state.clone(),
                        lex: prev.lex,
                        parent: Some(prev_ref),
                        score: prev.score + am,
                        am_score: prev.am_score + am,
                        lm_score: prev.lm_score,
                        token: Some(blank),
                        word: None,
                        prev_blank: true,
                    },
                    threshold,
                );
            }
        }
    }

    fn am_score(&self, scores: &ArrayView1<f32>, token: usize, prev_token: Option<usize>) -> f64 {
        let mut am = f64::from(scores[token]);
        if self.options.criterion == CriterionType::Asg && !self.first_frame {
            if let (Some(transitions), Some(prev)) = (self.transitions, prev_token) {
                am += f64::from(transitions[[token, prev]]);
            }
        }
        am
    }
}

/// Fills `order` with the `beam_size_token` best tokens of a frame, best
/// first. When every token fits, the natural order is kept.
pub(super) fn rank_tokens(scores: &ArrayView1<f32>, beam_size_token: usize, order: &mut Vec<usize>) {
    order.clear();
    order.extend(0..scores.len());
    if scores.len() <= beam_size_token {
        return;
    }

    let by_score = |a: &usize, b: &usize| -> Ordering {
        scores[*b].total_cmp(&scores[*a]).then(a.cmp(b))
    };
    order.select_nth_unstable_by(beam_size_token - 1, by_score);
    order.truncate(beam_size_token);
    order.sort_by(by_score);
}
