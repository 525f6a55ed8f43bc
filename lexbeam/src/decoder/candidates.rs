use std::cmp::Ordering;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;

use crate::lexicon::NodeId;

use super::state::Hypothesis;

/// Knobs for one selection pass.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Selection {
    pub beam_size: usize,
    pub beam_threshold: f64,
    pub log_add: bool,
    pub return_sorted: bool,
}

/// Per-decoder scratch space for one frame's extensions. Records stay where
/// they were pushed; filtering, merging and top-K work on `order`.
#[derive(Debug)]
pub(crate) struct CandidateBuffer<S> {
    candidates: Vec<Hypothesis<S>>,
    order: Vec<usize>,
    merge_index: HashMap<(S, NodeId), usize>,
    /// Running group score per kept slot during `merge`.
    merged_scores: Vec<f64>,
    best_score: f64,
}

impl<S> Default for CandidateBuffer<S> {
    fn default() -> Self {
        Self {
            candidates: Vec::new(),
            order: Vec::new(),
            merge_index: HashMap::new(),
            merged_scores: Vec::new(),
            best_score: f64::NEG_INFINITY,
        }
    }
}

impl<S: Clone + Eq + Hash> CandidateBuffer<S> {
    pub fn reset(&mut self) {
        self.candidates.clear();
        self.order.clear();
        self.best_score = f64::NEG_INFINITY;
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn best_score(&self) -> f64 {
        self.best_score
    }

    /// Admits `hyp` if it is within `beam_threshold` of the best score seen
    /// so far in this frame.
    pub fn add(&mut self, hyp: Hypothesis<S>, beam_threshold: f64) {
        if hyp.score > self.best_score {
            self.best_score = hyp.score;
        }
        if is_within_beam(self.best_score, hyp.score, beam_threshold) {
            self.candidates.push(hyp);
        }
    }

    /// Threshold, merge and top-K, in that order. Replaces the contents of
    /// `next` with the selected hypotheses.
    pub fn store(&mut self, next: &mut Vec<Hypothesis<S>>, selection: Selection) {
        next.clear();
        if self.candidates.is_empty() {
            return;
        }

        self.prune(selection.beam_threshold);
        self.merge(selection.log_add);
        self.select_top(selection.beam_size, selection.return_sorted);

        next.extend(self.order.iter().map(|&i| self.candidates[i].clone()));
    }

    /// Candidates admitted before the frame best was known are re-checked here.
    fn prune(&mut self, beam_threshold: f64) {
        let best = self.best_score;
        self.order.clear();
        self.order.extend(
            self.candidates
                .iter()
                .enumerate()
                .filter(|(_, c)| is_within_beam(best, c.score, beam_threshold))
                .map(|(i, _)| i),
        );
    }

    /// Keeps one candidate per (LM state, trie node). The higher individual
    /// score wins; on an exact tie the earlier candidate stays. With `log_add`
    /// the survivor carries the log-sum of its group.
    fn merge(&mut self, log_add: bool) {
        let Self {
            candidates,
            order,
            merge_index,
            merged_scores,
            ..
        } = self;

        merge_index.clear();
        merged_scores.clear();
        let mut kept = 0;
        for k in 0..order.len() {
            let idx = order[k];
            let score = candidates[idx].score;
            let key = (candidates[idx].lm_state.clone(), candidates[idx].lex);
            match merge_index.entry(key) {
                Entry::Occupied(entry) => {
                    let slot = *entry.get();
                    if score > candidates[order[slot]].score {
                        order[slot] = idx;
                    }
                    merged_scores[slot] = if log_add {
                        log_add_f64(merged_scores[slot], score)
                    } else {
                        merged_scores[slot].max(score)
                    };
                }
                Entry::Vacant(entry) => {
                    entry.insert(kept);
                    order[kept] = idx;
                    merged_scores.push(score);
                    kept += 1;
                }
            }
        }
        order.truncate(kept);

        for (&idx, &score) in order.iter().zip(merged_scores.iter()) {
            candidates[idx].score = score;
        }
    }

    fn select_top(&mut self, beam_size: usize, return_sorted: bool) {
        let candidates = &self.candidates;
        let by_score = |a: &usize, b: &usize| -> Ordering {
            candidates[*b]
                .score
                .total_cmp(&candidates[*a].score)
                .then(a.cmp(b))
        };

        if beam_size > 0 && self.order.len() > beam_size {
            self.order.select_nth_unstable_by(beam_size - 1, by_score);
            self.order.truncate(beam_size);
        }
        if return_sorted {
            self.order.sort_by(by_score);
        }
    }
}

fn is_within_beam(best: f64, score: f64, beam_threshold: f64) -> bool {
    best - score <= beam_threshold
}

pub(crate) fn log_add_f64(a: f64, b: f64) -> f64 {
    let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
    if lo == f64::NEG_INFINITY {
        return hi;
    }
    hi + (lo - hi).exp().ln_1p()
}
