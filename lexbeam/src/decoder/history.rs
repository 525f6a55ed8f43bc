use std::collections::VecDeque;

use super::state::{DecodeResult, HypRef, Hypothesis};

/// Tokens and words of the best path that precede the oldest retained frame.
#[derive(Debug, Clone, Default)]
struct CommittedPrefix {
    tokens: Vec<usize>,
    words: Vec<usize>,
}

/// Rolling window of retained frames. Local index 0 is the oldest frame
/// still held; `base` is its absolute frame number.
#[derive(Debug)]
pub(crate) struct FrameHistory<S> {
    frames: VecDeque<Vec<Hypothesis<S>>>,
    spare: Vec<Vec<Hypothesis<S>>>,
    base: usize,
    prefix: CommittedPrefix,
    score_offset: f64,
}

impl<S> Default for FrameHistory<S> {
    fn default() -> Self {
        Self {
            frames: VecDeque::new(),
            spare: Vec::new(),
            base: 0,
            prefix: CommittedPrefix::default(),
            score_offset: 0.0,
        }
    }
}

impl<S: Clone> FrameHistory<S> {
    /// Drops every frame and starts over with `root` alone in frame 0.
    pub fn reset(&mut self, root: Hypothesis<S>) {
        while let Some(frame) = self.frames.pop_front() {
            self.recycle(frame);
        }
        self.base = 0;
        self.prefix = CommittedPrefix::default();
        self.score_offset = 0.0;

        let mut first = self.take_spare();
        first.push(root);
        self.frames.push_back(first);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Local index of the newest frame.
    pub fn current_index(&self) -> Option<usize> {
        self.frames.len().checked_sub(1)
    }

    pub fn current_abs(&self) -> Option<usize> {
        self.current_index().map(|i| i + self.base)
    }

    pub fn frame(&self, local: usize) -> &[Hypothesis<S>] {
        self.frames.get(local).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn current(&self) -> &[Hypothesis<S>] {
        self.frames.back().map(Vec::as_slice).unwrap_or_default()
    }

    pub fn get(&self, r: HypRef) -> Option<&Hypothesis<S>> {
        let local = r.frame.checked_sub(self.base)?;
        self.frames.get(local)?.get(r.slot)
    }

    pub fn is_pruned(&self) -> bool {
        self.base > 0
    }

    /// Frame 0 only holds the root until the first prune; after that it holds
    /// anchors that can be reported.
    pub fn is_reportable(&self, local: usize) -> bool {
        local < self.frames.len() && (local >= 1 || self.is_pruned())
    }

    /// Empty buffer for the next frame, reusing storage from dropped frames.
    pub fn take_spare(&mut self) -> Vec<Hypothesis<S>> {
        self.spare.pop().unwrap_or_default()
    }

    pub fn recycle(&mut self, mut frame: Vec<Hypothesis<S>>) {
        frame.clear();
        self.spare.push(frame);
    }

    /// Appends a frame and returns its absolute index.
    pub fn push_frame(&mut self, frame: Vec<Hypothesis<S>>) -> usize {
        self.frames.push_back(frame);
        self.base + self.frames.len() - 1
    }

    pub fn best_in_current(&self) -> Option<HypRef> {
        let frame = self.current_abs()?;
        let slot = best_slot(self.current())?;
        Some(HypRef { frame, slot })
    }

    /// Ancestor of the current best hypothesis exactly `look_back` frames back.
    pub fn find_best_ancestor(&self, look_back: usize) -> Option<HypRef> {
        let mut node = self.best_in_current()?;
        for _ in 0..look_back {
            node = self.get(node)?.parent?;
        }
        Some(node)
    }

    /// Walks parent links from `r` back to the root or an anchor.
    pub fn trace(&self, r: HypRef) -> DecodeResult {
        let Some(last) = self.get(r) else {
            return DecodeResult::default();
        };

        let mut tokens = Vec::new();
        let mut words = Vec::new();
        let mut cursor = Some(r);
        while let Some(at) = cursor {
            let Some(node) = self.get(at) else {
                log::warn!("Dangling parent reference at frame {} slot {}", at.frame, at.slot);
                break;
            };
            // The root's token is the start-of-utterance silence, not a decoded frame.
            if at.frame == 0 && node.parent.is_none() {
                break;
            }
            if let Some(token) = node.token {
                tokens.push(token);
            }
            if let Some(word) = node.word {
                words.push(word);
            }
            cursor = node.parent;
        }
        tokens.reverse();
        words.reverse();

        let mut full_tokens = self.prefix.tokens.clone();
        full_tokens.extend(tokens);
        let mut full_words = self.prefix.words.clone();
        full_words.extend(words);

        DecodeResult {
            score: last.score + self.score_offset,
            am_score: last.am_score,
            lm_score: last.lm_score,
            tokens: full_tokens,
            words: full_words,
        }
    }

    /// Discards frames older than the best ancestor `look_back` frames back and
    /// rebases so that ancestor's frame becomes frame 0. Returns `false`
    /// without touching anything when there is not enough history.
    pub fn prune(&mut self, look_back: usize) -> bool {
        let Some(current) = self.current_index() else {
            return false;
        };
        if current <= look_back {
            return false;
        }
        let Some(ancestor) = self.find_best_ancestor(look_back) else {
            return false;
        };
        let start = current - look_back;
        debug_assert_eq!(ancestor.frame, self.base + start);

        let committed = match self.get(ancestor).and_then(|a| a.parent) {
            Some(parent) => self.trace(parent),
            None => return false,
        };
        self.prefix = CommittedPrefix {
            tokens: committed.tokens,
            words: committed.words,
        };

        for _ in 0..start {
            if let Some(frame) = self.frames.pop_front() {
                self.recycle(frame);
            }
        }
        self.base += start;

        if let Some(first) = self.frames.front_mut() {
            for hyp in first.iter_mut() {
                hyp.parent = None;
            }
        }

        self.normalize_scores();
        log::debug!(
            "Pruned {} frames, {} retained, base now {}",
            start,
            self.frames.len(),
            self.base
        );
        true
    }

    /// Shifts every retained score so the current best is 0, keeping the
    /// shift in `score_offset` for reporting.
    fn normalize_scores(&mut self) {
        let Some(best) = self
            .current()
            .iter()
            .map(|h| h.score)
            .max_by(|a, b| a.total_cmp(b))
        else {
            return;
        };
        if !best.is_finite() {
            return;
        }
        for frame in self.frames.iter_mut() {
            for hyp in frame.iter_mut() {
                hyp.score -= best;
            }
        }
        self.score_offset += best;
    }
}

/// Slot of the highest score; the first one wins ties.
fn best_slot<S>(frame: &[Hypothesis<S>]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (slot, hyp) in frame.iter().enumerate() {
        match best {
            Some((_, score)) if hyp.score <= score => {}
            _ => best = Some((slot, hyp.score)),
        }
    }
    best.map(|(slot, _)| slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexicon::Trie;

    fn node(parent: Option<HypRef>, score: f64, token: usize, word: Option<usize>) -> Hypothesis<()> {
        Hypothesis {
            lm_state: (),
            lex: Trie::new().root(),
            parent,
            score,
            am_score: score,
            lm_score: 0.0,
            token: Some(token),
            word,
            prev_blank: false,
        }
    }

    /// Builds a single chain root -> t1 -> t2 ... with one extra sibling per frame.
    fn chain(len: usize) -> FrameHistory<()> {
        let mut history = FrameHistory::default();
        history.reset(node(None, 0.0, 0, None));
        for f in 1..=len {
            let parent = Some(HypRef { frame: f - 1, slot: 0 });
            let frame = vec![
                node(parent, f as f64, 10 + f, (f % 2 == 0).then_some(f)),
                node(parent, f as f64 - 0.5, 90, None),
            ];
            history.push_frame(frame);
        }
        history
    }

    #[test]
    fn trace_stops_at_root() {
        let history = chain(3);
        let best = history.best_in_current().unwrap();
        let result = history.trace(best);
        assert_eq!(result.tokens, vec![11, 12, 13]);
        assert_eq!(result.words, vec![2]);
        assert_eq!(result.score, 3.0);
    }

    #[test]
    fn best_ancestor_walks_exact_depth() {
        let history = chain(4);
        assert_eq!(history.find_best_ancestor(0), Some(HypRef { frame: 4, slot: 0 }));
        assert_eq!(history.find_best_ancestor(2), Some(HypRef { frame: 2, slot: 0 }));
        assert_eq!(history.find_best_ancestor(4), Some(HypRef { frame: 0, slot: 0 }));
        assert_eq!(history.find_best_ancestor(5), None);
    }

    #[test]
    fn prune_without_enough_history_is_noop() {
        let mut history = chain(1);
        assert!(!history.prune(2));
        assert!(!history.prune(1));
        assert!(!history.prune(usize::MAX));
        assert_eq!(history.len(), 2);
        assert!(!history.is_pruned());
    }

    #[test]
    fn prune_rebases_and_preserves_trace() {
        let mut history = chain(5);
        let before = history.trace(history.find_best_ancestor(2).unwrap());

        assert!(history.prune(2));
        assert_eq!(history.len(), 3);
        assert!(history.is_pruned());
        assert!(history.frame(0).iter().all(|h| h.parent.is_none()));
        assert_eq!(history.current()[0].score, 0.0);

        let after = history.trace(history.find_best_ancestor(2).unwrap());
        assert_eq!(before.tokens, after.tokens);
        assert_eq!(before.words, after.words);
        assert!((before.score - after.score).abs() < 1e-9);

        let full = history.trace(history.best_in_current().unwrap());
        assert_eq!(full.tokens, vec![11, 12, 13, 14, 15]);
        assert_eq!(full.words, vec![2, 4]);
        assert!((full.score - 5.0).abs() < 1e-9);
    }

    #[test]
    fn repeated_prunes_extend_prefix() {
        let mut history = chain(6);
        assert!(history.prune(1));
        assert!(history.prune(0));
        let full = history.trace(history.best_in_current().unwrap());
        assert_eq!(full.tokens, vec![11, 12, 13, 14, 15, 16]);
        assert_eq!(full.words, vec![2, 4, 6]);
    }

    #[test]
    fn reportable_frames() {
        let mut history = chain(3);
        assert!(!history.is_reportable(0));
        assert!(history.is_reportable(3));
        assert!(!history.is_reportable(4));
        assert!(history.prune(1));
        assert!(history.is_reportable(0));
    }
}
