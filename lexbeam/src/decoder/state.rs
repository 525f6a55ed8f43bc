use std::sync::LazyLock;

use regex::Regex;

use crate::lexicon::{Dictionary, NodeId};

static DECODE_SPACE_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\A\s|\s\B|(\s)\b"));

/// Location of a hypothesis in the frame history. `frame` is absolute: it
/// counts every frame since `decode_begin` and is never rebased.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HypRef {
    pub frame: usize,
    pub slot: usize,
}

/// One partial decoding path. Immutable once stored in the history.
#[derive(Debug, Clone)]
pub struct Hypothesis<S> {
    pub lm_state: S,
    pub lex: NodeId,
    pub parent: Option<HypRef>,
    pub score: f64,
    pub am_score: f64,
    pub lm_score: f64,
    /// `None` only on the sentence-end frame.
    pub token: Option<usize>,
    pub word: Option<usize>,
    pub prev_blank: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeResult {
    pub score: f64,
    pub am_score: f64,
    pub lm_score: f64,
    /// One token per decoded frame, in order.
    pub tokens: Vec<usize>,
    /// Emitted word labels, in order.
    pub words: Vec<usize>,
}

impl DecodeResult {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.words.is_empty()
    }

    /// Token sequence with blanks removed and repeats collapsed.
    pub fn reduced_tokens(&self, blank: usize) -> Vec<usize> {
        let mut output = Vec::new();
        let mut last = blank;
        for &token in &self.tokens {
            if token != last && token != blank {
                output.push(token);
            }
            last = token;
        }
        output
    }

    /// Renders the reduced token sequence. Sentence-piece word markers
    /// (`▁`) become spaces.
    pub fn text(&self, tokens: &Dictionary, blank: usize) -> String {
        let pieces: Vec<String> = self
            .reduced_tokens(blank)
            .into_iter()
            .filter_map(|id| tokens.entry(id))
            .map(|t| t.replace('\u{2581}', " "))
            .collect();

        match &*DECODE_SPACE_RE {
            Ok(re) => re
                .replace_all(
                    &pieces.join(""),
                    |c: &regex::Captures| if c.get(1).is_some() { " " } else { "" },
                )
                .to_string(),
            Err(_) => pieces.join(""),
        }
    }

    pub fn word_text(&self, words: &Dictionary) -> String {
        self.words
            .iter()
            .filter_map(|&w| words.entry(w))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
