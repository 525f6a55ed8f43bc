use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::DecoderError;
use crate::lexicon::Dictionary;

use super::LanguageModel;

pub const SENTENCE_BEGIN: &str = "<s>";
pub const SENTENCE_END: &str = "</s>";
pub const UNKNOWN_WORD: &str = "<unk>";

const DEFAULT_UNK_SCORE: f32 = -100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BigramState {
    /// No left context.
    Null,
    Word(usize),
}

#[derive(Debug, Clone, Copy)]
struct Unigram {
    prob: f32,
    backoff: f32,
}

/// In-memory back-off bigram model keyed by word-dictionary indices.
#[derive(Debug, Clone)]
pub struct BigramLm {
    unigrams: HashMap<usize, Unigram>,
    bigrams: HashMap<(usize, usize), f32>,
    bos: Option<usize>,
    eos: Option<usize>,
    unk_score: f32,
}

impl Default for BigramLm {
    fn default() -> Self {
        Self::new()
    }
}

impl BigramLm {
    pub fn new() -> Self {
        Self {
            unigrams: HashMap::new(),
            bigrams: HashMap::new(),
            bos: None,
            eos: None,
            unk_score: DEFAULT_UNK_SCORE,
        }
    }

    pub fn with_sentence_markers(mut self, bos: usize, eos: usize) -> Self {
        self.bos = Some(bos);
        self.eos = Some(eos);
        self
    }

    pub fn with_unk_score(mut self, score: f32) -> Self {
        self.unk_score = score;
        self
    }

    pub fn add_unigram(&mut self, word: usize, prob: f32, backoff: f32) {
        self.unigrams.insert(word, Unigram { prob, backoff });
    }

    pub fn add_bigram(&mut self, prev: usize, word: usize, prob: f32) {
        self.bigrams.insert((prev, word), prob);
    }

    pub fn n_unigrams(&self) -> usize {
        self.unigrams.len()
    }

    pub fn n_bigrams(&self) -> usize {
        self.bigrams.len()
    }

    pub fn load_arpa<P: AsRef<Path>>(path: P, words: &mut Dictionary) -> Result<Self, DecoderError> {
        let content = fs::read_to_string(path)?;
        Self::parse_arpa(&content, words)
    }

    /// Reads the unigram and bigram sections of an ARPA file. Higher orders
    /// are skipped. Words are registered in `words` as they appear.
    pub fn parse_arpa(content: &str, words: &mut Dictionary) -> Result<Self, DecoderError> {
        let mut lm = Self::new();
        let mut order = 0usize;

        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.starts_with('\\') {
                order = match line {
                    "\\1-grams:" => 1,
                    "\\2-grams:" => 2,
                    "\\data\\" | "\\end\\" => 0,
                    _ => usize::MAX,
                };
                continue;
            }
            if order == 0 || order == usize::MAX {
                continue;
            }

            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < order + 1 {
                return Err(DecoderError::Lexicon {
                    line: line_no + 1,
                    reason: format!("expected {order}-gram entry"),
                });
            }
            let prob: f32 = fields[0].parse().map_err(|_| DecoderError::Lexicon {
                line: line_no + 1,
                reason: format!("invalid probability '{}'", fields[0]),
            })?;

            if order == 1 {
                let backoff = match fields.get(2) {
                    Some(raw) => raw.parse().map_err(|_| DecoderError::Lexicon {
                        line: line_no + 1,
                        reason: format!("invalid backoff '{raw}'"),
                    })?,
                    None => 0.0,
                };
                let word = words.add_entry(fields[1]);
                lm.add_unigram(word, prob, backoff);
            } else {
                let prev = words.add_entry(fields[1]);
                let word = words.add_entry(fields[2]);
                lm.add_bigram(prev, word, prob);
            }
        }

        lm.bos = words.index_of(SENTENCE_BEGIN);
        lm.eos = words.index_of(SENTENCE_END);
        if let Some(unk) = words.index_of(UNKNOWN_WORD).and_then(|u| lm.unigrams.get(&u)) {
            lm.unk_score = unk.prob;
        }

        log::info!(
            "Loaded bigram LM: {} unigrams, {} bigrams",
            lm.unigrams.len(),
            lm.bigrams.len()
        );
        Ok(lm)
    }

    fn unigram_prob(&self, word: usize) -> f32 {
        self.unigrams
            .get(&word)
            .map(|u| u.prob)
            .unwrap_or(self.unk_score)
    }

    fn transition(&self, state: &BigramState, word: usize) -> f32 {
        match *state {
            BigramState::Null => self.unigram_prob(word),
            BigramState::Word(prev) => match self.bigrams.get(&(prev, word)) {
                Some(&prob) => prob,
                None => {
                    let backoff = self.unigrams.get(&prev).map(|u| u.backoff).unwrap_or(0.0);
                    backoff + self.unigram_prob(word)
                }
            },
        }
    }
}

impl LanguageModel for BigramLm {
    type State = BigramState;

    fn start(&self, start_with_nothing: bool) -> Self::State {
        match self.bos {
            Some(bos) if !start_with_nothing => BigramState::Word(bos),
            _ => BigramState::Null,
        }
    }

    fn score(&self, state: &Self::State, word: usize) -> (Self::State, f32) {
        (BigramState::Word(word), self.transition(state, word))
    }

    fn finish(&self, state: &Self::State) -> (Self::State, f32) {
        match self.eos {
            Some(eos) => (BigramState::Word(eos), self.transition(state, eos)),
            None => (*state, 0.0),
        }
    }
}
