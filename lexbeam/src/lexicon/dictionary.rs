use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::DecoderError;
use crate::lm::LanguageModel;

use super::trie::{SmearMode, Trie};

static LEXICON_LINE_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^(\S+)\s+(\S.*)$"));

/// Bidirectional string <-> index table used for both tokens and words.
#[derive(Debug, Clone, Default)]
pub struct Dictionary {
    entries: Vec<String>,
    index: HashMap<String, usize>,
}

impl Dictionary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut dict = Self::new();
        for entry in entries {
            dict.add_entry(entry.as_ref());
        }
        dict
    }

    /// Returns the index of `entry`, inserting it at the end if it is new.
    pub fn add_entry(&mut self, entry: &str) -> usize {
        if let Some(&idx) = self.index.get(entry) {
            return idx;
        }
        let idx = self.entries.len();
        self.entries.push(entry.to_string());
        self.index.insert(entry.to_string(), idx);
        idx
    }

    pub fn index_of(&self, entry: &str) -> Option<usize> {
        self.index.get(entry).copied()
    }

    pub fn entry(&self, idx: usize) -> Option<&str> {
        self.entries.get(idx).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Loads a token table. Each line is either `token` (index = line order)
    /// or `token index`.
    pub fn load_tokens<P: AsRef<Path>>(path: P) -> Result<Self, DecoderError> {
        let content = fs::read_to_string(path)?;
        Self::parse_tokens(&content)
    }

    pub fn parse_tokens(content: &str) -> Result<Self, DecoderError> {
        let mut entries: Vec<(String, usize)> = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let mut parts = line.split_whitespace();
            let Some(token) = parts.next() else {
                continue;
            };
            let idx = match parts.next() {
                Some(raw) => raw.parse().map_err(|_| DecoderError::Lexicon {
                    line: line_no + 1,
                    reason: format!("invalid token index '{raw}'"),
                })?,
                None => entries.len(),
            };
            entries.push((token.to_string(), idx));
        }

        let size = entries.iter().map(|(_, i)| *i + 1).max().unwrap_or(0);
        let mut slots = vec![String::new(); size];
        for (token, idx) in entries {
            slots[idx] = token;
        }

        let mut dict = Self::new();
        for (idx, token) in slots.into_iter().enumerate() {
            if token.is_empty() {
                return Err(DecoderError::Lexicon {
                    line: 0,
                    reason: format!("token index {idx} is not assigned"),
                });
            }
            if dict.add_entry(&token) != idx {
                return Err(DecoderError::Lexicon {
                    line: 0,
                    reason: format!("duplicate token '{token}'"),
                });
            }
        }
        log::debug!("Loaded {} tokens", dict.len());
        Ok(dict)
    }
}

/// One lexicon word with all of its spellings, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct LexiconEntry {
    pub word: String,
    pub spellings: Vec<Vec<String>>,
}

/// Word -> spellings table read from a `word  t1 t2 t3` file.
#[derive(Debug, Clone, Default)]
pub struct Lexicon {
    entries: Vec<LexiconEntry>,
    index: HashMap<String, usize>,
}

impl Lexicon {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DecoderError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, DecoderError> {
        let re = LEXICON_LINE_RE
            .as_ref()
            .map_err(|e| DecoderError::InvalidConfig(e.to_string()))?;

        let mut lexicon = Self::default();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let caps = re.captures(line).ok_or_else(|| DecoderError::Lexicon {
                line: line_no + 1,
                reason: "expected a word followed by its spelling".to_string(),
            })?;
            let spelling: Vec<String> = caps[2].split_whitespace().map(String::from).collect();
            lexicon.add(&caps[1], spelling);
        }
        log::debug!("Parsed lexicon with {} words", lexicon.len());
        Ok(lexicon)
    }

    pub fn add(&mut self, word: &str, spelling: Vec<String>) {
        let idx = match self.index.get(word) {
            Some(&idx) => idx,
            None => {
                self.entries.push(LexiconEntry {
                    word: word.to_string(),
                    spellings: Vec::new(),
                });
                self.index.insert(word.to_string(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        let spellings = &mut self.entries[idx].spellings;
        if !spellings.contains(&spelling) {
            spellings.push(spelling);
        }
    }

    pub fn entries(&self) -> &[LexiconEntry] {
        &self.entries
    }

    pub fn get(&self, word: &str) -> Option<&LexiconEntry> {
        self.index.get(word).map(|&idx| &self.entries[idx])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Builds the search trie. Every word is registered in `words`, scored by
    /// the LM from its start state, and inserted once per spelling.
    pub fn build_trie<L: LanguageModel>(
        &self,
        tokens: &Dictionary,
        words: &mut Dictionary,
        lm: &L,
        smear: SmearMode,
    ) -> Result<Trie, DecoderError> {
        let start = lm.start(false);
        let mut trie = Trie::new();
        for entry in &self.entries {
            let label = words.add_entry(&entry.word);
            let (_, score) = lm.score(&start, label);
            for spelling in &entry.spellings {
                let ids = spelling
                    .iter()
                    .map(|t| {
                        tokens.index_of(t).ok_or_else(|| {
                            DecoderError::UnknownToken(format!("'{t}' in spelling of '{}'", entry.word))
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                trie.insert(&ids, label, score);
            }
        }
        trie.smear(smear);
        log::info!(
            "Built lexicon trie: {} words, {} nodes, at most {} labels per node",
            self.entries.len(),
            trie.len(),
            trie.max_labels()
        );
        Ok(trie)
    }
}
