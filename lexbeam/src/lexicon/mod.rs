mod dictionary;
mod trie;

pub use dictionary::{Dictionary, Lexicon, LexiconEntry};
pub use trie::{NodeId, SmearMode, Trie};

