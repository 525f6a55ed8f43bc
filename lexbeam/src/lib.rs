pub mod batch;
pub mod decoder;
pub mod error;
pub mod lexicon;
pub mod lm;

pub use batch::BatchDecoder;
pub use decoder::{
    CriterionType, DecodePhase, DecodeResult, DecoderOptions, HypRef, Hypothesis,
    LexiconDecoder, SpecialTokens,
};
pub use error::DecoderError;
