use thiserror::Error;

/// Unified decoder errors.
#[derive(Error, Debug)]
pub enum DecoderError {
    #[error("Invalid decoder configuration: {0}")]
    InvalidConfig(String),

    #[error("Emission shape mismatch: {0}")]
    EmissionShape(String),

    #[error("Lexicon line {line}: {reason}")]
    Lexicon { line: usize, reason: String },

    #[error("Unknown token: {0}")]
    UnknownToken(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DecoderError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) | Self::Json(_) => {
                "The decoder options are invalid. Check beam sizes, thresholds and weights."
            }
            Self::EmissionShape(_) => {
                "The acoustic scores do not match the token set the decoder was built for."
            }
            Self::Lexicon { .. } | Self::UnknownToken(_) => {
                "The lexicon could not be loaded. Check that every spelling uses known tokens."
            }
            Self::Io(_) => "Could not read the lexicon or token files. Check paths and permissions.",
        }
    }
}
