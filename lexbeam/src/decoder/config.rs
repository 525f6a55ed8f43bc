use serde::{Deserialize, Serialize};

use crate::error::DecoderError;

const ENV_PREFIX: &str = "LEXBEAM_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CriterionType {
    /// Blank token, repeated tokens collapse unless separated by blank.
    #[default]
    Ctc,
    /// No blank; token-to-token transition scores are added every frame.
    Asg,
}

/// Search options for [`super::LexiconDecoder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderOptions {
    /// Maximum number of hypotheses kept per frame.
    pub beam_size: usize,
    /// Maximum number of tokens tried per frame.
    pub beam_size_token: usize,
    /// Hypotheses scoring more than this below the frame best are dropped.
    pub beam_threshold: f64,
    pub lm_weight: f64,
    pub word_score: f64,
    /// Unknown-word bonus. Negative infinity (or `null` in JSON) disables
    /// unknown words.
    #[serde(deserialize_with = "deserialize_unk_score")]
    pub unk_score: f64,
    pub sil_score: f64,
    /// Merge equivalent hypotheses with log-add instead of max.
    pub log_add: bool,
    pub criterion: CriterionType,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self {
            beam_size: 500,
            beam_size_token: 250,
            beam_threshold: 25.0,
            lm_weight: 1.0,
            word_score: 0.0,
            unk_score: f64::NEG_INFINITY,
            sil_score: 0.0,
            log_add: false,
            criterion: CriterionType::Ctc,
        }
    }
}

fn deserialize_unk_score<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NEG_INFINITY))
}

impl DecoderOptions {
    pub fn from_env() -> Self {
        let mut options = Self::default();
        options.apply_env_overrides(ENV_PREFIX);
        options
    }

    pub fn from_json_str(json: &str) -> Result<Self, DecoderError> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    fn apply_env_overrides(&mut self, prefix: &str) {
        let parse_env = |suffix: &str| std::env::var(format!("{prefix}{suffix}")).ok();
        let apply = |suffix: &str, target: &mut f64| {
            if let Some(v) = parse_env(suffix).and_then(|s| s.parse().ok()) {
                *target = v;
            }
        };

        apply("BEAM_THRESHOLD", &mut self.beam_threshold);
        apply("LM_WEIGHT", &mut self.lm_weight);
        apply("WORD_SCORE", &mut self.word_score);
        apply("UNK_SCORE", &mut self.unk_score);
        apply("SIL_SCORE", &mut self.sil_score);

        if let Some(v) = parse_env("BEAM_SIZE").and_then(|s| s.parse().ok()) {
            self.beam_size = v;
        }
        if let Some(v) = parse_env("BEAM_SIZE_TOKEN").and_then(|s| s.parse().ok()) {
            self.beam_size_token = v;
        }
        if let Some(v) = parse_env("LOG_ADD").and_then(|s| s.parse().ok()) {
            self.log_add = v;
        }
        if let Some(v) = parse_env("CRITERION") {
            match v.trim().to_lowercase().as_str() {
                "ctc" => self.criterion = CriterionType::Ctc,
                "asg" => self.criterion = CriterionType::Asg,
                other => log::warn!("Ignoring unknown {prefix}CRITERION value '{other}'"),
            }
        }
    }

    pub fn validate(&self) -> Result<(), DecoderError> {
        if self.beam_size == 0 {
            return Err(DecoderError::InvalidConfig(
                "beam_size must be positive".to_string(),
            ));
        }
        if self.beam_size_token == 0 {
            return Err(DecoderError::InvalidConfig(
                "beam_size_token must be positive".to_string(),
            ));
        }
        if !self.beam_threshold.is_finite() || self.beam_threshold < 0.0 {
            return Err(DecoderError::InvalidConfig(format!(
                "beam_threshold must be finite and non-negative, got {}",
                self.beam_threshold
            )));
        }
        for (name, value) in [
            ("lm_weight", self.lm_weight),
            ("word_score", self.word_score),
            ("sil_score", self.sil_score),
        ] {
            if !value.is_finite() {
                return Err(DecoderError::InvalidConfig(format!(
                    "{name} must be finite, got {value}"
                )));
            }
        }
        if self.unk_score.is_nan() || self.unk_score == f64::INFINITY {
            return Err(DecoderError::InvalidConfig(format!(
                "unk_score must be finite or negative infinity, got {}",
                self.unk_score
            )));
        }
        Ok(())
    }

    pub(crate) fn unk_enabled(&self) -> bool {
        self.unk_score > f64::NEG_INFINITY
    }
}
