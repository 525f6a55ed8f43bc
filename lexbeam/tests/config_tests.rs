use lexbeam_lib::{CriterionType, DecoderError, DecoderOptions};

#[test]
fn defaults_are_valid() {
    let options = DecoderOptions::default();
    assert_eq!(options.beam_size, 500);
    assert_eq!(options.beam_size_token, 250);
    assert_eq!(options.beam_threshold, 25.0);
    assert_eq!(options.unk_score, f64::NEG_INFINITY);
    assert_eq!(options.criterion, CriterionType::Ctc);
    assert!(options.validate().is_ok());
}

#[test]
fn partial_json_keeps_defaults() {
    let options = DecoderOptions::from_json_str(
        r#"{"beam_size": 8, "lm_weight": 0.5, "criterion": "asg", "unk_score": null}"#,
    )
    .unwrap();
    assert_eq!(options.beam_size, 8);
    assert_eq!(options.lm_weight, 0.5);
    assert_eq!(options.criterion, CriterionType::Asg);
    assert_eq!(options.unk_score, f64::NEG_INFINITY);
    assert_eq!(options.beam_size_token, 250);
}

#[test]
fn json_unk_score_enables_unknown_words() {
    let options = DecoderOptions::from_json_str(r#"{"unk_score": -3.5}"#).unwrap();
    assert_eq!(options.unk_score, -3.5);
}

#[test]
fn invalid_json_options_are_rejected() {
    assert!(matches!(
        DecoderOptions::from_json_str(r#"{"beam_size": 0}"#),
        Err(DecoderError::InvalidConfig(_))
    ));
    assert!(matches!(
        DecoderOptions::from_json_str(r#"{"beam_threshold": -1.0}"#),
        Err(DecoderError::InvalidConfig(_))
    ));
    assert!(matches!(
        DecoderOptions::from_json_str(r#"{"criterion": "hmm"}"#),
        Err(DecoderError::Json(_))
    ));
}

#[test]
fn non_finite_weights_fail_validation() {
    let options = DecoderOptions {
        word_score: f64::NAN,
        ..Default::default()
    };
    assert!(options.validate().is_err());

    let options = DecoderOptions {
        unk_score: f64::INFINITY,
        ..Default::default()
    };
    assert!(options.validate().is_err());
}

#[test]
fn user_messages_group_error_kinds() {
    let config = DecoderError::InvalidConfig("x".to_string());
    let shape = DecoderError::EmissionShape("x".to_string());
    let lexicon = DecoderError::Lexicon {
        line: 3,
        reason: "x".to_string(),
    };
    let token = DecoderError::UnknownToken("x".to_string());

    assert_ne!(config.user_message(), shape.user_message());
    assert_eq!(lexicon.user_message(), token.user_message());
    assert_eq!(lexicon.to_string(), "Lexicon line 3: x");
}
