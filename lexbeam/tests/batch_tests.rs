use std::sync::Arc;

use lexbeam_lib::lexicon::{Dictionary, Lexicon, SmearMode, Trie};
use lexbeam_lib::lm::ZeroLm;
use lexbeam_lib::{BatchDecoder, DecoderError, DecoderOptions, LexiconDecoder, SpecialTokens};
use ndarray::Array2;

const BLANK: usize = 0;
const SIL: usize = 1;

fn setup() -> Arc<Trie> {
    let tokens = Dictionary::from_entries(["<blk>", "|", "c", "a", "t", "r"]);
    let mut words = Dictionary::new();
    let trie = Lexicon::parse("cat c a t\ncar c a r\na a\n")
        .unwrap()
        .build_trie(&tokens, &mut words, &ZeroLm, SmearMode::Max)
        .unwrap();
    Arc::new(trie)
}

fn noisy(frames: usize, seed: u64) -> Array2<f32> {
    let mut state = seed;
    Array2::from_shape_fn((frames, 6), |_| {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        -((state >> 40) as f32 / (1u64 << 24) as f32) * 4.0
    })
}

#[test]
fn parallel_decode_matches_sequential() {
    let trie = setup();
    let options = DecoderOptions {
        beam_size: 16,
        ..Default::default()
    };
    let special = SpecialTokens::ctc(SIL, BLANK);
    let utterances: Vec<Array2<f32>> = (0..5).map(|i| noisy(6 + i, 11 + i as u64)).collect();

    let batch = BatchDecoder::new(options.clone(), Arc::clone(&trie), Arc::new(ZeroLm), special)
        .unwrap()
        .with_threads(2);
    assert_eq!(batch.threads(), 2);
    let parallel = batch.decode_all(&utterances).unwrap();

    let mut single = LexiconDecoder::new(options, trie, Arc::new(ZeroLm), special).unwrap();
    assert_eq!(parallel.len(), utterances.len());
    for (emissions, results) in utterances.iter().zip(&parallel) {
        let expected = single.decode(emissions.view()).unwrap();
        assert_eq!(results, &expected);
    }
}

#[test]
fn empty_batch_returns_nothing() {
    let trie = setup();
    let batch = BatchDecoder::new(
        DecoderOptions::default(),
        trie,
        Arc::new(ZeroLm),
        SpecialTokens::ctc(SIL, BLANK),
    )
    .unwrap();
    assert!(batch.decode_all(&[]).unwrap().is_empty());
}

#[test]
fn bad_utterance_fails_the_batch() {
    let trie = setup();
    let batch = BatchDecoder::new(
        DecoderOptions::default(),
        trie,
        Arc::new(ZeroLm),
        SpecialTokens::ctc(SIL, BLANK),
    )
    .unwrap()
    .with_threads(3);
    let utterances = vec![noisy(4, 1), Array2::zeros((4, 1)), noisy(4, 2)];
    assert!(matches!(
        batch.decode_all(&utterances),
        Err(DecoderError::EmissionShape(_))
    ));
}

#[test]
fn construction_validates_configuration() {
    let trie = setup();
    let result = BatchDecoder::new(
        DecoderOptions::default(),
        trie,
        Arc::new(ZeroLm),
        SpecialTokens::asg(SIL),
    );
    assert!(matches!(result, Err(DecoderError::InvalidConfig(_))));
}
