use std::sync::Arc;
use std::thread;
use std::time::Instant;

use ndarray::Array2;
use num_cpus::get_physical;

use crate::decoder::{DecodeResult, DecoderOptions, LexiconDecoder, SpecialTokens};
use crate::error::DecoderError;
use crate::lexicon::Trie;
use crate::lm::LanguageModel;

const THREAD_ENV: &str = "LEXBEAM_THREADS";

fn resolve_thread_count() -> usize {
    std::env::var(THREAD_ENV)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or_else(get_physical)
        .max(1)
}

/// Decodes independent utterances in parallel, one [`LexiconDecoder`] per
/// worker thread.
pub struct BatchDecoder<L: LanguageModel> {
    options: DecoderOptions,
    trie: Arc<Trie>,
    lm: Arc<L>,
    special: SpecialTokens,
    transitions: Option<Array2<f32>>,
    threads: usize,
}

impl<L: LanguageModel> BatchDecoder<L> {
    pub fn new(
        options: DecoderOptions,
        trie: Arc<Trie>,
        lm: Arc<L>,
        special: SpecialTokens,
    ) -> Result<Self, DecoderError> {
        let batch = Self {
            options,
            trie,
            lm,
            special,
            transitions: None,
            threads: resolve_thread_count(),
        };
        // Surface configuration errors before any worker starts.
        batch.build_decoder()?;
        Ok(batch)
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn with_transitions(mut self, transitions: Array2<f32>) -> Result<Self, DecoderError> {
        self.transitions = Some(transitions);
        self.build_decoder()?;
        Ok(self)
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    fn build_decoder(&self) -> Result<LexiconDecoder<L>, DecoderError> {
        let decoder = LexiconDecoder::new(
            self.options.clone(),
            Arc::clone(&self.trie),
            Arc::clone(&self.lm),
            self.special,
        )?;
        match &self.transitions {
            Some(t) => decoder.with_transitions(t.clone()),
            None => Ok(decoder),
        }
    }

    /// Returns, per utterance and in input order, every final hypothesis
    /// best first.
    pub fn decode_all(
        &self,
        utterances: &[Array2<f32>],
    ) -> Result<Vec<Vec<DecodeResult>>, DecoderError> {
        if utterances.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let workers = self.threads.min(utterances.len());

        let per_worker: Vec<Vec<(usize, Result<Vec<DecodeResult>, DecoderError>)>> =
            thread::scope(|scope| {
                let handles: Vec<_> = (0..workers)
                    .map(|worker| {
                        scope.spawn(move || {
                            let mut decoder = match self.build_decoder() {
                                Ok(d) => d,
                                Err(e) => return vec![(worker, Err(e))],
                            };
                            (worker..utterances.len())
                                .step_by(workers)
                                .map(|idx| (idx, decoder.decode(utterances[idx].view())))
                                .collect()
                        })
                    })
                    .collect();

                handles
                    .into_iter()
                    .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
                    .collect()
            });

        let mut results: Vec<Option<Vec<DecodeResult>>> = vec![None; utterances.len()];
        for (idx, result) in per_worker.into_iter().flatten() {
            results[idx] = Some(result?);
        }

        log::debug!(
            "Batch decode completed in {:?} (utterances: {}, workers: {})",
            start.elapsed(),
            utterances.len(),
            workers
        );
        Ok(results.into_iter().map(Option::unwrap_or_default).collect())
    }
}
