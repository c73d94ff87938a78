//! Parallel inference: shared-nothing workers over sentence indices, with
//! output reordered by a small cache keyed on the next expected index.
//!
//! Grounded on the reference's `parallel_tagging`/`fill_input_queue`/
//! `process_input_queue` multiprocessing producer/consumer; reimplemented
//! with `rayon` (no locking needed beyond what `rayon` itself does, since
//! the Weight Store is read-only during inference) plus a small ordering
//! buffer rather than a `Sentinel`-terminated queue pair.

use std::collections::HashMap;

use rayon::prelude::*;

use crate::corpus::Corpus;
use crate::perceptron::Tagger;
use crate::weights::WeightStore;

/// Tags every sentence in `corpus` using up to `num_threads` rayon
/// workers (0 means let rayon pick), returning results in original
/// sentence order regardless of completion order.
pub fn tag_corpus_parallel(
    tagger: &Tagger,
    corpus: &Corpus,
    prior: Option<&WeightStore>,
    num_threads: usize,
) -> Vec<Vec<String>> {
    let indices: Vec<usize> = (0..corpus.num_sentences()).collect();

    let run = || -> Vec<(usize, Vec<String>)> {
        indices
            .par_iter()
            .map(|&s| (s, tagger.tag_sentence(corpus.sentence_words(s), prior)))
            .collect()
    };

    let mut results = if num_threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .expect("building a bounded rayon thread pool")
            .install(run)
    } else {
        run()
    };

    reorder(&mut results)
}

/// Sorts `(sentence_index, tags)` pairs produced in arbitrary completion
/// order back into sentence order. A dedicated reordering buffer (rather
/// than a plain sort) would matter for a streaming producer/consumer; here
/// every result is already in hand, so sorting is the direct equivalent.
fn reorder(results: &mut [(usize, Vec<String>)]) -> Vec<Vec<String>> {
    results.sort_by_key(|(idx, _)| *idx);
    results.iter().map(|(_, tags)| tags.clone()).collect()
}

/// Streaming variant of the reordering buffer: callers that consume
/// tagging results incrementally (e.g. writing to stdout as they arrive)
/// can feed out-of-order `(index, tags)` pairs in and drain them in order
/// as soon as the next expected index is available, mirroring the
/// reference's cache in `process_input_queue`.
#[derive(Default)]
pub struct ReorderBuffer {
    next_expected: usize,
    pending: HashMap<usize, Vec<String>>,
}

impl ReorderBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a completed sentence's result and returns every result that
    /// is now ready to be emitted in order (possibly more than one, if
    /// earlier-arriving results had been buffered waiting for this one).
    pub fn push(&mut self, index: usize, tags: Vec<String>) -> Vec<Vec<String>> {
        self.pending.insert(index, tags);
        let mut ready = Vec::new();
        while let Some(tags) = self.pending.remove(&self.next_expected) {
            ready.push(tags);
            self.next_expected += 1;
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reorder_buffer_drains_in_order_despite_arrival_order() {
        let mut buf = ReorderBuffer::new();
        assert!(buf.push(1, vec!["b".to_string()]).is_empty());
        let ready = buf.push(0, vec!["a".to_string()]);
        assert_eq!(ready, vec![vec!["a".to_string()], vec!["b".to_string()]]);
        let ready = buf.push(2, vec!["c".to_string()]);
        assert_eq!(ready, vec![vec!["c".to_string()]]);
    }

    #[test]
    fn tag_corpus_parallel_preserves_sentence_order() {
        use crate::perceptron::TrainConfig;

        let mut corpus = Corpus::default();
        for (words, tags) in [
            (["the", "cat", "sat"], ["D", "N", "V"]),
            (["a", "dog", "ran"], ["D", "N", "V"]),
        ] {
            corpus.words.extend(words.map(String::from));
            corpus.tags.extend(tags.map(String::from));
            corpus.lengths.push(3);
        }
        let config = TrainConfig::default();
        let mut tagger = Tagger::new(&config);
        tagger.fit(&corpus, &config, None);

        let sequential: Vec<Vec<String>> = (0..corpus.num_sentences())
            .map(|s| tagger.tag_sentence(corpus.sentence_words(s), None))
            .collect();
        let parallel = tag_corpus_parallel(&tagger, &corpus, None, 2);
        assert_eq!(sequential, parallel);
    }
}
