//! Beam search decoder with history-based recombination and early update.
//!
//! Ported from the reference's `_beam_search`: an agenda keyed by the
//! trailing `beam_history` tags (default 2) keeps only the best-scoring
//! proposal per key, is sorted by cumulative weight and truncated to
//! `beam_size` after every position, and — during training — aborts the
//! moment the gold tag sequence's prefix falls out of the beam. The
//! surviving (wrong) path at that point, not the gold path, is what the
//! caller trains against: early update corrects the mistake that actually
//! caused the beam to diverge.

use std::rc::Rc;

use crate::registry::LabelRegistry;
use crate::weights::WeightStore;

/// One candidate path through the lattice. `tags` and `features` hold only
/// this node's own tag and combined (static + latent) feature set; the
/// full sequence is recovered by walking `previous` back to the root.
#[derive(Debug)]
pub struct BeamNode {
    pub tag: Option<u32>,
    pub weight_sum: f64,
    pub features: Vec<String>,
    pub previous: Option<Rc<BeamNode>>,
}

impl BeamNode {
    fn root() -> Rc<BeamNode> {
        Rc::new(BeamNode {
            tag: None,
            weight_sum: 0.0,
            features: Vec::new(),
            previous: None,
        })
    }

    fn tag_sequence(self: &Rc<BeamNode>) -> Vec<u32> {
        let mut out = Vec::new();
        let mut node = self.clone();
        loop {
            if let Some(tag) = node.tag {
                out.push(tag);
            }
            match &node.previous {
                Some(prev) => node = prev.clone(),
                None => break,
            }
        }
        out.reverse();
        out
    }

    fn feature_sequence(self: &Rc<BeamNode>) -> Vec<Vec<String>> {
        let mut out = Vec::new();
        let mut node = self.clone();
        loop {
            if node.previous.is_some() {
                out.push(node.features.clone());
            }
            match &node.previous {
                Some(prev) => node = prev.clone(),
                None => break,
            }
        }
        out.reverse();
        out
    }
}

/// Outcome of decoding one sentence.
pub struct DecodeResult {
    pub tags: Vec<u32>,
    /// The combined static+latent feature set active at each position of
    /// `tags` — aligned index for index, used for the perceptron update.
    pub features: Vec<Vec<String>>,
    /// `false` only when training with early update and the gold path
    /// fell out of the beam before reaching the end of the sentence.
    pub completed: bool,
}

/// Runs beam search over one sentence of `length` tokens.
///
/// `static_features` holds each position's pre-extracted static feature
/// names. `words_lower` is the whole sentence, lowercased, needed by the
/// latent feature templates. `gold`, when present, triggers early update.
pub fn decode(
    length: usize,
    beam_size: usize,
    beam_history: usize,
    registry: &LabelRegistry,
    weights: &WeightStore,
    prior: Option<&WeightStore>,
    static_features: &[Vec<String>],
    words_lower: &[String],
    gold: Option<&[u32]>,
) -> DecodeResult {
    let start1 = registry.size();
    let start2 = registry.size() + 1;
    let num_labels = registry.size() as usize;

    let mut beams: Vec<Rc<BeamNode>> = vec![BeamNode::root()];
    let mut gold_tags: Vec<u32> = Vec::new();

    for i in 0..length {
        let base = weights.score_static(static_features[i].iter().map(String::as_str), prior);
        // Insertion-ordered, not a HashMap: `HashMap`'s randomized hasher would
        // make the iteration order of equal-scored candidates vary run to run,
        // and the rank below is only a stable sort over that order.
        let mut agenda: Vec<(Vec<u32>, Rc<BeamNode>)> = Vec::new();

        for beam in &beams {
            let history = beam.tag_sequence();
            let p1 = history.last().copied().unwrap_or(start1);
            let p2 = if history.len() >= 2 {
                history[history.len() - 2]
            } else {
                start2
            };
            let p1_tag = label_or_sentinel(registry, p1, start1, start2);
            let p2_tag = label_or_sentinel(registry, p2, start1, start2);
            let latent =
                crate::features::extract_latent_features(words_lower, i, i, &p1_tag, &p2_tag);
            let scores = weights.score_extend(&base, latent.iter().map(String::as_str), prior);

            let mut combined_features = static_features[i].clone();
            combined_features.extend(latent);

            for label in top_candidates(&scores, num_labels, beam_size) {
                let mut key = history.clone();
                key.push(label);
                let key_start = key.len().saturating_sub(beam_history);
                let key = key[key_start..].to_vec();

                let new_weight_sum = beam.weight_sum + scores[label as usize];
                let node = Rc::new(BeamNode {
                    tag: Some(label),
                    weight_sum: new_weight_sum,
                    features: combined_features.clone(),
                    previous: Some(beam.clone()),
                });

                match agenda.iter_mut().find(|(k, _)| *k == key) {
                    Some((_, existing)) => {
                        if new_weight_sum > existing.weight_sum {
                            *existing = node;
                        }
                    }
                    None => agenda.push((key, node)),
                }
            }
        }

        let mut ranked: Vec<Rc<BeamNode>> = agenda.into_iter().map(|(_, node)| node).collect();
        rank_beams(&mut ranked);
        ranked.truncate(beam_size);
        beams = ranked;

        if beams.is_empty() {
            break;
        }

        if let Some(gold) = gold {
            gold_tags.push(gold[i]);
            let ignore_id = registry.ignore_id();
            let gold_not_in_beam = beams
                .iter()
                .all(|b| !sequence_matches_gold(&b.tag_sequence(), &gold_tags, ignore_id));
            if gold_not_in_beam {
                // `beams` is already ranked highest-first with a deterministic
                // tie-break, so the head is the winner without a second pass.
                let best = &beams[0];
                return DecodeResult {
                    tags: best.tag_sequence(),
                    features: best.feature_sequence(),
                    completed: false,
                };
            }
        }
    }

    match beams.first() {
        Some(beam) => DecodeResult {
            tags: beam.tag_sequence(),
            features: beam.feature_sequence(),
            completed: true,
        },
        None => DecodeResult {
            tags: Vec::new(),
            features: Vec::new(),
            completed: false,
        },
    }
}

/// Sorts beams by descending weight, breaking ties on the full tag sequence
/// so that equal-scored candidates (e.g. the all-zero-weight first
/// iteration) always resolve the same way regardless of agenda build order.
fn rank_beams(beams: &mut [Rc<BeamNode>]) {
    beams.sort_by(|a, b| {
        b.weight_sum
            .partial_cmp(&a.weight_sum)
            .unwrap()
            .then_with(|| a.tag_sequence().cmp(&b.tag_sequence()))
    });
}

/// Compares a decoded prefix against the gold prefix, treating any position
/// whose gold tag is the ignore sentinel as an automatic match — the
/// decoder can never emit the sentinel itself, so a literal equality check
/// would force an early-update abort at the first ignored position of
/// every sentence that has one.
fn sequence_matches_gold(sequence: &[u32], gold: &[u32], ignore_id: Option<u32>) -> bool {
    sequence.len() == gold.len()
        && sequence
            .iter()
            .zip(gold.iter())
            .all(|(&s, &g)| Some(g) == ignore_id || s == g)
}

fn top_candidates(scores: &[f64], num_labels: usize, beam_size: usize) -> Vec<u32> {
    let mut indexed: Vec<(u32, f64)> = (0..num_labels)
        .map(|id| (id as u32, scores[id]))
        .collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then(a.0.cmp(&b.0)));
    indexed
        .into_iter()
        .take(beam_size)
        .map(|(id, _)| id)
        .collect()
}

fn label_or_sentinel(registry: &LabelRegistry, id: u32, start1: u32, start2: u32) -> String {
    if id == start1 {
        "<START-1>".to_string()
    } else if id == start2 {
        "<START-2>".to_string()
    } else {
        registry.label_of(id).unwrap_or("<UNK>").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LabelRegistry;

    fn registry_with(labels: &[&str]) -> LabelRegistry {
        let mut reg = LabelRegistry::new(None);
        reg.register(labels.iter().copied());
        reg
    }

    fn sentence_features(length: usize) -> Vec<Vec<String>> {
        (0..length).map(|i| vec![format!("tok{i}")]).collect()
    }

    #[test]
    fn decodes_to_highest_scoring_label_with_beam_of_one() {
        let registry = registry_with(&["V", "N"]);
        let mut weights = WeightStore::new(2);
        weights.apply_update(&["tok0".to_string()], 0, None, 1);
        weights.apply_update(&["tok1".to_string()], 0, None, 1);
        let words = vec!["run".to_string(), "fast".to_string()];
        let result = decode(
            2,
            1,
            2,
            &registry,
            &weights,
            None,
            &sentence_features(2),
            &words,
            None,
        );
        assert!(result.completed);
        assert_eq!(result.tags.len(), 2);
        assert_eq!(result.features.len(), 2);
    }

    #[test]
    fn early_update_returns_wrong_surviving_path_not_gold() {
        let registry = registry_with(&["V", "N"]);
        let mut weights = WeightStore::new(2);
        weights.apply_update(&["tok0".to_string()], 0, None, 1);
        weights.apply_update(&["tok1".to_string()], 0, None, 1);
        let words = vec!["run".to_string(), "fast".to_string()];
        let gold = vec![1u32, 1u32];
        let result = decode(
            2,
            1,
            2,
            &registry,
            &weights,
            None,
            &sentence_features(2),
            &words,
            Some(&gold),
        );
        assert!(!result.completed);
        assert_eq!(result.tags, vec![0]);
        assert_eq!(result.features.len(), 1);
    }

    #[test]
    fn ignored_gold_position_never_forces_an_early_abort() {
        let mut registry = LabelRegistry::new(Some("_".to_string()));
        registry.register(["V", "N", "_"]);
        let weights = WeightStore::new(2);
        let words = vec!["run".to_string(), "fast".to_string()];
        // Gold at position 0 is the ignore sentinel; whatever the decoder
        // picks there must not count as a divergence.
        let gold = vec![registry.ignore_id().unwrap(), 0u32];
        let result = decode(
            2,
            1,
            2,
            &registry,
            &weights,
            None,
            &sentence_features(2),
            &words,
            Some(&gold),
        );
        assert!(result.completed);
        assert_eq!(result.tags.len(), 2);
    }

    #[test]
    fn equal_weight_ties_resolve_to_the_lexicographically_smallest_sequence() {
        // Every candidate scores exactly zero (no weights trained yet), so
        // every beam at every step ties on weight_sum. The recombination
        // agenda used to be a HashMap, whose randomized iteration order left
        // this outcome to chance across runs; it must now always be [0, 0].
        let registry = registry_with(&["V", "N"]);
        let weights = WeightStore::new(2);
        let words = vec!["run".to_string(), "fast".to_string()];
        for _ in 0..5 {
            let result = decode(
                2,
                2,
                2,
                &registry,
                &weights,
                None,
                &sentence_features(2),
                &words,
                None,
            );
            assert_eq!(result.tags, vec![0, 0]);
        }
    }

    #[test]
    fn tie_break_prefers_smaller_label_id() {
        let registry = registry_with(&["V", "N"]);
        let weights = WeightStore::new(2);
        let words = vec!["run".to_string()];
        let result = decode(
            1,
            1,
            2,
            &registry,
            &weights,
            None,
            &sentence_features(1),
            &words,
            None,
        );
        assert_eq!(result.tags, vec![0]);
    }
}
