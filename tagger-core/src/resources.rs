//! Readers for the auxiliary resource files: lexicon, Brown clusters,
//! word2vec cluster ids, and the fine-to-coarse tag mapping.
//!
//! All four are plain line-oriented text or JSON, read once at startup and
//! held for the lifetime of a training or tagging run.

use std::collections::HashMap;
use std::io::BufRead;

use crate::error::{Result, TaggerErrorKind};

/// Lowercased word -> set of lexicon tags, as produced by `read_lexicon`.
pub type Lexicon = HashMap<String, Vec<String>>;

/// Word -> (cluster id, rounded log frequency).
pub type BrownClusters = HashMap<String, (String, i64)>;

/// Word -> a single word2vec-derived cluster id, stringified.
pub type WordToVec = HashMap<String, String>;

/// Fine tag -> coarse tag.
pub type Mapping = HashMap<String, String>;

/// Reads a tab-separated `word\ttag` lexicon, merging repeated words (and
/// case-folding them) into a deduplicated tag set per word.
pub fn read_lexicon<R: BufRead>(reader: R) -> Result<Lexicon> {
    let mut lexicon: HashMap<String, std::collections::BTreeSet<String>> = HashMap::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| TaggerErrorKind::ResourceIo.with_source(e))?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, '\t');
        let (word, tag) = match (parts.next(), parts.next()) {
            (Some(w), Some(t)) => (w, t),
            _ => {
                return Err(TaggerErrorKind::InputFormat
                    .with_message(format!("lexicon line {}: expected \"word\\ttag\"", lineno + 1)))
            }
        };
        lexicon
            .entry(word.to_lowercase())
            .or_default()
            .insert(tag.to_string());
    }
    Ok(lexicon
        .into_iter()
        .map(|(word, tags)| (word, tags.into_iter().collect()))
        .collect())
}

/// Reads a tab-separated `cluster\tword\tfrequency` Brown cluster file.
pub fn read_brown_clusters<R: BufRead>(reader: R) -> Result<BrownClusters> {
    let mut clusters = HashMap::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| TaggerErrorKind::ResourceIo.with_source(e))?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.splitn(3, '\t');
        let (cluster, word, freq) = match (fields.next(), fields.next(), fields.next()) {
            (Some(c), Some(w), Some(f)) => (c, w, f),
            _ => {
                return Err(TaggerErrorKind::InputFormat.with_message(format!(
                    "brown cluster line {}: expected \"cluster\\tword\\tfreq\"",
                    lineno + 1
                )))
            }
        };
        let freq: f64 = freq
            .parse()
            .map_err(|e| TaggerErrorKind::InputFormat.with_source(e))?;
        let logfreq = freq.ln().round() as i64;
        clusters.insert(word.to_string(), (cluster.to_string(), logfreq));
    }
    Ok(clusters)
}

/// Reads a tab-separated `word\tcluster` word2vec-cluster file.
pub fn read_word_to_vec<R: BufRead>(reader: R) -> Result<WordToVec> {
    let mut map = HashMap::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| TaggerErrorKind::ResourceIo.with_source(e))?;
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.splitn(2, '\t');
        let (word, cluster) = match (fields.next(), fields.next()) {
            (Some(w), Some(c)) => (w, c),
            _ => {
                return Err(TaggerErrorKind::InputFormat.with_message(format!(
                    "word2vec cluster line {}: expected \"word\\tcluster\"",
                    lineno + 1
                )))
            }
        };
        map.insert(word.to_string(), cluster.to_string());
    }
    Ok(map)
}

/// Reads the fine-to-coarse tag mapping from JSON (`{"fine": "coarse", ...}`).
pub fn read_mapping<R: BufRead>(mut reader: R) -> Result<Mapping> {
    let mut contents = String::new();
    std::io::Read::read_to_string(&mut reader, &mut contents)
        .map_err(|e| TaggerErrorKind::ResourceIo.with_source(e))?;
    serde_json::from_str(&contents).map_err(|e| TaggerErrorKind::InputFormat.with_source(e))
}
