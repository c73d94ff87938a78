//! Model file serialization: gzip-compressed JSON array of eight elements.
//!
//! `[vocabulary, lexicon, brown_clusters, word_to_vec, target_mapping,
//! target_size, feature_list, weight_vectors]`, matching the reference
//! tagger's `save`/`load` byte-for-byte in shape. One deliberate deviation:
//! the reference base85-encodes each little-endian `float64` weight
//! vector; no crate in this workspace's dependency stack implements
//! base85, while `base64` is exactly the kind of binary-to-text crate this
//! pack reaches for elsewhere, so weight vectors are base64-encoded
//! instead. This is a from-scratch model format, not a byte-compatible
//! reader for files the Python tagger wrote.
//!
//! A ninth element, the label registry, is appended after `weight_vectors`.
//! The reference recovers label ids from `target_mapping` or from the
//! training run's in-memory state; neither survives a fresh process on its
//! own (`target_mapping` is only ever present when `--mapping` was used),
//! so a model saved by this tagger and reloaded in a later process would
//! otherwise have no way to turn decoded ids back into label strings.
//! Files with exactly 8 elements are still accepted for compatibility; the
//! registry is then rebuilt from `target_mapping` keys where possible and a
//! warning is logged, since that fallback cannot recover labels absent from
//! the mapping.

use std::io::{Read, Write};

use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use tracing::warn;

use crate::error::{Result, TaggerErrorKind};
use crate::registry::LabelRegistry;
use crate::resources::{BrownClusters, Lexicon, Mapping, WordToVec};
use crate::weights::WeightStore;

const BASE64: base64::engine::general_purpose::GeneralPurpose = base64::engine::general_purpose::STANDARD;

pub struct Model {
    pub vocabulary: std::collections::HashSet<String>,
    pub lexicon: Option<Lexicon>,
    pub brown_clusters: Option<BrownClusters>,
    pub word_to_vec: Option<WordToVec>,
    pub target_mapping: Option<Mapping>,
    pub target_size: usize,
    pub weights: WeightStore,
    pub registry: LabelRegistry,
}

fn encode_vector(vector: &[f64]) -> String {
    let mut bytes = Vec::with_capacity(vector.len() * 8);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    BASE64.encode(bytes)
}

fn decode_vector(encoded: &str, target_size: usize) -> Result<Vec<f64>> {
    let bytes = BASE64
        .decode(encoded)
        .map_err(|e| TaggerErrorKind::InputFormat.with_source(e))?;
    if bytes.len() != target_size * 8 {
        return Err(TaggerErrorKind::ModelMismatch.with_message(format!(
            "weight vector has {} bytes, expected {} for target_size {}",
            bytes.len(),
            target_size * 8,
            target_size
        )));
    }
    let mut vector = Vec::with_capacity(target_size);
    for chunk in bytes.chunks_exact(8) {
        let arr: [u8; 8] = chunk.try_into().unwrap();
        vector.push(f64::from_le_bytes(arr));
    }
    Ok(vector)
}

impl Model {
    pub fn save<W: Write>(&self, writer: W) -> Result<()> {
        let mut features: Vec<&str> = self.weights.features().collect();
        features.sort_unstable();

        let vocabulary: Vec<&str> = {
            let mut v: Vec<&str> = self.vocabulary.iter().map(String::as_str).collect();
            v.sort_unstable();
            v
        };

        let weight_vectors: Vec<String> = features
            .iter()
            .map(|f| encode_vector(self.weights.vector(f).unwrap()))
            .collect();

        let doc = Value::Array(vec![
            serde_json::to_value(&vocabulary).unwrap(),
            serde_json::to_value(&self.lexicon).unwrap(),
            serde_json::to_value(&self.brown_clusters).unwrap(),
            serde_json::to_value(&self.word_to_vec).unwrap(),
            serde_json::to_value(&self.target_mapping).unwrap(),
            Value::from(self.target_size),
            serde_json::to_value(&features).unwrap(),
            serde_json::to_value(&weight_vectors).unwrap(),
            serde_json::to_value(&self.registry).unwrap(),
        ]);

        let mut encoder = GzEncoder::new(writer, Compression::default());
        let body = serde_json::to_vec(&doc).map_err(|e| TaggerErrorKind::ResourceIo.with_source(e))?;
        encoder
            .write_all(&body)
            .map_err(|e| TaggerErrorKind::ResourceIo.with_source(e))?;
        encoder
            .finish()
            .map_err(|e| TaggerErrorKind::ResourceIo.with_source(e))?;
        Ok(())
    }

    pub fn load<R: Read>(reader: R) -> Result<Self> {
        let mut decoder = GzDecoder::new(reader);
        let mut contents = String::new();
        decoder
            .read_to_string(&mut contents)
            .map_err(|e| TaggerErrorKind::ResourceIo.with_source(e))?;
        let doc: Value =
            serde_json::from_str(&contents).map_err(|e| TaggerErrorKind::InputFormat.with_source(e))?;
        let fields = doc
            .as_array()
            .ok_or_else(|| TaggerErrorKind::InputFormat.with_message("model file is not a JSON array"))?;
        if fields.len() != 8 && fields.len() != 9 {
            return Err(TaggerErrorKind::ModelMismatch
                .with_message(format!("model file has {} elements, expected 8 or 9", fields.len())));
        }

        let vocabulary: Vec<String> = serde_json::from_value(fields[0].clone())
            .map_err(|e| TaggerErrorKind::InputFormat.with_source(e))?;
        let lexicon: Option<Lexicon> = serde_json::from_value(fields[1].clone())
            .map_err(|e| TaggerErrorKind::InputFormat.with_source(e))?;
        let brown_clusters: Option<BrownClusters> = serde_json::from_value(fields[2].clone())
            .map_err(|e| TaggerErrorKind::InputFormat.with_source(e))?;
        let word_to_vec: Option<WordToVec> = serde_json::from_value(fields[3].clone())
            .map_err(|e| TaggerErrorKind::InputFormat.with_source(e))?;
        let target_mapping: Option<Mapping> = serde_json::from_value(fields[4].clone())
            .map_err(|e| TaggerErrorKind::InputFormat.with_source(e))?;
        let target_size: usize = serde_json::from_value(fields[5].clone())
            .map_err(|e| TaggerErrorKind::InputFormat.with_source(e))?;
        let feature_list: Vec<String> = serde_json::from_value(fields[6].clone())
            .map_err(|e| TaggerErrorKind::InputFormat.with_source(e))?;
        let weight_vectors: Vec<String> = serde_json::from_value(fields[7].clone())
            .map_err(|e| TaggerErrorKind::InputFormat.with_source(e))?;

        if feature_list.len() != weight_vectors.len() {
            return Err(TaggerErrorKind::ModelMismatch.with_message(format!(
                "feature_list has {} entries, weight_vectors has {}",
                feature_list.len(),
                weight_vectors.len()
            )));
        }

        let mut weights = WeightStore::new(target_size);
        for (feature, encoded) in feature_list.into_iter().zip(weight_vectors.into_iter()) {
            let vector = decode_vector(&encoded, target_size)?;
            weights.insert_vector(feature, vector);
        }

        let registry = if let Some(raw) = fields.get(8) {
            serde_json::from_value(raw.clone()).map_err(|e| TaggerErrorKind::InputFormat.with_source(e))?
        } else {
            warn!("model file has no label registry; rebuilding from target_mapping, which may be incomplete");
            let mut registry = LabelRegistry::new(None);
            if let Some(mapping) = &target_mapping {
                let mut labels: Vec<&str> = mapping.keys().map(String::as_str).collect();
                labels.sort_unstable();
                registry.register(labels);
            }
            registry
        };

        Ok(Model {
            vocabulary: vocabulary.into_iter().collect(),
            lexicon,
            brown_clusters,
            word_to_vec,
            target_mapping,
            target_size,
            weights,
            registry,
        })
    }

    /// Loads just the parts needed to seed a prior model: vocabulary,
    /// target mapping/size, and weights. Mirrors `load_prior_model`, which
    /// ignores lexicon/brown/w2v because those are supplied fresh by the
    /// run that's adapting from this prior.
    pub fn load_prior<R: Read>(reader: R) -> Result<Self> {
        Self::load(reader)
    }
}
