//! Weight store: sparse `feature -> dense vector over labels`, plus the
//! parallel accumulator used for lazy averaging (Freund & Schapire 1999;
//! Collins 2002).
//!
//! A feature absent from the map scores zero everywhere; this is what
//! makes the dense-inner/sparse-outer layout cheap (§9 "Sparse-over-dense
//! structure"): scoring a position is one summed-vector pass over the
//! handful of features that fired, not a scan over every known feature.

use std::collections::HashMap;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct WeightStore {
    w: HashMap<String, Vec<f64>>,
    c: HashMap<String, Vec<f64>>,
    target_size: usize,
}

impl WeightStore {
    pub fn new(target_size: usize) -> Self {
        Self {
            w: HashMap::new(),
            c: HashMap::new(),
            target_size,
        }
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    /// Extends every existing vector with trailing zeros when the label
    /// space has grown.
    pub fn grow(&mut self, new_target_size: usize) {
        if new_target_size <= self.target_size {
            return;
        }
        for v in self.w.values_mut() {
            v.resize(new_target_size, 0.0);
        }
        for v in self.c.values_mut() {
            v.resize(new_target_size, 0.0);
        }
        self.target_size = new_target_size;
    }

    fn zero_vec(&self) -> Vec<f64> {
        vec![0.0; self.target_size]
    }

    /// Sum over `features` of `W[f]`, plus `prior[f]` when a prior model is
    /// supplied. Missing features contribute zero.
    pub fn score_static<'a, I>(&self, features: I, prior: Option<&WeightStore>) -> Vec<f64>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut total = self.zero_vec();
        for feat in features {
            if let Some(v) = self.w.get(feat) {
                add_into(&mut total, v);
            }
            if let Some(p) = prior {
                if let Some(v) = p.w.get(feat) {
                    add_into(&mut total, v);
                }
            }
        }
        total
    }

    /// Copy of `static_vec` plus the sum over `latent_features`.
    pub fn score_extend<'a, I>(
        &self,
        static_vec: &[f64],
        latent_features: I,
        prior: Option<&WeightStore>,
    ) -> Vec<f64>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut total = static_vec.to_vec();
        for feat in latent_features {
            if let Some(v) = self.w.get(feat) {
                add_into(&mut total, v);
            }
            if let Some(p) = prior {
                if let Some(v) = p.w.get(feat) {
                    add_into(&mut total, v);
                }
            }
        }
        total
    }

    /// Structured perceptron update: promotes `true_id`, demotes `pred_id`
    /// (if any — a null prediction at an empty-candidate slot only touches
    /// the true side), across every feature in `feature_set`.
    pub fn apply_update(
        &mut self,
        feature_set: &[String],
        true_id: u32,
        pred_id: Option<u32>,
        counter: u64,
    ) {
        let target_size = self.target_size;
        for feat in feature_set {
            let w = self
                .w
                .entry(feat.clone())
                .or_insert_with(|| vec![0.0; target_size]);
            let c = self
                .c
                .entry(feat.clone())
                .or_insert_with(|| vec![0.0; target_size]);
            w[true_id as usize] += 1.0;
            c[true_id as usize] += counter as f64;
            if let Some(pred_id) = pred_id {
                w[pred_id as usize] -= 1.0;
                c[pred_id as usize] -= counter as f64;
            }
        }
    }

    /// `W <- W - C / total_counter`, then folds in `prior` if present.
    /// Drops `C` afterwards: averaging is a one-way trip.
    pub fn average(&mut self, total_counter: u64, prior: Option<&WeightStore>) {
        if total_counter > 0 {
            let counter = total_counter as f64;
            for (feat, w) in self.w.iter_mut() {
                if let Some(c) = self.c.get(feat) {
                    for (wi, ci) in w.iter_mut().zip(c.iter()) {
                        *wi -= ci / counter;
                    }
                }
            }
        }
        self.c.clear();
        if let Some(prior) = prior {
            for (feat, pv) in prior.w.iter() {
                let entry = self
                    .w
                    .entry(feat.clone())
                    .or_insert_with(|| vec![0.0; self.target_size]);
                add_into(entry, pv);
            }
        }
    }

    pub fn features(&self) -> impl Iterator<Item = &str> {
        self.w.keys().map(String::as_str)
    }

    pub fn vector(&self, feature: &str) -> Option<&[f64]> {
        self.w.get(feature).map(Vec::as_slice)
    }

    pub fn insert_vector(&mut self, feature: String, vector: Vec<f64>) {
        self.w.insert(feature, vector);
    }

    pub fn len(&self) -> usize {
        self.w.len()
    }

    pub fn is_empty(&self) -> bool {
        self.w.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn raw_w(&self) -> &HashMap<String, Vec<f64>> {
        &self.w
    }

    #[cfg(test)]
    pub(crate) fn raw_c(&self) -> &HashMap<String, Vec<f64>> {
        &self.c
    }
}

fn add_into(total: &mut [f64], addend: &[f64]) {
    for (t, a) in total.iter_mut().zip(addend.iter()) {
        *t += a;
    }
}
