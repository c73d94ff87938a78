//! Label registry: a stable bijection between label strings and dense ids.
//!
//! Ids are assigned in ascending corpus-frequency order (rarest label
//! first). This is load-bearing, not cosmetic: the beam decoder's
//! candidate tie-break (§4.4) prefers the smaller label id, which — thanks
//! to this ordering — means it prefers the rarer label at zero-information
//! positions (§9 "Tie-break via label frequency").

use std::collections::HashMap;

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct LabelRegistry {
    label_to_id: HashMap<String, u32>,
    id_to_label: Vec<String>,
    ignore_label: Option<String>,
    ignore_id: Option<u32>,
}

impl LabelRegistry {
    pub fn new(ignore_label: Option<String>) -> Self {
        Self {
            label_to_id: HashMap::new(),
            id_to_label: Vec::new(),
            ignore_label,
            ignore_id: None,
        }
    }

    /// Registers every label in `labels` in the order given, skipping the
    /// ignore label and any label already known. The caller is responsible
    /// for ordering `labels` by ascending frequency (see
    /// [`crate::corpus::frequency_order`]).
    ///
    /// Returns the previous [`Self::size`], so callers can tell whether the
    /// label space grew (and so must extend every weight vector).
    pub fn register<'a, I>(&mut self, labels: I) -> u32
    where
        I: IntoIterator<Item = &'a str>,
    {
        let former_size = self.size();
        for label in labels {
            if self.ignore_label.as_deref() == Some(label) {
                continue;
            }
            if !self.label_to_id.contains_key(label) {
                let id = self.id_to_label.len() as u32;
                self.label_to_id.insert(label.to_string(), id);
                self.id_to_label.push(label.to_string());
            }
        }
        if self.ignore_label.is_some() {
            self.ignore_id = Some(self.id_to_label.len() as u32);
        }
        former_size
    }

    pub fn id_of(&self, label: &str) -> Option<u32> {
        self.label_to_id.get(label).copied()
    }

    /// Id of `label`, or the ignore id if `label` equals the configured
    /// ignore label and one is registered. Used when mapping gold corpus
    /// labels to dense ids for training.
    pub fn id_of_or_ignore(&self, label: &str) -> Option<u32> {
        self.id_of(label).or(self.ignore_id)
    }

    pub fn label_of(&self, id: u32) -> Option<&str> {
        self.id_to_label.get(id as usize).map(String::as_str)
    }

    pub fn ignore_id(&self) -> Option<u32> {
        self.ignore_id
    }

    pub fn is_ignore(&self, id: u32) -> bool {
        self.ignore_id == Some(id)
    }

    /// Number of in-use label ids (excludes the ignore sentinel).
    pub fn size(&self) -> u32 {
        self.id_to_label.len() as u32
    }
}
