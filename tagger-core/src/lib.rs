//! An averaged structured perceptron sequence tagger with beam-search
//! decoding and early update.
//!
//! ```text
//! Corpus -> Extractor -> static feature sets -> Decoder (beam search) -> Trainer -> Weight Store
//! ```
//!
//! The five load-bearing pieces — [`registry`], [`weights`],
//! [`features`], [`beam`], [`perceptron`] — are tightly coupled: the
//! decoder consults the learner's weights through feature signatures the
//! extractor produces, and the learner's update targets exactly the
//! features the decoder used on the violating prefix.

pub mod beam;
pub mod corpus;
pub mod error;
pub mod features;
pub mod model;
pub mod parallel;
pub mod perceptron;
pub mod registry;
pub mod resources;
pub mod weights;

pub use error::{Result, TaggerError, TaggerErrorKind};
pub use perceptron::{EvaluationReport, IterationStats, Tagger, TrainConfig};
pub use registry::LabelRegistry;
pub use weights::WeightStore;
