//! Error types for the tagger.
//!
//! Mirrors the `kind` + boxed-source shape used throughout the dictionary
//! tooling this crate is grounded on: a small closed enum of failure
//! categories, each carrying an [`anyhow::Error`] for the underlying cause.

use std::fmt;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TaggerErrorKind {
    /// Malformed corpus line, or a coarse label missing from `--mapping`.
    InputFormat,
    /// Cannot open/read a model, corpus, or resource file.
    ResourceIo,
    /// A loaded model's feature vectors don't match its declared target size.
    ModelMismatch,
    /// Evaluation corpus contributed zero scored tokens. Not an error: the
    /// caller gets `accuracy = 0.0` rather than a division by zero.
    EmptyEvaluation,
    /// Input for `--progress` can't be pre-scanned for a line count (e.g.
    /// piped stdin). Not an error: tagging continues without an ETA.
    UnseekableStream,
    /// An XML-mode token had no decoded tag to pair with (sentence/token
    /// count drifted from `xml_sentences`'s grouping). Not an error: the
    /// token is emitted with a placeholder tag.
    InconsistentXml,
}

impl TaggerErrorKind {
    pub fn with_source<E>(self, source: E) -> TaggerError
    where
        anyhow::Error: From<E>,
    {
        TaggerError {
            kind: self,
            source: From::from(source),
        }
    }

    pub fn with_message(self, message: impl fmt::Display + Send + Sync + 'static) -> TaggerError {
        TaggerError {
            kind: self,
            source: anyhow::anyhow!("{message}"),
        }
    }

    /// Logs one of the non-error policy rows (warn, then continue) tagged
    /// with its classification, instead of constructing a [`TaggerError`].
    pub fn log_warn(self, message: impl fmt::Display) {
        tracing::warn!(kind = ?self, "{message}");
    }
}

#[derive(thiserror::Error, Debug)]
#[error("{kind:?}: {source}")]
pub struct TaggerError {
    pub kind: TaggerErrorKind,
    #[source]
    source: anyhow::Error,
}

impl TaggerError {
    pub fn kind(&self) -> TaggerErrorKind {
        self.kind
    }
}

pub type Result<T> = std::result::Result<T, TaggerError>;
