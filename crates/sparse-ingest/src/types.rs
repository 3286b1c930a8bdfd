//! # Records flowing through the pipeline
//!
//! - [`Document`] - caller text tagged with its sequence position
//! - [`TokenWeights`] - raw encoder output, keyed by token string
//! - [`SparseVector`] - encoder output resolved through the vocabulary
//! - [`EncodedRecord`] - the unit handed to a downstream vector store
//! - [`EncodedBatch`] - a bounded group of records yielded by a stream

use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Ordered `(token, weight)` pairs for one text, as produced by a
/// [`SparseEncoder`](crate::SparseEncoder).
pub type TokenWeights = Vec<(String, f32)>;

/// An input text plus its 0-based position in the submitted sequence.
///
/// Positions are assigned once at pipeline entry and never change. The text is
/// reference counted so chunks can be handed to worker threads without
/// copying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    position: usize,
    text: Arc<str>,
}

impl Document {
    pub fn new(position: usize, text: impl Into<Arc<str>>) -> Self {
        Self {
            position,
            text: text.into(),
        }
    }

    pub const fn position(&self) -> usize {
        self.position
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn shared_text(&self) -> Arc<str> {
        Arc::clone(&self.text)
    }

    /// Tags each text with its position, starting at 0.
    pub fn sequence<I, S>(texts: I) -> Arc<[Document]>
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        texts
            .into_iter()
            .enumerate()
            .map(|(position, text)| Self::new(position, text))
            .collect()
    }
}

/// Parallel index/value lists; `indices[i]` carries weight `values[i]`.
///
/// Both lists are always the same length. They are only ever built together in
/// one pass, see [`crate::to_sparse_vector`].
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            indices: Vec::with_capacity(capacity),
            values: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn push(&mut self, index: u32, value: f32) {
        self.indices.push(index);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }
}

/// A uniquely identified, encoded document.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EncodedRecord {
    /// Identifier under which the record is stored downstream.
    pub id: u64,
    /// Position of the source document in the submitted sequence.
    pub position: usize,
    /// The original document text.
    pub text: Arc<str>,
    pub vector: SparseVector,
    /// Tokens dropped because the vocabulary had no entry for them.
    #[cfg_attr(feature = "serde", serde(default))]
    pub skipped_tokens: usize,
}

/// A group of at most `batch_size` consecutive records.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EncodedBatch {
    /// 0-based index of this batch within its stream.
    pub index: usize,
    /// Sequence position of the first record in the batch.
    pub offset: usize,
    pub records: Vec<EncodedRecord>,
}

impl EncodedBatch {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
