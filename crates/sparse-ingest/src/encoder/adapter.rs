use super::SparseEncoder;
use crate::{
    Document, EncodedRecord, Error, IdRange, Result, SparseVector, VocabularyTable,
};
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Result of resolving one document's token weights through a vocabulary.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Conversion {
    pub vector: SparseVector,
    /// Number of tokens absent from the vocabulary.
    pub skipped: usize,
    /// First token that was absent, kept for diagnostics.
    pub first_unknown: Option<String>,
}

/// Resolves `weights` into a [`SparseVector`].
///
/// Tokens missing from `vocabulary` are skipped and counted; zero weights are
/// dropped. Indices and values are pushed together while walking `weights`
/// once, so the two lists cannot drift apart.
pub fn to_sparse_vector(vocabulary: &VocabularyTable, weights: &[(String, f32)]) -> Conversion {
    let mut conversion = Conversion {
        vector: SparseVector::with_capacity(weights.len()),
        ..Conversion::default()
    };

    for (token, weight) in weights {
        match vocabulary.get(token) {
            Some(_) if *weight == 0.0 => {}
            Some(index) => conversion.vector.push(index, *weight),
            None => {
                conversion.skipped += 1;
                if conversion.first_unknown.is_none() {
                    conversion.first_unknown = Some(token.clone());
                }
            }
        }
    }

    conversion
}

/// A confined encoder handle bound to a vocabulary and identifier range.
///
/// Each worker owns exactly one adapter for its lifetime; sequential runs
/// create one on the calling thread. The adapter is the only place encoder
/// output is turned into [`EncodedRecord`]s, so sequential and parallel runs
/// produce identical records for identical input.
pub struct EncoderAdapter<E> {
    encoder: E,
    vocabulary: Arc<VocabularyTable>,
    ids: IdRange,
}

impl<E> EncoderAdapter<E>
where
    E: SparseEncoder,
{
    pub const fn new(encoder: E, vocabulary: Arc<VocabularyTable>, ids: IdRange) -> Self {
        Self {
            encoder,
            vocabulary,
            ids,
        }
    }

    pub fn vocabulary(&self) -> &VocabularyTable {
        &self.vocabulary
    }

    pub const fn ids(&self) -> IdRange {
        self.ids
    }

    /// Encodes `documents` with a single call to the underlying encoder.
    ///
    /// # Errors
    ///
    /// - [`Error::Encoder`] if the encoder fails.
    /// - [`Error::LengthMismatch`] if it returns the wrong number of vectors.
    /// - [`Error::IdOverflow`] if a position falls outside the run's range.
    pub fn encode_documents(&mut self, documents: &[Document]) -> Result<Vec<EncodedRecord>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<&str> = documents.iter().map(Document::text).collect();
        let weights = self.encoder.encode(&texts)?;

        if weights.len() != texts.len() {
            return Err(Error::LengthMismatch {
                expected: texts.len(),
                actual: weights.len(),
            });
        }

        documents
            .iter()
            .zip(weights)
            .map(|(document, weights)| self.to_record(document, &weights))
            .collect()
    }

    /// Like [`Self::encode_documents`], but a panic inside the encoder is
    /// caught and reported as [`Error::WorkerFailure`].
    pub(crate) fn encode_guarded(
        &mut self,
        documents: &[Document],
        worker: usize,
        chunk: usize,
    ) -> Result<Vec<EncodedRecord>> {
        match catch_unwind(AssertUnwindSafe(|| self.encode_documents(documents))) {
            Ok(result) => result,
            Err(payload) => Err(Error::WorkerFailure {
                worker,
                chunk,
                reason: panic_message(payload.as_ref()),
            }),
        }
    }

    /// Encodes a single query into a vector, applying the same token
    /// resolution as documents.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyQuery`] for blank input, otherwise any encoder
    /// error.
    pub fn encode_query(&mut self, query: &str) -> Result<SparseVector> {
        if query.trim().is_empty() {
            return Err(Error::EmptyQuery);
        }

        let mut weights = self.encoder.encode(&[query])?;
        if weights.len() != 1 {
            return Err(Error::LengthMismatch {
                expected: 1,
                actual: weights.len(),
            });
        }

        let conversion = to_sparse_vector(&self.vocabulary, &weights.swap_remove(0));
        #[cfg(feature = "tracing")]
        {
            if conversion.skipped > 0 {
                tracing::warn!(
                    "Query dropped {} token(s) absent from the vocabulary",
                    conversion.skipped
                );
            }
        }
        Ok(conversion.vector)
    }

    fn to_record(&self, document: &Document, weights: &[(String, f32)]) -> Result<EncodedRecord> {
        let position = document.position();
        let id = self.ids.id_at(position).ok_or(Error::IdOverflow {
            offset: self.ids.start(),
            count: position + 1,
        })?;

        let conversion = to_sparse_vector(&self.vocabulary, weights);

        #[cfg(feature = "tracing")]
        {
            if let Some(token) = &conversion.first_unknown {
                tracing::warn!(
                    position,
                    skipped = conversion.skipped,
                    "Dropped token(s) absent from the vocabulary, first was {token:?}"
                );
            }
            if conversion.vector.is_empty() {
                tracing::warn!(position, "Document produced an empty sparse vector");
            }
        }

        Ok(EncodedRecord {
            id,
            position,
            text: document.shared_text(),
            vector: conversion.vector,
            skipped_tokens: conversion.skipped,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "encoder panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TokenWeights;

    struct Whitespace;

    impl SparseEncoder for Whitespace {
        fn encode(&mut self, texts: &[&str]) -> Result<Vec<TokenWeights>> {
            Ok(texts
                .iter()
                .map(|text| {
                    text.split_whitespace()
                        .map(|token| (token.to_lowercase(), 0.5))
                        .collect()
                })
                .collect())
        }
    }

    struct Truncating;

    impl SparseEncoder for Truncating {
        fn encode(&mut self, texts: &[&str]) -> Result<Vec<TokenWeights>> {
            Ok(vec![Vec::new(); texts.len().saturating_sub(1)])
        }
    }

    struct Panicking;

    impl SparseEncoder for Panicking {
        fn encode(&mut self, _texts: &[&str]) -> Result<Vec<TokenWeights>> {
            panic!("model exploded")
        }
    }

    fn vocabulary(tokens: &[&str]) -> Arc<VocabularyTable> {
        Arc::new(VocabularyTable::from_tokens(tokens.iter().copied()).unwrap())
    }

    fn weights(pairs: &[(&str, f32)]) -> TokenWeights {
        pairs.iter().map(|(t, w)| ((*t).to_string(), *w)).collect()
    }

    #[test]
    fn known_tokens_keep_encoder_order() {
        let vocab = vocabulary(&["hello", "world"]);
        let conversion = to_sparse_vector(&vocab, &weights(&[("world", 0.6), ("hello", 0.8)]));
        assert_eq!(conversion.vector.indices, vec![1, 0]);
        assert_eq!(conversion.vector.values, vec![0.6, 0.8]);
        assert_eq!(conversion.skipped, 0);
    }

    #[test]
    fn unknown_tokens_are_skipped_without_misalignment() {
        let vocab = vocabulary(&["hello"]);
        let conversion = to_sparse_vector(
            &vocab,
            &weights(&[("hello", 0.8), ("unknown", 0.6), ("hello", 0.1)]),
        );
        assert_eq!(conversion.vector.indices, vec![0, 0]);
        assert_eq!(conversion.vector.values, vec![0.8, 0.1]);
        assert_eq!(conversion.vector.indices.len(), conversion.vector.values.len());
        assert_eq!(conversion.skipped, 1);
        assert_eq!(conversion.first_unknown.as_deref(), Some("unknown"));
    }

    #[test]
    fn zero_weights_are_dropped() {
        let vocab = vocabulary(&["a", "b"]);
        let conversion = to_sparse_vector(&vocab, &weights(&[("a", 0.0), ("b", -0.25)]));
        assert_eq!(conversion.vector.indices, vec![1]);
        assert_eq!(conversion.vector.values, vec![-0.25]);
        assert_eq!(conversion.skipped, 0);
    }

    #[test]
    fn all_unknown_yields_empty_vector() {
        let vocab = vocabulary(&["hello"]);
        let conversion = to_sparse_vector(&vocab, &weights(&[("unknown", 0.5)]));
        assert!(conversion.vector.is_empty());
        assert_eq!(conversion.skipped, 1);
    }

    #[test]
    fn records_carry_offset_ids_and_positions() {
        let ids = IdRange::allocate(100, 3).unwrap();
        let mut adapter = EncoderAdapter::new(Whitespace, vocabulary(&["fast", "search"]), ids);
        let docs = Document::sequence(["Fast search", "slow", "search"]);

        let records = adapter.encode_documents(&docs[1..]).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!((records[0].id, records[0].position), (101, 1));
        assert!(records[0].vector.is_empty());
        assert_eq!(records[0].skipped_tokens, 1);
        assert_eq!((records[1].id, records[1].position), (102, 2));
        assert_eq!(records[1].vector.indices, vec![1]);
        assert_eq!(&*records[1].text, "search");
    }

    #[test]
    fn length_mismatch_is_an_error() {
        let ids = IdRange::allocate(0, 2).unwrap();
        let mut adapter = EncoderAdapter::new(Truncating, vocabulary(&[]), ids);
        let docs = Document::sequence(["a", "b"]);
        let err = adapter.encode_documents(&docs).unwrap_err();
        assert!(matches!(
            err,
            Error::LengthMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn panics_become_worker_failures() {
        let ids = IdRange::allocate(0, 1).unwrap();
        let mut adapter = EncoderAdapter::new(Panicking, vocabulary(&[]), ids);
        let docs = Document::sequence(["a"]);
        let err = adapter.encode_guarded(&docs, 3, 7).unwrap_err();
        match err {
            Error::WorkerFailure {
                worker,
                chunk,
                reason,
            } => {
                assert_eq!((worker, chunk), (3, 7));
                assert_eq!(reason, "model exploded");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn blank_queries_are_rejected() {
        let ids = IdRange::default();
        let mut adapter = EncoderAdapter::new(Whitespace, vocabulary(&["vector"]), ids);
        assert!(matches!(adapter.encode_query(""), Err(Error::EmptyQuery)));
        assert!(matches!(adapter.encode_query("   "), Err(Error::EmptyQuery)));

        let vector = adapter.encode_query("Vector basics").unwrap();
        assert_eq!(vector.indices, vec![0]);
    }
}
