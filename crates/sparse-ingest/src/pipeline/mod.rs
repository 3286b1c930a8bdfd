//! Orchestration of one encoding invocation.
//!
//! Each call to [`Pipeline::encode`] moves through
//! `Validating -> {Sequential | Parallel} -> Assembling -> Succeeded`. When
//! the parallel stage aborts, the whole input is re-encoded sequentially on
//! the calling thread; if that fails as well the caller receives
//! [`Error::FallbackFailure`] and no records.
//!
//! [`Pipeline::encode_streamed`] runs the same stages lazily and hands records
//! out in bounded [`EncodedBatch`](crate::EncodedBatch)es through a
//! [`BatchStream`].

mod job;
mod stream;

pub use stream::*;

use crate::{
    Document, EncodedRecord, EncoderAdapter, EncoderFactory, EncodingConfig, Error, IdRange,
    Result, SparseVector, Strategy, VocabularyCache, VocabularyTable,
};
use job::Job;
use std::sync::Arc;

/// A configured encoder plus the cache its vocabulary lives in.
///
/// A pipeline is reusable: every call re-runs the full stage sequence over the
/// documents it is given. The vocabulary is loaded on first use and shared by
/// all later calls (and by every other pipeline over the same cache and
/// model).
pub struct Pipeline<F> {
    factory: Arc<F>,
    config: EncodingConfig,
    cache: Arc<VocabularyCache>,
}

impl<F> Pipeline<F>
where
    F: EncoderFactory,
{
    /// Creates a pipeline over the process-wide [`VocabularyCache::global`].
    pub fn new(factory: F, config: EncodingConfig) -> Self {
        Self {
            factory: Arc::new(factory),
            config,
            cache: VocabularyCache::global(),
        }
    }

    /// Replaces the vocabulary cache.
    pub fn with_cache(mut self, cache: Arc<VocabularyCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn config(&self) -> &EncodingConfig {
        &self.config
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Resolves the model's vocabulary through the cache.
    ///
    /// # Errors
    ///
    /// Propagates the factory's error if the table has to be loaded and the
    /// load fails.
    pub fn vocabulary(&self) -> Result<Arc<VocabularyTable>> {
        let key = self.factory.model_key();
        self.cache.get_or_load(&key, || self.factory.vocabulary())
    }

    /// Encodes `documents` and returns one record per document, in input
    /// order.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] or [`Error::IdOverflow`] for invalid input.
    /// - [`Error::Sequential`] if sequential mode was chosen and failed.
    /// - [`Error::FallbackFailure`] if the parallel stage aborted and the
    ///   sequential re-run failed too.
    /// - The factory's error if the vocabulary cannot be loaded.
    pub fn encode<I, S>(&self, documents: I) -> Result<Vec<EncodedRecord>>
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        let job = self.prepare(documents)?;
        if job.documents.is_empty() {
            return Ok(Vec::new());
        }

        let records = match self.config.strategy(job.len()) {
            Strategy::Sequential => {
                #[cfg(feature = "tracing")]
                tracing::info!("Encoding {} documents sequentially", job.len());

                job.encode_sequential(0).map_err(|e| Error::Sequential {
                    source: Box::new(e),
                })?
            }
            Strategy::Parallel { workers } => {
                #[cfg(feature = "tracing")]
                tracing::info!("Encoding {} documents on {workers} workers", job.len());

                match job.encode_parallel(workers) {
                    Ok(records) => records,
                    Err(parallel) => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            "Parallel encoding aborted, re-encoding all {} documents sequentially: {parallel}",
                            job.len()
                        );

                        job.encode_sequential(0).map_err(|source| {
                            #[cfg(feature = "tracing")]
                            tracing::error!("Sequential fallback failed: {source}");

                            Error::FallbackFailure {
                                parallel: Box::new(parallel),
                                source: Box::new(source),
                            }
                        })?
                    }
                }
            }
        };

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Encoded {} documents, ids {}..{}",
            records.len(),
            job.ids.start(),
            job.ids.end()
        );

        Ok(records)
    }

    /// Validates the input and returns a lazy stream of batches of at most
    /// `batch_size` records.
    ///
    /// No document is encoded until the stream is first polled. Dropping the
    /// stream early stops the workers.
    ///
    /// # Errors
    ///
    /// Configuration and vocabulary errors are reported here; encoding errors
    /// surface as the stream's final item.
    pub fn encode_streamed<I, S>(&self, documents: I) -> Result<BatchStream<F>>
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        let job = self.prepare(documents)?;
        let strategy = self.config.strategy(job.len());

        #[cfg(feature = "tracing")]
        tracing::info!("Streaming {} documents ({strategy:?})", job.len());

        Ok(BatchStream::new(job, strategy))
    }

    /// Encodes a single search query with the model's vocabulary.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyQuery`] for blank input, otherwise any error
    /// from loading the vocabulary or running the encoder.
    pub fn encode_query(&self, query: &str) -> Result<SparseVector> {
        if query.trim().is_empty() {
            return Err(Error::EmptyQuery);
        }

        let vocabulary = self.vocabulary()?;
        let mut adapter = EncoderAdapter::new(self.factory.build()?, vocabulary, IdRange::default());
        adapter.encode_query(query)
    }

    fn prepare<I, S>(&self, documents: I) -> Result<Job<F>>
    where
        I: IntoIterator<Item = S>,
        S: Into<Arc<str>>,
    {
        self.config.validate()?;

        let documents = Document::sequence(documents);
        let ids = IdRange::allocate(self.config.id_offset, documents.len())?;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Validated {} documents, reserved ids {}..{}",
            documents.len(),
            ids.start(),
            ids.end()
        );

        let vocabulary = if documents.is_empty() {
            Arc::default()
        } else {
            self.vocabulary()?
        };

        Ok(Job {
            factory: Arc::clone(&self.factory),
            config: self.config.clone(),
            documents,
            ids,
            vocabulary,
        })
    }
}

impl<F> core::fmt::Debug for Pipeline<F> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
