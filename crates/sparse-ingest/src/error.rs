//! Error types for the encoding pipeline.
//!
//! This module defines the central `Error` enum, which captures every failure
//! the pipeline can observe. Most variants are internal: they describe a
//! single chunk or worker and are absorbed by the retry and fallback policy.
//! Only three variants ever reach a caller of [`crate::encode`] or
//! [`crate::encode_streamed`]:
//!
//! - `Configuration`: the [`crate::EncodingConfig`] was invalid; no work ran.
//! - `FallbackFailure`: the parallel stage aborted and the sequential re-run
//!   failed as well.
//! - `Sequential`: sequential mode was selected up front and failed.
//!
//! Unknown tokens are not errors at all. They are counted on the record and
//! logged.

use core::time::Duration;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the encoding pipeline.
#[derive(Clone, thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The supplied configuration violates a constraint.
    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    /// The encoder collaborator reported a failure.
    #[error("Encoder error: {reason}")]
    Encoder { reason: String },

    /// The encoder broke its length-preserving contract.
    #[error("Encoder returned {actual} vectors for {expected} texts")]
    LengthMismatch { expected: usize, actual: usize },

    /// A chunk did not complete within its deadline.
    #[error("Chunk {chunk} exceeded its deadline of {timeout:?}")]
    ChunkTimeout { chunk: usize, timeout: Duration },

    /// A worker panicked or otherwise failed while encoding a chunk.
    #[error("Worker {worker} failed on chunk {chunk}: {reason}")]
    WorkerFailure {
        worker: usize,
        chunk: usize,
        reason: String,
    },

    /// A chunk kept failing after every retry was spent.
    #[error("Chunk {chunk} failed after {attempts} attempt(s): {source}")]
    ChunkFailed {
        chunk: usize,
        attempts: u32,
        source: Box<Error>,
    },

    /// The worker pool could not be created or can no longer make progress.
    #[error("Worker pool error: {context}")]
    Pool { context: String },

    /// Sequential encoding failed with no further degradation available.
    #[error("Sequential encoding failed: {source}")]
    Sequential { source: Box<Error> },

    /// The parallel stage aborted and the sequential fallback failed too.
    #[error("Sequential fallback failed after parallel abort ({parallel}): {source}")]
    FallbackFailure {
        parallel: Box<Error>,
        source: Box<Error>,
    },

    /// `id_offset + count` does not fit into the identifier space.
    #[error("Identifier range starting at {offset} cannot hold {count} records")]
    IdOverflow { offset: u64, count: usize },

    /// An empty or whitespace-only query was submitted.
    #[error("Query must not be empty")]
    EmptyQuery,
}

impl Error {
    /// Shorthand for [`Error::Configuration`].
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`Error::Encoder`]; collaborators use it to report
    /// model failures.
    pub fn encoder(reason: impl Into<String>) -> Self {
        Self::Encoder {
            reason: reason.into(),
        }
    }

    /// Returns `true` for the errors a caller can fix by changing its input.
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. } | Self::IdOverflow { .. })
    }

    /// Returns `true` if the run failed after degrading to sequential mode.
    pub const fn is_fallback_failure(&self) -> bool {
        matches!(self, Self::FallbackFailure { .. })
    }
}
