//! The encoding model seam.
//!
//! The pipeline never implements a model. It consumes one through two traits:
//!
//! - [`SparseEncoder`] - a single handle that turns a batch of texts into
//!   token weights. Handles are `Send` but deliberately not required to be
//!   `Sync`, and `encode` takes `&mut self`: one handle is never used by two
//!   threads at once.
//! - [`EncoderFactory`] - knows the model's identity and vocabulary and builds
//!   handles, one per worker.
//!
//! [`EncoderAdapter`] binds a handle to the resolved [`VocabularyTable`] and
//! the run's [`IdRange`], turning chunks of documents into records.

mod adapter;

pub use adapter::*;

use crate::{ModelKey, Result, TokenWeights, VocabularyTable};

/// One handle onto a text-to-sparse-vector model.
pub trait SparseEncoder: Send {
    /// Encodes `texts` in one batch.
    ///
    /// Must return exactly one entry per input text, in input order. A handle
    /// whose call panicked, or overran the chunk deadline, is dropped and
    /// never called again.
    fn encode(&mut self, texts: &[&str]) -> Result<Vec<TokenWeights>>;
}

/// Builds [`SparseEncoder`] handles for one model.
pub trait EncoderFactory: Send + Sync + 'static {
    type Encoder: SparseEncoder + 'static;

    /// Stable identity of the model, used as the vocabulary cache key.
    fn model_key(&self) -> ModelKey;

    /// Reads the model's token to dimension table.
    fn vocabulary(&self) -> Result<VocabularyTable>;

    /// Creates a new, exclusively owned handle.
    fn build(&self) -> Result<Self::Encoder>;

    /// Returns another handle onto the same underlying resource as `primary`.
    ///
    /// Only consulted when encoder confinement is disabled. The default
    /// refuses, in which case every worker gets its own handle from
    /// [`Self::build`].
    fn share(&self, _primary: &Self::Encoder) -> Option<Self::Encoder> {
        None
    }
}

/// Creates `count` handles for a worker pool.
///
/// With `confine` set (the default policy) each handle comes from
/// [`EncoderFactory::build`]. Otherwise the first handle is built and the rest
/// are requested through [`EncoderFactory::share`], falling back to `build`
/// when the factory declines.
pub(crate) fn build_handles<F>(factory: &F, count: usize, confine: bool) -> Result<Vec<F::Encoder>>
where
    F: EncoderFactory,
{
    let mut handles: Vec<F::Encoder> = Vec::with_capacity(count);

    for _ in 0..count {
        let shared = match handles.first() {
            Some(primary) if !confine => factory.share(primary),
            _ => None,
        };
        let handle = match shared {
            Some(handle) => handle,
            None => factory.build()?,
        };
        handles.push(handle);
    }

    Ok(handles)
}
