#![doc = include_str!("../README.md")]

mod config;
pub mod dispatch;
mod encoder;
mod error;
mod ids;
mod pipeline;
mod types;
mod vocab;

#[cfg(test)]
mod testing;

pub use crate::config::*;
pub use crate::encoder::*;
pub use crate::error::*;
pub use crate::ids::*;
pub use crate::pipeline::*;
pub use crate::types::*;
pub use crate::vocab::*;

/// Encodes `documents` with a one-off [`Pipeline`] over the global
/// vocabulary cache.
///
/// # Errors
///
/// See [`Pipeline::encode`].
pub fn encode<F, I, S>(factory: F, documents: I, config: EncodingConfig) -> Result<Vec<EncodedRecord>>
where
    F: EncoderFactory,
    I: IntoIterator<Item = S>,
    S: Into<std::sync::Arc<str>>,
{
    Pipeline::new(factory, config).encode(documents)
}

/// Streams `documents` in batches with a one-off [`Pipeline`] over the global
/// vocabulary cache.
///
/// # Errors
///
/// See [`Pipeline::encode_streamed`].
pub fn encode_streamed<F, I, S>(
    factory: F,
    documents: I,
    config: EncodingConfig,
) -> Result<BatchStream<F>>
where
    F: EncoderFactory,
    I: IntoIterator<Item = S>,
    S: Into<std::sync::Arc<str>>,
{
    Pipeline::new(factory, config).encode_streamed(documents)
}
