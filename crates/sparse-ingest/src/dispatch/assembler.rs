//! Restores document order from chunk results that complete in any order.
//!
//! Results are keyed by chunk index on arrival. Order is recovered only from
//! those keys, never from the order work was submitted or completed.

use crate::{EncodedRecord, Error, Result};
use std::collections::BTreeMap;

/// Records produced for one chunk, tagged with the chunk's index.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkOutput {
    pub index: usize,
    pub records: Vec<EncodedRecord>,
}

/// Index-keyed collection of completed chunks.
///
/// Used incrementally by [`crate::BatchStream`] ([`Self::insert`] /
/// [`Self::pop_ready`]) and in one shot by whole-collection runs
/// ([`Self::assemble`]).
#[derive(Debug, Default)]
pub struct ResultAssembler {
    completed: BTreeMap<usize, Vec<EncodedRecord>>,
    next_index: usize,
}

impl ResultAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the records of a completed chunk.
    ///
    /// A chunk index that was already stored or released is ignored, so a
    /// late duplicate can never displace the accepted result.
    pub fn insert(&mut self, output: ChunkOutput) {
        if output.index < self.next_index || self.completed.contains_key(&output.index) {
            #[cfg(feature = "tracing")]
            tracing::debug!("Ignoring duplicate result for chunk {}", output.index);
            return;
        }
        self.completed.insert(output.index, output.records);
    }

    /// Releases the records of the next chunk in sequence, if it has arrived.
    pub fn pop_ready(&mut self) -> Option<Vec<EncodedRecord>> {
        let records = self.completed.remove(&self.next_index)?;
        self.next_index += 1;
        Some(records)
    }

    /// Index of the next chunk [`Self::pop_ready`] will release.
    pub const fn next_index(&self) -> usize {
        self.next_index
    }

    /// Number of completed chunks held back waiting for an earlier one.
    pub fn buffered(&self) -> usize {
        self.completed.len()
    }

    /// Concatenates all `outputs` in chunk order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pool`] if the outputs do not cover chunk indices
    /// `0..chunk_count` exactly once each.
    pub fn assemble<I>(outputs: I, chunk_count: usize) -> Result<Vec<EncodedRecord>>
    where
        I: IntoIterator<Item = ChunkOutput>,
    {
        let mut keyed = BTreeMap::new();
        let mut total = 0;

        for output in outputs {
            total += output.records.len();
            if keyed.insert(output.index, output.records).is_some() {
                return Err(Error::Pool {
                    context: format!("chunk {} completed more than once", output.index),
                });
            }
        }

        // Distinct keys: a matching count plus a matching maximum means the
        // keys are exactly `0..chunk_count`.
        let contiguous = keyed
            .keys()
            .next_back()
            .is_none_or(|&last| last + 1 == chunk_count);
        if keyed.len() != chunk_count || !contiguous {
            return Err(Error::Pool {
                context: format!(
                    "expected {chunk_count} chunk results, received {}",
                    keyed.len()
                ),
            });
        }

        let mut records = Vec::with_capacity(total);
        for chunk in keyed.into_values() {
            records.extend(chunk);
        }
        Ok(records)
    }
}
