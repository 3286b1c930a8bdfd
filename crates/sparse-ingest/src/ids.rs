use crate::{Error, Result};
use core::ops::Range;

/// A contiguous block of record identifiers, `[start, start + len)`.
///
/// Allocation is a pure function of the caller's offset and the record count.
/// There is no hidden global counter: callers that ingest into the same store
/// more than once chain runs through [`IdRange::next_offset`].
///
/// # Example
/// ```
/// use sparse_ingest::IdRange;
///
/// let first = IdRange::allocate(0, 1000).unwrap();
/// let second = IdRange::allocate(first.next_offset(), 500).unwrap();
/// assert_eq!(second.start(), 1000);
/// assert_eq!(second.end(), 1500);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IdRange {
    start: u64,
    end: u64,
}

impl IdRange {
    /// Reserves `count` identifiers starting at `start_offset`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IdOverflow`] if the range would run past `u64::MAX`.
    pub fn allocate(start_offset: u64, count: usize) -> Result<Self> {
        let overflow = || Error::IdOverflow {
            offset: start_offset,
            count,
        };
        let len = u64::try_from(count).map_err(|_| overflow())?;
        let end = start_offset.checked_add(len).ok_or_else(overflow)?;
        Ok(Self {
            start: start_offset,
            end,
        })
    }

    pub const fn start(&self) -> u64 {
        self.start
    }

    pub const fn end(&self) -> u64 {
        self.end
    }

    /// The offset a subsequent run should start from to avoid reuse.
    pub const fn next_offset(&self) -> u64 {
        self.end
    }

    pub const fn len(&self) -> u64 {
        self.end - self.start
    }

    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub const fn contains(&self, id: u64) -> bool {
        self.start <= id && id < self.end
    }

    /// Identifier of the record at sequence `position`, if it is in range.
    pub fn id_at(&self, position: usize) -> Option<u64> {
        let id = self.start.checked_add(position as u64)?;
        self.contains(id).then_some(id)
    }
}

impl IntoIterator for IdRange {
    type Item = u64;
    type IntoIter = Range<u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.start..self.end
    }
}
