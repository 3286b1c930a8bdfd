use crate::Document;
use core::ops::Range;
use std::sync::Arc;

/// Chunks per worker; oversubscription smooths out uneven chunk durations.
pub const OVERSUBSCRIPTION: usize = 2;

/// A contiguous slice of the input, dispatched as one unit of work.
///
/// Chunks share the run's document sequence and only record their bounds, so
/// cloning one for a retry is cheap.
#[derive(Debug, Clone)]
pub struct Chunk {
    index: usize,
    documents: Arc<[Document]>,
    bounds: Range<usize>,
}

impl Chunk {
    pub fn new(index: usize, documents: Arc<[Document]>, bounds: Range<usize>) -> Self {
        debug_assert!(bounds.end <= documents.len());
        Self {
            index,
            documents,
            bounds,
        }
    }

    /// Position of this chunk among all chunks of the run.
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Sequence position of the chunk's first document.
    pub const fn offset(&self) -> usize {
        self.bounds.start
    }

    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents[self.bounds.clone()]
    }
}

/// Chunk size for `documents` spread over `workers`:
/// `max(1, documents / (workers * 2))`.
pub fn chunk_size(documents: usize, workers: usize) -> usize {
    (documents / (workers.max(1) * OVERSUBSCRIPTION)).max(1)
}

/// Lazily splits a document sequence into consecutive [`Chunk`]s.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    documents: Arc<[Document]>,
    chunk_size: usize,
    next_start: usize,
    next_index: usize,
}

impl ChunkPlan {
    /// Plans chunks of `chunk_size` documents, starting at `start`.
    pub fn new(documents: Arc<[Document]>, chunk_size: usize, start: usize) -> Self {
        Self {
            next_start: start.min(documents.len()),
            documents,
            chunk_size: chunk_size.max(1),
            next_index: 0,
        }
    }

    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }
}

impl Iterator for ChunkPlan {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.next_start >= self.documents.len() {
            return None;
        }

        let end = (self.next_start + self.chunk_size).min(self.documents.len());
        let chunk = Chunk::new(
            self.next_index,
            Arc::clone(&self.documents),
            self.next_start..end,
        );
        self.next_start = end;
        self.next_index += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.documents.len() - self.next_start).div_ceil(self.chunk_size);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChunkPlan {}

#[cfg(test)]
mod tests {
    use super::*;

    fn docs(n: usize) -> Arc<[Document]> {
        Document::sequence((0..n).map(|i| format!("doc {i}")))
    }

    #[test]
    fn chunk_size_oversubscribes_workers() {
        assert_eq!(chunk_size(1000, 4), 125);
        assert_eq!(chunk_size(7, 4), 1);
        assert_eq!(chunk_size(0, 4), 1);
        assert_eq!(chunk_size(10, 0), 5);
    }

    #[test]
    fn plan_covers_input_contiguously() {
        let plan = ChunkPlan::new(docs(10), 3, 0);
        assert_eq!(plan.len(), 4);

        let chunks: Vec<_> = plan.collect();
        let bounds: Vec<_> = chunks.iter().map(|c| (c.index(), c.offset(), c.len())).collect();
        assert_eq!(bounds, vec![(0, 0, 3), (1, 3, 3), (2, 6, 3), (3, 9, 1)]);

        let positions: Vec<_> = chunks
            .iter()
            .flat_map(|c| c.documents().iter().map(Document::position))
            .collect();
        assert_eq!(positions, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn plan_can_resume_mid_sequence() {
        let mut plan = ChunkPlan::new(docs(10), 4, 6);
        assert_eq!(plan.len(), 1);
        let chunk = plan.next().unwrap();
        assert_eq!((chunk.index(), chunk.offset(), chunk.len()), (0, 6, 4));
        assert!(plan.next().is_none());
    }

    #[test]
    fn empty_input_has_no_chunks() {
        let mut plan = ChunkPlan::new(docs(0), 8, 0);
        assert_eq!(plan.len(), 0);
        assert!(plan.next().is_none());
    }
}
