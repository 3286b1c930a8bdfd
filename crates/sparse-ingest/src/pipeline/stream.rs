use super::job::Job;
use crate::dispatch::{ChunkDispatcher, ResultAssembler};
use crate::{
    EncodedBatch, EncodedRecord, EncoderAdapter, EncoderFactory, Error, IdRange, Result, Strategy,
};
use std::collections::VecDeque;

enum Source<F>
where
    F: EncoderFactory,
{
    /// Nothing has been started yet.
    Idle,
    Parallel {
        dispatcher: ChunkDispatcher<F>,
        assembler: ResultAssembler,
    },
    Sequential {
        adapter: EncoderAdapter<F::Encoder>,
        cursor: usize,
        calls: usize,
    },
}

/// Lazy sequence of [`EncodedBatch`]es produced by
/// [`Pipeline::encode_streamed`](crate::Pipeline::encode_streamed).
///
/// Records are pulled from the encoder only as batches are requested. In
/// parallel mode at most `workers` chunks, each no larger than `batch_size`,
/// run ahead of the batch being assembled, so peak memory is about one batch
/// plus the in-flight chunks regardless of input size.
///
/// If the parallel stage aborts, the stream switches to sequential encoding
/// starting at the first record it has not yet yielded; batches already
/// handed out are never repeated. An unrecoverable error is yielded once and
/// ends the stream.
///
/// A stream is single pass. Calling `encode_streamed` again starts over.
pub struct BatchStream<F>
where
    F: EncoderFactory,
{
    job: Job<F>,
    strategy: Strategy,
    source: Source<F>,
    pending: VecDeque<EncodedRecord>,
    emitted: usize,
    next_batch: usize,
    fallback: Option<Error>,
    finished: bool,
}

impl<F> BatchStream<F>
where
    F: EncoderFactory,
{
    pub(crate) fn new(job: Job<F>, strategy: Strategy) -> Self {
        Self {
            finished: job.documents.is_empty(),
            job,
            strategy,
            source: Source::Idle,
            pending: VecDeque::new(),
            emitted: 0,
            next_batch: 0,
            fallback: None,
        }
    }

    /// Identifier range reserved for this run. Its
    /// [`next_offset`](IdRange::next_offset) is the offset for the next
    /// ingestion call.
    pub const fn ids(&self) -> IdRange {
        self.job.ids
    }

    /// Number of documents in this run.
    pub fn document_count(&self) -> usize {
        self.job.len()
    }

    /// Number of records yielded so far.
    pub const fn emitted(&self) -> usize {
        self.emitted
    }

    /// Returns `true` once the stream has degraded to sequential encoding.
    pub const fn fell_back(&self) -> bool {
        self.fallback.is_some()
    }

    fn start(&mut self) -> Result<()> {
        self.source = match self.strategy {
            Strategy::Parallel { workers } => Source::Parallel {
                dispatcher: self
                    .job
                    .dispatcher(workers, self.job.config.batch_size, workers)?,
                assembler: ResultAssembler::new(),
            },
            Strategy::Sequential => self.sequential_from(0)?,
        };
        Ok(())
    }

    fn sequential_from(&self, cursor: usize) -> Result<Source<F>> {
        Ok(Source::Sequential {
            adapter: self.job.sequential_adapter()?,
            cursor,
            calls: 0,
        })
    }

    /// Produces the next run of ordered records, or `None` when the input is
    /// exhausted.
    fn pull(&mut self) -> Result<Option<Vec<EncodedRecord>>> {
        if matches!(self.source, Source::Idle) {
            self.start()?;
        }

        match &mut self.source {
            Source::Idle => Ok(None),
            Source::Parallel {
                dispatcher,
                assembler,
            } => loop {
                if let Some(records) = assembler.pop_ready() {
                    return Ok(Some(records));
                }
                match dispatcher.next() {
                    Some(Ok(output)) => assembler.insert(output),
                    Some(Err(e)) => return Err(e),
                    None if assembler.buffered() > 0 => {
                        return Err(Error::Pool {
                            context: format!(
                                "dispatch ended while waiting for chunk {}",
                                assembler.next_index()
                            ),
                        });
                    }
                    None => return Ok(None),
                }
            },
            Source::Sequential {
                adapter,
                cursor,
                calls,
            } => {
                let documents = &self.job.documents;
                if *cursor >= documents.len() {
                    return Ok(None);
                }

                let end = (*cursor + self.job.config.batch_size).min(documents.len());
                let records = adapter.encode_guarded(&documents[*cursor..end], 0, *calls)?;
                *cursor = end;
                *calls += 1;
                Ok(Some(records))
            }
        }
    }

    /// Handles a failure of the current source. Returns `Ok` if encoding can
    /// continue sequentially.
    fn recover(&mut self, error: Error) -> Result<()> {
        if let Some(parallel) = &self.fallback {
            return Err(Error::FallbackFailure {
                parallel: Box::new(parallel.clone()),
                source: Box::new(error),
            });
        }

        if self.strategy == Strategy::Sequential {
            return Err(Error::Sequential {
                source: Box::new(error),
            });
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(
            "Parallel stream aborted after {} records, continuing sequentially: {error}",
            self.emitted
        );

        // Anything produced but not yet yielded is re-encoded.
        self.pending.clear();
        match self.sequential_from(self.emitted) {
            Ok(source) => {
                self.source = source;
                self.fallback = Some(error);
                Ok(())
            }
            Err(source) => Err(Error::FallbackFailure {
                parallel: Box::new(error),
                source: Box::new(source),
            }),
        }
    }

    fn fill(&mut self) -> Result<()> {
        while self.pending.len() < self.job.config.batch_size {
            match self.pull() {
                Ok(Some(records)) => self.pending.extend(records),
                Ok(None) => break,
                Err(e) => self.recover(e)?,
            }
        }
        Ok(())
    }
}

impl<F> Iterator for BatchStream<F>
where
    F: EncoderFactory,
{
    type Item = Result<EncodedBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        if let Err(e) = self.fill() {
            #[cfg(feature = "tracing")]
            tracing::error!("Stream failed after {} records: {e}", self.emitted);

            self.finished = true;
            self.pending.clear();
            self.source = Source::Idle;
            return Some(Err(e));
        }

        if self.pending.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::info!(
                "Stream complete: {} records in {} batches",
                self.emitted,
                self.next_batch
            );

            self.finished = true;
            self.source = Source::Idle;
            return None;
        }

        let take = self.pending.len().min(self.job.config.batch_size);
        let batch = EncodedBatch {
            index: self.next_batch,
            offset: self.emitted,
            records: self.pending.drain(..take).collect(),
        };
        self.emitted += take;
        self.next_batch += 1;

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Yielding batch {} ({} records at offset {})",
            batch.index,
            batch.len(),
            batch.offset
        );

        Some(Ok(batch))
    }
}
