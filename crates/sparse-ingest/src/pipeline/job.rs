use crate::dispatch::{
    ChunkDispatcher, ChunkPlan, DispatchOptions, ResultAssembler, chunk_size,
};
use crate::{
    Document, EncodedRecord, EncoderAdapter, EncoderFactory, EncodingConfig, IdRange, Result,
    VocabularyTable,
};
use std::sync::Arc;

/// Everything one invocation needs once its input has been validated:
/// positioned documents, their identifier range and the resolved vocabulary.
pub(crate) struct Job<F> {
    pub factory: Arc<F>,
    pub config: EncodingConfig,
    pub documents: Arc<[Document]>,
    pub ids: IdRange,
    pub vocabulary: Arc<VocabularyTable>,
}

impl<F> Job<F>
where
    F: EncoderFactory,
{
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// A handle for the calling thread.
    pub fn sequential_adapter(&self) -> Result<EncoderAdapter<F::Encoder>> {
        let handle = self.factory.build()?;
        Ok(EncoderAdapter::new(
            handle,
            Arc::clone(&self.vocabulary),
            self.ids,
        ))
    }

    /// Encodes every document from position `start` onward on the calling
    /// thread, `batch_size` documents per encoder call.
    pub fn encode_sequential(&self, start: usize) -> Result<Vec<EncodedRecord>> {
        let mut adapter = self.sequential_adapter()?;
        let remaining = self.documents.get(start..).unwrap_or_default();

        let mut records = Vec::with_capacity(remaining.len());
        for (index, batch) in remaining.chunks(self.config.batch_size).enumerate() {
            records.extend(adapter.encode_guarded(batch, 0, index)?);
        }
        Ok(records)
    }

    /// Starts a dispatcher over chunks of at most `max_chunk` documents.
    pub fn dispatcher(&self, workers: usize, max_chunk: usize, window: usize) -> Result<ChunkDispatcher<F>> {
        let size = chunk_size(self.len(), workers).min(max_chunk);
        let plan = ChunkPlan::new(Arc::clone(&self.documents), size, 0);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Dispatching {} documents as {} chunks of up to {size} on {workers} workers",
            self.len(),
            plan.len()
        );

        ChunkDispatcher::spawn(
            Arc::clone(&self.factory),
            Arc::clone(&self.vocabulary),
            self.ids,
            plan,
            DispatchOptions {
                workers,
                window,
                timeout: self.config.timeout,
                retry_attempts: self.config.retry_attempts,
                confine_encoders: self.config.confine_encoders,
            },
        )
    }

    /// Encodes every document on a worker pool and restores document order.
    pub fn encode_parallel(&self, workers: usize) -> Result<Vec<EncodedRecord>> {
        let dispatcher = self.dispatcher(workers, usize::MAX, usize::MAX)?;
        let chunk_count = dispatcher.chunk_count();
        let outputs = dispatcher.dispatch_all()?;

        #[cfg(feature = "tracing")]
        tracing::debug!("Assembling {chunk_count} chunk results");

        ResultAssembler::assemble(outputs, chunk_count)
    }
}
