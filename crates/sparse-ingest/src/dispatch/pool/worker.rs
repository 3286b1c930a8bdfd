use crate::dispatch::request::{WorkOutcome, WorkRequest};
use crate::encoder::{EncoderAdapter, SparseEncoder};
use crossbeam_channel::{Receiver, Sender};

/// Worker thread body responsible for processing [`WorkRequest`] messages.
///
/// Each worker owns its own [`EncoderAdapter`], and therefore its own encoder
/// handle, for its whole lifetime. The handle is never shared, so the encode
/// call itself needs no locking.
///
/// The loop runs until a [`WorkRequest::Shutdown`] arrives, the request
/// channel closes, or the dispatcher stops listening for results.
///
/// # Arguments
///
/// - `worker_id`: Index of this worker (used in logs and failure reports).
/// - `rx`: Receiver through which [`WorkRequest`]s arrive.
/// - `results`: Shared channel for [`WorkOutcome`]s.
/// - `adapter`: The worker's confined encoder.
pub fn worker_loop<E>(
    worker_id: usize,
    rx: Receiver<WorkRequest>,
    results: Sender<WorkOutcome>,
    mut adapter: EncoderAdapter<E>,
) where
    E: SparseEncoder,
{
    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} started");

    while let Ok(work) = rx.recv() {
        match work {
            WorkRequest::Encode { chunk, attempt } => {
                #[cfg(feature = "tracing")]
                tracing::trace!(
                    "Worker {worker_id} encoding chunk {} ({} documents, attempt {attempt})",
                    chunk.index(),
                    chunk.len()
                );

                let result = adapter.encode_guarded(chunk.documents(), worker_id, chunk.index());
                let outcome = WorkOutcome {
                    worker: worker_id,
                    chunk: chunk.index(),
                    attempt,
                    result,
                };

                if results.send(outcome).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::debug!("Worker {worker_id} exiting, dispatcher is gone");
                    break;
                }
            }
            WorkRequest::Shutdown { response } => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker_id} received shutdown signal");

                if response.send(()).is_err() {
                    #[cfg(feature = "tracing")]
                    tracing::error!("Worker {worker_id} failed to acknowledge shutdown");
                }
                break;
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::trace!("Worker {worker_id} stopped");
}
