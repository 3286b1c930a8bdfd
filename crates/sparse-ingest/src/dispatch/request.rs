use super::Chunk;
use crate::{EncodedRecord, Result};
use crossbeam_channel::Sender;

/// A message sent from the dispatcher to an individual worker thread.
///
/// [`WorkRequest`]s travel over bounded single-slot channels and are consumed
/// by the worker's main loop.
#[derive(Debug)]
pub enum WorkRequest {
    /// Encode every document of `chunk` with one encoder call.
    ///
    /// - `chunk`: The unit of work.
    /// - `attempt`: 0 for the first try, incremented on each retry. Echoed in
    ///   the outcome so stale results can be told apart.
    Encode { chunk: Chunk, attempt: u32 },

    /// Request the worker to shut down gracefully.
    ///
    /// - `response`: Channel for acknowledging that the worker has left its
    ///   loop.
    Shutdown { response: Sender<()> },
}

/// A worker's report for one [`WorkRequest::Encode`].
#[derive(Debug)]
pub struct WorkOutcome {
    pub worker: usize,
    pub chunk: usize,
    pub attempt: u32,
    pub result: Result<Vec<EncodedRecord>>,
}
