//! Thread pool of confined encoder workers.
//!
//! This module defines the [`WorkerPool`] struct, which owns a set of worker
//! threads. Each worker listens on its own single-slot channel and
//! reports every outcome on one shared results channel. The pool does not
//! decide which worker gets which chunk; the dispatcher does, and it only
//! submits to workers it knows are idle, so a submit never blocks.

use super::worker::worker_loop;
use crate::dispatch::request::{WorkOutcome, WorkRequest};
use crate::encoder::{EncoderAdapter, SparseEncoder};
use crate::{Error, Result};
use core::time::Duration;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

/// How long [`WorkerPool::shutdown`] waits, in total, for acknowledgements.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(3);

/// A pool of encoder threads.
///
/// Workers are addressed by index. A retired worker keeps its index and is
/// never addressed again; its replacement gets a fresh one.
pub struct WorkerPool {
    workers: Vec<Option<Sender<WorkRequest>>>,
    threads: Vec<Option<JoinHandle<()>>>,
    results_tx: Sender<WorkOutcome>,
    results: Receiver<WorkOutcome>,
    shutdown_timeout: Duration,
    is_shutdown: bool,
}

impl WorkerPool {
    /// Spawns one thread per adapter. Worker `i` owns `adapters[i]`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pool`] if a thread cannot be spawned. Workers started
    /// before the failure are shut down with the pool.
    pub fn spawn<E>(adapters: Vec<EncoderAdapter<E>>) -> Result<Self>
    where
        E: SparseEncoder + 'static,
    {
        let (results_tx, results) = crossbeam_channel::unbounded();
        let mut pool = Self {
            workers: Vec::with_capacity(adapters.len()),
            threads: Vec::with_capacity(adapters.len()),
            results_tx,
            results,
            shutdown_timeout: SHUTDOWN_TIMEOUT,
            is_shutdown: false,
        };

        for adapter in adapters {
            pool.start(adapter)?;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Spawned {} encoder workers", pool.len());

        Ok(pool)
    }

    fn start<E>(&mut self, adapter: EncoderAdapter<E>) -> Result<usize>
    where
        E: SparseEncoder + 'static,
    {
        if self.is_shutdown {
            return Err(Error::Pool {
                context: "pool is shut down".to_string(),
            });
        }

        let worker_id = self.workers.len();
        // A single slot is enough: the dispatcher never queues a second
        // request behind a busy worker.
        let (tx, rx) = crossbeam_channel::bounded(1);
        let results = self.results_tx.clone();

        let handle = thread::Builder::new()
            .name(format!("sparse-encoder-{worker_id}"))
            .spawn(move || worker_loop(worker_id, rx, results, adapter))
            .map_err(|e| Error::Pool {
                context: format!("failed to spawn worker {worker_id}: {e}"),
            })?;

        self.workers.push(Some(tx));
        self.threads.push(Some(handle));
        Ok(worker_id)
    }

    /// Number of live workers.
    pub fn len(&self) -> usize {
        self.workers.iter().filter(|w| w.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts a new worker on `adapter`, then retires `worker`. Returns the
    /// new worker's index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pool`] if the new thread cannot be spawned, in which
    /// case `worker` stays live.
    pub fn replace<E>(&mut self, worker: usize, adapter: EncoderAdapter<E>) -> Result<usize>
    where
        E: SparseEncoder + 'static,
    {
        let fresh = self.start(adapter)?;
        self.retire(worker);
        Ok(fresh)
    }

    /// Detaches `worker`. Its request channel closes, so the thread exits as
    /// soon as its current encoder call returns. Anything it reports after
    /// that is still delivered through [`Self::recv`].
    pub fn retire(&mut self, worker: usize) {
        if let Some(slot) = self.workers.get_mut(worker) {
            slot.take();
        }
        if let Some(slot) = self.threads.get_mut(worker) {
            slot.take();
        }

        #[cfg(feature = "tracing")]
        tracing::debug!("Retired worker {worker}");
    }

    /// Hands `request` to worker `worker`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pool`] if the worker is retired, still holds an
    /// undelivered request, or its channel is closed.
    pub fn submit(&self, worker: usize, request: WorkRequest) -> Result<()> {
        let sender = self
            .workers
            .get(worker)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::Pool {
                context: format!("no live worker with index {worker}"),
            })?;

        match sender.try_send(request) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::Pool {
                context: format!("worker {worker} is busy"),
            }),
            Err(TrySendError::Disconnected(_)) => Err(Error::Pool {
                context: format!("worker {worker} channel closed"),
            }),
        }
    }

    /// Waits for the next outcome until `deadline`, or indefinitely when
    /// `deadline` is `None`. Returns `Ok(None)` once the deadline passes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pool`] if the results channel is disconnected.
    pub fn recv(&self, deadline: Option<Instant>) -> Result<Option<WorkOutcome>> {
        let received = match deadline {
            Some(deadline) => self.results.recv_deadline(deadline),
            None => self
                .results
                .recv()
                .map_err(|_| RecvTimeoutError::Disconnected),
        };

        match received {
            Ok(outcome) => Ok(Some(outcome)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(Error::Pool {
                context: "results channel closed".to_string(),
            }),
        }
    }

    /// Stops every live worker.
    ///
    /// - Sends a [`WorkRequest::Shutdown`] to each worker.
    /// - Waits up to [`SHUTDOWN_TIMEOUT`] overall for acknowledgements and
    ///   joins the workers that answered.
    /// - Detaches workers still stuck inside the encoder; they exit on their
    ///   own once the encoder returns, because their channels are closed.
    ///
    /// Calling it more than once is a no-op.
    pub fn shutdown(&mut self) {
        if self.is_shutdown {
            return;
        }
        self.is_shutdown = true;

        #[cfg(feature = "tracing")]
        tracing::debug!("Notifying all workers to shut down");

        let mut pending = Vec::with_capacity(self.workers.len());
        for (i, worker) in self.workers.iter().enumerate() {
            let Some(worker) = worker else { continue };
            let (tx, rx) = crossbeam_channel::bounded(1);
            match worker.try_send(WorkRequest::Shutdown { response: tx }) {
                Ok(()) => pending.push((i, rx)),
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Failed to send shutdown to worker {i}: {_e}");
                }
            }
        }

        // Dropping the senders closes every request channel, so even a
        // worker that missed the shutdown message leaves its loop.
        self.workers.clear();

        let deadline = Instant::now() + self.shutdown_timeout;
        for (i, rx) in pending {
            match rx.recv_deadline(deadline) {
                Ok(()) => {
                    if let Some(handle) = self.threads.get_mut(i).and_then(Option::take) {
                        if handle.join().is_err() {
                            #[cfg(feature = "tracing")]
                            tracing::error!("Worker {i} panicked during shutdown");
                        }
                    }
                }
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Worker {i} shutdown timed out, detaching it");
                }
            }
        }

        // Anything left is still inside the encoder.
        self.threads.clear();

        #[cfg(feature = "tracing")]
        tracing::debug!("Worker pool shutdown complete");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
