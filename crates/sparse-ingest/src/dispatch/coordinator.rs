use super::assembler::ChunkOutput;
use super::chunk::{Chunk, ChunkPlan};
use super::pool::manager::WorkerPool;
use super::request::{WorkOutcome, WorkRequest};
use crate::encoder::{EncoderAdapter, EncoderFactory, build_handles};
use crate::{Error, IdRange, Result, VocabularyTable};
use core::time::Duration;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::iter::Peekable;
use std::sync::Arc;
use std::time::Instant;

/// Knobs for one parallel run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Upper bound on worker threads.
    pub workers: usize,
    /// How many chunks past the oldest unfinished one may be submitted.
    /// `usize::MAX` lifts the bound.
    pub window: usize,
    pub timeout: Duration,
    pub retry_attempts: u32,
    pub confine_encoders: bool,
}

struct InFlight {
    chunk: Chunk,
    attempt: u32,
    deadline: Option<Instant>,
}

/// Schedules chunks on a [`WorkerPool`] and yields their results as they
/// complete.
///
/// The dispatcher is pull driven: work is only submitted while the caller
/// iterates. Results come out in completion order; restoring document order is
/// the job of [`super::ResultAssembler`].
///
/// ## Failure handling
///
/// - A chunk whose encoder call fails, panics or misses its deadline is put
///   back in the queue until it has used `retry_attempts` retries. Retries are
///   submitted before new chunks.
/// - A worker whose chunk missed its deadline, or whose encoder panicked, is
///   retired and replaced by a worker with a freshly built handle, so the pool
///   keeps its size. Late results from a retired worker are discarded.
/// - If a replacement handle cannot be built, a timed-out worker is kept as
///   stalled and rejoins the idle set once its late result arrives.
/// - Once a chunk exhausts its retries, or no usable worker remains, the
///   iterator yields a single error and then ends.
pub struct ChunkDispatcher<F> {
    factory: Arc<F>,
    vocabulary: Arc<VocabularyTable>,
    ids: IdRange,
    pool: WorkerPool,
    plan: Peekable<ChunkPlan>,
    chunk_count: usize,
    retries: VecDeque<(Chunk, u32)>,
    idle: VecDeque<usize>,
    in_flight: HashMap<usize, InFlight>,
    stalled: HashSet<usize>,
    completed: BTreeSet<usize>,
    frontier: usize,
    options: DispatchOptions,
    failed: bool,
}

impl<F> ChunkDispatcher<F>
where
    F: EncoderFactory,
{
    /// Builds one encoder handle per worker and starts the pool.
    ///
    /// At most one worker per chunk is started.
    ///
    /// # Errors
    ///
    /// Returns the factory's error if a handle cannot be built, or
    /// [`Error::Pool`] if a thread cannot be spawned.
    pub fn spawn(
        factory: Arc<F>,
        vocabulary: Arc<VocabularyTable>,
        ids: IdRange,
        plan: ChunkPlan,
        options: DispatchOptions,
    ) -> Result<Self> {
        let chunk_count = plan.len();
        let workers = options.workers.min(chunk_count).max(1);

        let adapters = build_handles(&*factory, workers, options.confine_encoders)?
            .into_iter()
            .map(|handle| EncoderAdapter::new(handle, Arc::clone(&vocabulary), ids))
            .collect();
        let pool = WorkerPool::spawn(adapters)?;

        Ok(Self {
            factory,
            vocabulary,
            ids,
            idle: (0..pool.len()).collect(),
            pool,
            plan: plan.peekable(),
            chunk_count,
            retries: VecDeque::new(),
            in_flight: HashMap::new(),
            stalled: HashSet::new(),
            completed: BTreeSet::new(),
            frontier: 0,
            options,
            failed: false,
        })
    }

    /// Total number of chunks in this run.
    pub const fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn workers(&self) -> usize {
        self.pool.len()
    }

    /// Runs every chunk to completion and returns the outputs in completion
    /// order.
    ///
    /// # Errors
    ///
    /// Returns the first unrecoverable error.
    pub fn dispatch_all(self) -> Result<Vec<ChunkOutput>> {
        self.collect()
    }

    fn fill(&mut self) -> Result<()> {
        let limit = self.frontier.saturating_add(self.options.window);

        while let Some(&worker) = self.idle.front() {
            let (chunk, attempt) = if let Some(retry) = self.retries.pop_front() {
                retry
            } else if let Some(chunk) = self.plan.next_if(|c| c.index() < limit) {
                (chunk, 0)
            } else {
                break;
            };

            self.idle.pop_front();
            self.pool.submit(
                worker,
                WorkRequest::Encode {
                    chunk: chunk.clone(),
                    attempt,
                },
            )?;

            let deadline = Instant::now().checked_add(self.options.timeout);
            self.in_flight.insert(
                worker,
                InFlight {
                    chunk,
                    attempt,
                    deadline,
                },
            );
        }

        Ok(())
    }

    fn has_pending(&mut self) -> bool {
        !self.retries.is_empty() || self.plan.peek().is_some()
    }

    fn earliest_deadline(&self) -> Option<Instant> {
        self.in_flight.values().filter_map(|f| f.deadline).min()
    }

    fn on_outcome(&mut self, outcome: WorkOutcome) -> Result<Option<ChunkOutput>> {
        let current = self
            .in_flight
            .get(&outcome.worker)
            .is_some_and(|f| f.chunk.index() == outcome.chunk && f.attempt == outcome.attempt);

        if !current {
            if self.stalled.remove(&outcome.worker) {
                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "Worker {} recovered, discarding late result for chunk {}",
                    outcome.worker,
                    outcome.chunk
                );
                self.idle.push_back(outcome.worker);
            }
            return Ok(None);
        }

        let Some(flight) = self.in_flight.remove(&outcome.worker) else {
            return Ok(None);
        };

        match outcome.result {
            Ok(records) => {
                self.idle.push_back(outcome.worker);
                let index = flight.chunk.index();
                self.mark_completed(index);
                Ok(Some(ChunkOutput { index, records }))
            }
            Err(e) => {
                let panicked = matches!(e, Error::WorkerFailure { .. });
                self.retry_or_fail(flight, e)?;
                if panicked {
                    self.discard_worker(outcome.worker, false);
                } else {
                    self.idle.push_back(outcome.worker);
                }
                Ok(None)
            }
        }
    }

    fn expire(&mut self, now: Instant) -> Result<()> {
        let expired: Vec<usize> = self
            .in_flight
            .iter()
            .filter(|(_, f)| f.deadline.is_some_and(|d| d <= now))
            .map(|(&worker, _)| worker)
            .collect();

        for worker in expired {
            let Some(flight) = self.in_flight.remove(&worker) else {
                continue;
            };

            #[cfg(feature = "tracing")]
            tracing::warn!(
                "Chunk {} exceeded {:?} on worker {worker}, abandoning the worker",
                flight.chunk.index(),
                self.options.timeout
            );

            let error = Error::ChunkTimeout {
                chunk: flight.chunk.index(),
                timeout: self.options.timeout,
            };
            self.retry_or_fail(flight, error)?;
            self.discard_worker(worker, true);
        }

        Ok(())
    }

    /// Takes `worker` out of rotation and starts a replacement with a fresh
    /// handle. When no replacement can be started, a `stalled` worker waits
    /// for its late result and any other worker is retired for good.
    fn discard_worker(&mut self, worker: usize, stalled: bool) {
        match self.replace_worker(worker) {
            Ok(fresh) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Worker {worker} replaced by worker {fresh}");
                self.idle.push_back(fresh);
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Could not replace worker {worker}: {_e}");
                if stalled {
                    self.stalled.insert(worker);
                } else {
                    self.pool.retire(worker);
                }
            }
        }
    }

    fn replace_worker(&mut self, worker: usize) -> Result<usize> {
        let handle = self.factory.build()?;
        let adapter = EncoderAdapter::new(handle, Arc::clone(&self.vocabulary), self.ids);
        self.pool.replace(worker, adapter)
    }

    fn retry_or_fail(&mut self, flight: InFlight, error: Error) -> Result<()> {
        if flight.attempt < self.options.retry_attempts {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                "Retrying chunk {} (attempt {} of {}): {error}",
                flight.chunk.index(),
                flight.attempt + 2,
                self.options.retry_attempts + 1
            );
            self.retries.push_back((flight.chunk, flight.attempt + 1));
            return Ok(());
        }

        Err(Error::ChunkFailed {
            chunk: flight.chunk.index(),
            attempts: flight.attempt + 1,
            source: Box::new(error),
        })
    }

    fn mark_completed(&mut self, index: usize) {
        self.completed.insert(index);
        while self.completed.remove(&self.frontier) {
            self.frontier += 1;
        }
    }

    fn step(&mut self) -> Result<Option<ChunkOutput>> {
        loop {
            self.fill()?;

            if self.in_flight.is_empty() {
                if !self.has_pending() {
                    return Ok(None);
                }
                return Err(Error::Pool {
                    context: format!(
                        "no usable workers remain ({} stalled)",
                        self.stalled.len()
                    ),
                });
            }

            match self.pool.recv(self.earliest_deadline())? {
                Some(outcome) => {
                    if let Some(output) = self.on_outcome(outcome)? {
                        return Ok(Some(output));
                    }
                }
                None => self.expire(Instant::now())?,
            }
        }
    }
}

impl<F> Iterator for ChunkDispatcher<F>
where
    F: EncoderFactory,
{
    type Item = Result<ChunkOutput>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        match self.step() {
            Ok(output) => output.map(Ok),
            Err(e) => {
                self.failed = true;
                self.pool.shutdown();
                Some(Err(e))
            }
        }
    }
}
