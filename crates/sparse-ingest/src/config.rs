use crate::{Error, Result};
use core::time::Duration;

/// Default number of records per yielded batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Inputs longer than this enable parallel mode under [`Parallelism::Auto`].
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 100;

/// Upper bound on the default worker count.
pub const DEFAULT_MAX_WORKERS: usize = 4;

/// Default per-chunk deadline.
pub const DEFAULT_CHUNK_TIMEOUT: Duration = Duration::from_secs(300);

/// Whether a run may use the worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Parallelism {
    /// Always dispatch chunks to the worker pool.
    Always,
    /// Always encode on the calling thread.
    Never,
    /// Use the pool only when the input is longer than
    /// [`EncodingConfig::parallel_threshold`].
    #[default]
    Auto,
}

impl From<bool> for Parallelism {
    fn from(parallel: bool) -> Self {
        if parallel { Self::Always } else { Self::Never }
    }
}

/// Execution strategy resolved for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Sequential,
    Parallel { workers: usize },
}

/// Options resolved once per pipeline invocation.
///
/// Every field has a default; the `with_*` methods adjust one at a time.
///
/// # Example
/// ```
/// use sparse_ingest::{EncodingConfig, Parallelism};
/// use std::time::Duration;
///
/// let config = EncodingConfig::default()
///     .with_batch_size(256)
///     .with_parallelism(Parallelism::Always)
///     .with_timeout(Duration::from_secs(30))
///     .with_id_offset(10_000);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodingConfig {
    /// Records per batch yielded by [`crate::BatchStream`]; also the chunk
    /// size of sequential encoding. Must be at least 1.
    pub batch_size: usize,
    /// Worker pool size. `None` resolves to `min(4, available cores)`.
    pub max_workers: Option<usize>,
    pub parallelism: Parallelism,
    pub parallel_threshold: usize,
    /// Deadline for a single chunk on a worker.
    pub timeout: Duration,
    /// Extra attempts granted to a failing chunk before the parallel stage
    /// is abandoned.
    pub retry_attempts: u32,
    /// First identifier assigned in this run.
    pub id_offset: u64,
    /// Give every worker its own encoder handle. Disable only for encoders
    /// whose factory can hand out shared handles that are safe to use
    /// concurrently.
    pub confine_encoders: bool,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_workers: None,
            parallelism: Parallelism::Auto,
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            timeout: DEFAULT_CHUNK_TIMEOUT,
            retry_attempts: 0,
            id_offset: 0,
            confine_encoders: true,
        }
    }
}

impl EncodingConfig {
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub const fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = Some(max_workers);
        self
    }

    #[must_use]
    pub const fn with_parallelism(mut self, parallelism: Parallelism) -> Self {
        self.parallelism = parallelism;
        self
    }

    #[must_use]
    pub const fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_retry_attempts(mut self, retry_attempts: u32) -> Self {
        self.retry_attempts = retry_attempts;
        self
    }

    #[must_use]
    pub const fn with_id_offset(mut self, id_offset: u64) -> Self {
        self.id_offset = id_offset;
        self
    }

    #[must_use]
    pub const fn with_confined_encoders(mut self, confine: bool) -> Self {
        self.confine_encoders = confine;
        self
    }

    /// Checks every constraint that can be checked without the input.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::configuration("batch_size must be at least 1"));
        }

        if self.max_workers == Some(0) {
            return Err(Error::configuration("max_workers must be at least 1"));
        }

        if self.timeout.is_zero() {
            return Err(Error::configuration("timeout must be greater than zero"));
        }

        Ok(())
    }

    /// Worker count used by the parallel stage.
    pub fn workers(&self) -> usize {
        self.max_workers
            .unwrap_or_else(|| DEFAULT_MAX_WORKERS.min(num_cpus::get()))
            .max(1)
    }

    /// Chooses sequential or parallel execution for `document_count` inputs.
    pub fn strategy(&self, document_count: usize) -> Strategy {
        let parallel = match self.parallelism {
            Parallelism::Always => true,
            Parallelism::Never => false,
            Parallelism::Auto => document_count > self.parallel_threshold,
        };

        if parallel {
            Strategy::Parallel {
                workers: self.workers(),
            }
        } else {
            Strategy::Sequential
        }
    }
}
