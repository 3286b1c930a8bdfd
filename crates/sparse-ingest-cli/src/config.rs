use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::time::Duration;
use sparse_ingest::{EncodingConfig, Parallelism};
use std::path::PathBuf;

/// When the parallel stage is used.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParallelMode {
    /// Parallel above `--parallel-threshold` documents.
    Auto,
    Always,
    Never,
}

impl From<ParallelMode> for Parallelism {
    fn from(mode: ParallelMode) -> Self {
        match mode {
            ParallelMode::Auto => Self::Auto,
            ParallelMode::Always => Self::Always,
            ParallelMode::Never => Self::Never,
        }
    }
}

/// Runtime configuration for the `sparse-ingest` binary.
///
/// Every option can also be supplied through the environment (or a `.env`
/// file in the working directory).
#[derive(Parser, Debug, Clone)]
#[command(
    name = "sparse-ingest",
    version,
    about = "Encode documents into ordered sparse vectors, one JSON record per line"
)]
pub struct CliArgs {
    /// File with one document per line. Reads stdin when omitted.
    pub input: Option<PathBuf>,

    /// Where to write the JSON lines. Writes to stdout when omitted.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Vocabulary file, one token per line; line `i` becomes dimension `i`.
    ///
    /// When omitted, the vocabulary is built from the input itself in order
    /// of first appearance.
    ///
    /// Environment variable: `VOCABULARY_PATH`
    #[arg(long, env = "VOCABULARY_PATH")]
    pub vocabulary: Option<PathBuf>,

    /// Maximum number of records per output batch.
    ///
    /// Environment variable: `BATCH_SIZE`
    #[arg(long, env = "BATCH_SIZE", default_value_t = sparse_ingest::DEFAULT_BATCH_SIZE)]
    pub batch_size: usize,

    /// Number of encoder workers. Defaults to `min(4, cores)`.
    ///
    /// Environment variable: `MAX_WORKERS`
    #[arg(long, env = "MAX_WORKERS")]
    pub max_workers: Option<usize>,

    /// Environment variable: `PARALLEL_MODE`
    #[arg(long, env = "PARALLEL_MODE", value_enum, default_value_t = ParallelMode::Auto)]
    pub parallel: ParallelMode,

    /// Document count above which `auto` mode goes parallel.
    ///
    /// Environment variable: `PARALLEL_THRESHOLD`
    #[arg(long, env = "PARALLEL_THRESHOLD", default_value_t = sparse_ingest::DEFAULT_PARALLEL_THRESHOLD)]
    pub parallel_threshold: usize,

    /// Per-chunk deadline in seconds.
    ///
    /// Environment variable: `CHUNK_TIMEOUT_SECS`
    #[arg(long, env = "CHUNK_TIMEOUT_SECS", default_value_t = 300)]
    pub timeout_secs: u64,

    /// Retries per failed chunk before falling back to sequential encoding.
    ///
    /// Environment variable: `RETRY_ATTEMPTS`
    #[arg(long, env = "RETRY_ATTEMPTS", default_value_t = 0)]
    pub retry_attempts: u32,

    /// First record identifier. Use the offset logged by the previous run to
    /// append to the same store.
    ///
    /// Environment variable: `ID_OFFSET`
    #[arg(long, env = "ID_OFFSET", default_value_t = 0)]
    pub id_offset: u64,

    /// Let workers share one encoder handle instead of owning one each.
    #[arg(long, default_value_t = false)]
    pub shared_encoders: bool,

    /// Encode this query instead of documents and print its vector.
    #[arg(short, long)]
    pub query: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub vocabulary: Option<PathBuf>,
    pub query: Option<String>,
    pub encoding: EncodingConfig,
}

impl TryFrom<CliArgs> for IngestConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.batch_size == 0 {
            bail!("BATCH_SIZE must be greater than 0");
        }

        if args.max_workers == Some(0) {
            bail!("MAX_WORKERS must be greater than 0");
        }

        if args.timeout_secs == 0 {
            bail!("CHUNK_TIMEOUT_SECS must be greater than 0");
        }

        if args.query.as_deref().is_some_and(|q| q.trim().is_empty()) {
            bail!("--query must not be blank");
        }

        if let Some(path) = &args.input {
            if !path.is_file() {
                bail!("Input file {} does not exist", path.display());
            }
        }

        let mut encoding = EncodingConfig::default()
            .with_batch_size(args.batch_size)
            .with_parallelism(args.parallel.into())
            .with_parallel_threshold(args.parallel_threshold)
            .with_timeout(Duration::from_secs(args.timeout_secs))
            .with_retry_attempts(args.retry_attempts)
            .with_id_offset(args.id_offset)
            .with_confined_encoders(!args.shared_encoders);
        if let Some(workers) = args.max_workers {
            encoding = encoding.with_max_workers(workers);
        }
        encoding.validate()?;

        Ok(Self {
            input: args.input,
            output: args.output,
            vocabulary: args.vocabulary,
            query: args.query,
            encoding,
        })
    }
}
