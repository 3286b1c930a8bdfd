//! Parallel chunk dispatch and order restoration.
//!
//! ## Structure
//!
//! - [`chunk`] - partitioning of the input into contiguous chunks.
//! - [`pool`] - worker threads, each owning one encoder handle.
//! - [`coordinator`] - [`ChunkDispatcher`], which schedules chunks on the
//!   pool and applies deadlines and retries.
//! - [`assembler`] - [`ResultAssembler`], which puts completed chunks back in
//!   document order.

pub mod assembler;
pub mod chunk;
pub mod coordinator;
pub mod pool;
pub mod request;

pub use assembler::{ChunkOutput, ResultAssembler};
pub use chunk::{Chunk, ChunkPlan, chunk_size};
pub use coordinator::{ChunkDispatcher, DispatchOptions};
