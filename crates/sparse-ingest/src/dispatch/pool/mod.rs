//! Fixed-size pool of encoder threads.
//!
//! - [`manager`] - owns the worker channels and thread handles.
//! - [`worker`] - the loop each thread runs over its own encoder handle.

pub mod manager;
pub mod worker;
