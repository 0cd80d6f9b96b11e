#![deny(missing_docs)]

//! A fixed-size worker pool.
//!
//! Jobs are handed to a bounded set of worker threads through an
//! unbuffered queue, so submitting blocks until a worker is free to take
//! the job. `wait` blocks until every submitted job has finished, then
//! closes the queue and joins the workers.

mod error;
/// The worker pool and its building blocks.
pub mod thread_pool;

pub use error::{PoolError, Result};
pub use thread_pool::{Builder, Job, JobPanic, Pool, PoolState};
