use std::io;
use thiserror::Error;

use crate::thread_pool::JobPanic;

/// Error type for pool operations.
#[derive(Error, Debug)]
pub enum PoolError {
    /// A pool needs at least one worker.
    #[error("Invalid worker count {0}: a pool needs at least one worker")]
    InvalidWorkerCount(usize),

    /// The pool no longer accepts jobs.
    #[error("Pool is closed")]
    Closed,

    /// `wait` was already called on this pool.
    #[error("Pool has already been waited on")]
    AlreadyWaited,

    /// One or more jobs panicked while the pool was running.
    #[error("{} job(s) panicked", .0.len())]
    JobsPanicked(Vec<JobPanic>),

    /// IO error from spawning a worker thread.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
