use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use log::{debug, error, warn};

use crate::{PoolError, Result};

mod pending;
mod queue;
mod worker;

pub use self::pending::PoolState;
pub use self::worker::JobPanic;

use self::pending::Ledger;
use self::queue::{Task, WorkQueue};

/// A unit of work: runs once, takes nothing, returns nothing.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

const DEFAULT_THREAD_NAME: &str = "pool-worker";

/// Configuration for a [`Pool`].
///
/// Defaults to one worker per CPU, with threads named `pool-worker-{i}`.
#[derive(Debug, Clone)]
pub struct Builder {
    workers: usize,
    thread_name: String,
}

impl Default for Builder {
    fn default() -> Self {
        Builder {
            workers: num_cpus::get(),
            thread_name: DEFAULT_THREAD_NAME.to_owned(),
        }
    }
}

impl Builder {
    /// Creates a builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of worker threads.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the prefix of worker thread names; worker `i` is named
    /// `{prefix}-{i}`.
    pub fn thread_name(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name = prefix.into();
        self
    }

    /// Starts the workers and returns the running pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidWorkerCount`] for zero workers, or
    /// [`PoolError::Io`] if a worker thread cannot be spawned. In the
    /// latter case the workers already started are shut down first.
    pub fn build(self) -> Result<Pool> {
        if self.workers == 0 {
            return Err(PoolError::InvalidWorkerCount(self.workers));
        }

        let (queue, rx) = WorkQueue::new();
        let ledger = Arc::new(Ledger::new());
        let mut handles = Vec::with_capacity(self.workers);

        for index in 0..self.workers {
            let name = format!("{}-{}", self.thread_name, index);
            match worker::spawn_worker(index, name, rx.clone(), Arc::clone(&ledger)) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    error!("Failed to spawn worker {index}: {e}");
                    abort_startup(&queue, handles);
                    return Err(e.into());
                }
            }
        }

        debug!("Started pool with {} worker(s)", self.workers);
        Ok(Pool {
            workers: self.workers,
            queue,
            ledger,
            handles: Mutex::new(handles),
        })
    }
}

/// A fixed-size pool of worker threads fed through an unbuffered queue.
///
/// Any number of threads may submit jobs concurrently through a shared
/// reference. Each call to [`add_job`](Pool::add_job) blocks until a
/// worker takes the job. [`wait`](Pool::wait) finalizes the pool: it
/// blocks until every submitted job has finished, closes the queue and
/// joins the workers. A pool cannot be reopened.
///
/// Jobs run with no timeout. A job that calls `wait` on its own pool
/// will wait for itself forever.
///
/// Dropping a pool that was never waited on performs the same shutdown,
/// discarding any job panics.
///
/// ```
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
///
/// use workpool::Pool;
///
/// let pool = Pool::new(4)?;
/// let counter = Arc::new(AtomicUsize::new(0));
/// for _ in 0..10 {
///     let counter = Arc::clone(&counter);
///     pool.add_job(move || {
///         counter.fetch_add(1, Ordering::SeqCst);
///     })?;
/// }
/// pool.wait()?;
/// assert_eq!(counter.load(Ordering::SeqCst), 10);
/// # Ok::<(), workpool::PoolError>(())
/// ```
pub struct Pool {
    workers: usize,
    queue: WorkQueue,
    ledger: Arc<Ledger>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Pool {
    /// Creates a pool with `workers` threads and the default thread names.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidWorkerCount`] if `workers` is zero.
    pub fn new(workers: usize) -> Result<Self> {
        Builder::new().workers(workers).build()
    }

    /// Returns a [`Builder`] for configuring a pool.
    pub fn builder() -> Builder {
        Builder::new()
    }

    /// Submits a job, blocking until a worker accepts it.
    ///
    /// The job is counted as pending before any worker can see it, so a
    /// concurrent [`wait`](Pool::wait) cannot return until it has run.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] once `wait` has begun. The job is
    /// dropped without running.
    pub fn add_job<F>(&self, job: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.ledger.admit()?;
        if let Err(e) = self.queue.send(Task {
            id,
            job: Box::new(job),
        }) {
            self.ledger.retract();
            return Err(e);
        }
        debug!("Job {id} handed to a worker");
        Ok(())
    }

    /// Blocks until every submitted job has finished, then closes the
    /// queue and joins all workers.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::JobsPanicked`] listing every job that panicked
    /// during the pool's lifetime; the pool is still fully shut down.
    /// Returns [`PoolError::AlreadyWaited`] if `wait` was called before.
    pub fn wait(&self) -> Result<()> {
        self.shutdown()?;

        let panics = self.ledger.take_panics();
        if panics.is_empty() {
            Ok(())
        } else {
            Err(PoolError::JobsPanicked(panics))
        }
    }

    fn shutdown(&self) -> Result<()> {
        self.ledger.drain()?;
        self.queue.close();

        let handles = mem::take(
            &mut *self
                .handles
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        join_workers(handles);

        self.ledger.close();
        debug!("Pool closed after {} job(s)", self.ledger.completed());
        Ok(())
    }

    /// Number of worker threads the pool was started with.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Jobs submitted but not yet finished.
    pub fn pending(&self) -> usize {
        self.ledger.pending()
    }

    /// Jobs that have finished running, including those that panicked.
    pub fn completed(&self) -> u64 {
        self.ledger.completed()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PoolState {
        self.ledger.state()
    }
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("workers", &self.workers)
            .field("state", &self.state())
            .field("pending", &self.pending())
            .finish()
    }
}

impl Drop for Pool {
    fn drop(&mut self) {
        if self.state() != PoolState::Open {
            return;
        }
        if self.shutdown().is_ok() {
            let panics = self.ledger.take_panics();
            if !panics.is_empty() {
                warn!(
                    "Pool dropped without wait, discarding {} job panic(s)",
                    panics.len()
                );
            }
        }
    }
}

/// Shuts down the workers started before a failed spawn.
fn abort_startup(queue: &WorkQueue, handles: Vec<JoinHandle<()>>) {
    queue.close();
    join_workers(handles);
}

fn join_workers(handles: Vec<JoinHandle<()>>) {
    for handle in handles {
        if handle.join().is_err() {
            error!("Worker thread panicked outside of a job");
        }
    }
}
