use std::any::Any;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::Receiver;
use log::{debug, error};

use super::pending::Ledger;
use super::queue::Task;

/// A panic captured from a job by the worker that ran it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPanic {
    /// Submission sequence number of the job, starting at 0.
    pub job: u64,
    /// Index of the worker that ran the job.
    pub worker: usize,
    /// The panic message, when the payload was a string.
    pub message: String,
}

impl fmt::Display for JobPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "job {} panicked on worker {}: {}",
            self.job, self.worker, self.message
        )
    }
}

/// Spawns a named worker thread that runs tasks until the queue closes.
pub(crate) fn spawn_worker(
    index: usize,
    name: String,
    rx: Receiver<Task>,
    ledger: Arc<Ledger>,
) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(name)
        .spawn(move || run(index, rx, &ledger))
}

fn run(index: usize, rx: Receiver<Task>, ledger: &Ledger) {
    debug!("Worker {index} started");

    for Task { id, job } in rx.iter() {
        debug!("Worker {index} executing job {id}");
        // Catch panics so the worker loop continues and the job is
        // always counted as finished.
        let panic = panic::catch_unwind(AssertUnwindSafe(job))
            .err()
            .map(|payload| {
                let panic = JobPanic {
                    job: id,
                    worker: index,
                    message: panic_message(payload.as_ref()),
                };
                error!("Worker {index}: {panic}");
                panic
            });
        ledger.finish(panic);
        debug!("Worker {index} finished job {id}");
    }

    debug!("Worker {index}: queue closed, shutting down");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
