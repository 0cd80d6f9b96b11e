use std::sync::{Mutex, PoisonError};

use crossbeam::channel::{self, Receiver, Sender};

use super::Job;
use crate::{PoolError, Result};

/// A job tagged with its submission sequence number.
pub(crate) struct Task {
    pub(crate) id: u64,
    pub(crate) job: Job,
}

/// The handoff channel between submitters and workers.
///
/// The underlying channel has zero capacity, so a send completes only
/// once some worker has received the task. Closing drops the queue's
/// sender; receivers see end-of-stream once every in-flight send that
/// cloned it has finished.
pub(crate) struct WorkQueue {
    tx: Mutex<Option<Sender<Task>>>,
}

impl WorkQueue {
    /// Creates an open queue and the receiver workers clone from.
    pub(crate) fn new() -> (Self, Receiver<Task>) {
        let (tx, rx) = channel::bounded(0);
        let queue = WorkQueue {
            tx: Mutex::new(Some(tx)),
        };
        (queue, rx)
    }

    /// Hands `task` to a worker, blocking until one receives it.
    pub(crate) fn send(&self, task: Task) -> Result<()> {
        // Clone so the lock is not held across the rendezvous.
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(PoolError::Closed)?;
        tx.send(task).map_err(|_| PoolError::Closed)
    }

    /// Stops the queue from accepting tasks. Idempotent.
    pub(crate) fn close(&self) {
        self.tx.lock().unwrap_or_else(PoisonError::into_inner).take();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    fn task(id: u64) -> Task {
        Task {
            id,
            job: Box::new(|| {}),
        }
    }

    #[test]
    fn send_blocks_until_received() {
        let (queue, rx) = WorkQueue::new();
        let queue = Arc::new(queue);
        let sent = Arc::new(AtomicBool::new(false));

        let sender = {
            let queue = Arc::clone(&queue);
            let sent = Arc::clone(&sent);
            thread::spawn(move || {
                queue.send(task(7)).unwrap();
                sent.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(100));
        assert!(!sent.load(Ordering::SeqCst));

        let received = rx.recv().unwrap();
        assert_eq!(received.id, 7);
        sender.join().unwrap();
        assert!(sent.load(Ordering::SeqCst));
    }

    #[test]
    fn close_ends_receivers() {
        let (queue, rx) = WorkQueue::new();
        let worker = thread::spawn(move || rx.iter().count());

        queue.close();
        assert_eq!(worker.join().unwrap(), 0);
    }

    #[test]
    fn send_after_close_fails() {
        let (queue, _rx) = WorkQueue::new();
        queue.close();
        queue.close();

        assert!(matches!(queue.send(task(0)), Err(PoolError::Closed)));
    }

    #[test]
    fn send_without_receivers_fails() {
        let (queue, rx) = WorkQueue::new();
        drop(rx);

        assert!(matches!(queue.send(task(0)), Err(PoolError::Closed)));
    }
}
