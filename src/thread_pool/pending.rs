use std::mem;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use log::debug;

use super::JobPanic;
use crate::{PoolError, Result};

/// Lifecycle of a [`Pool`](super::Pool).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    /// Accepting jobs.
    Open,
    /// `wait` has begun; no new jobs are accepted.
    Draining,
    /// The queue is closed and every worker has exited.
    Closed,
}

struct Counts {
    state: PoolState,
    /// Jobs submitted but not yet finished.
    pending: usize,
    completed: u64,
    next_id: u64,
    panics: Vec<JobPanic>,
}

/// Pending-job counter and pool state, guarded by one lock.
///
/// Submission is admitted and counted in the same critical section that
/// checks the state, so a drain can never observe zero pending while an
/// admitted job is still on its way to a worker.
pub(crate) struct Ledger {
    counts: Mutex<Counts>,
    drained: Condvar,
}

impl Ledger {
    pub(crate) fn new() -> Self {
        Ledger {
            counts: Mutex::new(Counts {
                state: PoolState::Open,
                pending: 0,
                completed: 0,
                next_id: 0,
                panics: Vec::new(),
            }),
            drained: Condvar::new(),
        }
    }

    // Jobs never run under this lock.
    fn lock(&self) -> MutexGuard<'_, Counts> {
        self.counts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts a new job and returns its id, or fails if the pool is no
    /// longer open.
    pub(crate) fn admit(&self) -> Result<u64> {
        let mut counts = self.lock();
        if counts.state != PoolState::Open {
            return Err(PoolError::Closed);
        }
        counts.pending += 1;
        let id = counts.next_id;
        counts.next_id += 1;
        Ok(id)
    }

    /// Uncounts a job that was admitted but never reached a worker.
    pub(crate) fn retract(&self) {
        let mut counts = self.lock();
        self.decrement(&mut counts);
    }

    /// Records that a job has finished running, with its panic if any.
    pub(crate) fn finish(&self, panic: Option<JobPanic>) {
        let mut counts = self.lock();
        counts.completed += 1;
        counts.panics.extend(panic);
        self.decrement(&mut counts);
    }

    fn decrement(&self, counts: &mut Counts) {
        debug_assert!(counts.pending > 0, "pending count underflow");
        counts.pending -= 1;
        if counts.pending == 0 {
            self.drained.notify_all();
        }
    }

    /// Stops admitting jobs and blocks until none are pending.
    ///
    /// Only the first call succeeds; later calls return
    /// [`PoolError::AlreadyWaited`] without blocking.
    pub(crate) fn drain(&self) -> Result<()> {
        let mut counts = self.lock();
        if counts.state != PoolState::Open {
            return Err(PoolError::AlreadyWaited);
        }
        counts.state = PoolState::Draining;
        debug!("Draining {} pending job(s)", counts.pending);

        while counts.pending > 0 {
            counts = self
                .drained
                .wait(counts)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }

    pub(crate) fn close(&self) {
        self.lock().state = PoolState::Closed;
    }

    pub(crate) fn take_panics(&self) -> Vec<JobPanic> {
        mem::take(&mut self.lock().panics)
    }

    pub(crate) fn state(&self) -> PoolState {
        self.lock().state
    }

    pub(crate) fn pending(&self) -> usize {
        self.lock().pending
    }

    pub(crate) fn completed(&self) -> u64 {
        self.lock().completed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use super::*;

    #[test]
    fn admit_assigns_sequential_ids() {
        let ledger = Ledger::new();
        assert_eq!(ledger.admit().unwrap(), 0);
        assert_eq!(ledger.admit().unwrap(), 1);
        assert_eq!(ledger.admit().unwrap(), 2);
        assert_eq!(ledger.pending(), 3);
    }

    #[test]
    fn finish_and_retract_decrement() {
        let ledger = Ledger::new();
        ledger.admit().unwrap();
        ledger.admit().unwrap();

        ledger.retract();
        assert_eq!(ledger.pending(), 1);
        assert_eq!(ledger.completed(), 0);

        ledger.finish(None);
        assert_eq!(ledger.pending(), 0);
        assert_eq!(ledger.completed(), 1);
    }

    #[test]
    fn drain_with_nothing_pending_returns() {
        let ledger = Ledger::new();
        ledger.drain().unwrap();
        assert_eq!(ledger.state(), PoolState::Draining);
    }

    #[test]
    fn drain_blocks_until_pending_reaches_zero() {
        let ledger = Arc::new(Ledger::new());
        ledger.admit().unwrap();

        let finisher = {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(100));
                ledger.finish(None);
            })
        };

        ledger.drain().unwrap();
        assert_eq!(ledger.pending(), 0);
        assert_eq!(ledger.completed(), 1);
        finisher.join().unwrap();
    }

    #[test]
    fn admit_rejected_once_draining() {
        let ledger = Ledger::new();
        ledger.drain().unwrap();

        assert!(matches!(ledger.admit(), Err(PoolError::Closed)));
        assert_eq!(ledger.pending(), 0);
    }

    #[test]
    fn second_drain_is_rejected() {
        let ledger = Ledger::new();
        ledger.drain().unwrap();
        ledger.close();

        assert!(matches!(ledger.drain(), Err(PoolError::AlreadyWaited)));
        assert_eq!(ledger.state(), PoolState::Closed);
    }

    #[test]
    fn panics_are_collected_once() {
        let ledger = Ledger::new();
        ledger.admit().unwrap();
        ledger.finish(Some(JobPanic {
            job: 0,
            worker: 3,
            message: "boom".to_owned(),
        }));

        let panics = ledger.take_panics();
        assert_eq!(panics.len(), 1);
        assert_eq!(panics[0].worker, 3);
        assert!(ledger.take_panics().is_empty());
    }
}
