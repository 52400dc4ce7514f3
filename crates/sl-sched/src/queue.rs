//! Bounded dispatch queue between admission and the launch path.
//!
//! Single-consumer FIFO; entries are run ids, so the consumer re-reads the
//! run's current state at pop time instead of trusting a stale snapshot.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use std::time::Duration;

use sl_types::{RunId, SweepError};

#[derive(Debug)]
pub struct DispatchQueue {
    tx: Sender<RunId>,
    rx: Receiver<RunId>,
}

impl DispatchQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Enqueue a run for dispatch.  Admission guarantees a run enters the
    /// queue at most once; a full queue means that invariant broke upstream.
    pub fn push(&self, run_id: RunId) -> Result<(), SweepError> {
        self.tx.try_send(run_id).map_err(|e| match e {
            TrySendError::Full(id) => {
                SweepError::Internal(format!("dispatch queue full, dropping run {id}"))
            }
            TrySendError::Disconnected(id) => {
                SweepError::Internal(format!("dispatch queue closed, dropping run {id}"))
            }
        })
    }

    /// Pop one entry, waiting at most `timeout`.  `None` means empty; the
    /// loop treats that as its idle point.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<RunId> {
        match self.rx.recv_timeout(timeout) {
            Ok(run_id) => Some(run_id),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }
}
