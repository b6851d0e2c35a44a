//! Bounded conduit carrying call results from executors to the aggregator.
//!
//! Submission never blocks: when the buffer is full the result is dropped and counted.
//! Blocking here would hold the submitting executor's ticket and shrink effective
//! concurrency, so bounded loss is preferred over a stall.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::sync::mpsc::{self, error::TrySendError};

use crate::{caller::CallResult, internal_event::ResultDropped};

/// Creates a pipeline holding at most `capacity` undelivered results.
///
/// `dropped` is shared with whoever wants to observe overflow; every dropped result
/// increments it.
pub fn channel(capacity: usize, dropped: Arc<AtomicU64>) -> (ResultSender, ResultReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let sender = ResultSender {
        tx,
        dropped,
        dropped_event: ResultDropped::register(),
    };
    (sender, ResultReceiver { rx })
}

/// Producer half. Cloned into every executor.
///
/// The pipeline closes when the last sender is dropped or [`close`](Self::close)d; once
/// closed, no handle exists that could submit to it.
#[derive(Clone)]
pub struct ResultSender {
    tx: mpsc::Sender<CallResult>,
    dropped: Arc<AtomicU64>,
    dropped_event: ResultDropped,
}

#[derive(Debug)]
pub struct ResultReceiver {
    rx: mpsc::Receiver<CallResult>,
}

impl ResultSender {
    /// Offers `result` without waiting. Returns `false` if it was dropped.
    pub fn submit(&self, result: CallResult) -> bool {
        match self.tx.try_send(result) {
            Ok(()) => true,
            Err(TrySendError::Full(result)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                self.dropped_event.emit(&result, total);
                false
            }
            Err(TrySendError::Closed(result)) => {
                // The receiver only goes away if the aggregator task died.
                self.dropped.fetch_add(1, Ordering::Relaxed);
                error!(
                    message = "Result pipeline has no receiver; dropping result.",
                    id = result.id,
                );
                false
            }
        }
    }

    /// Results dropped so far by any sender of this pipeline.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Closes this handle. The pipeline closes with the last one.
    pub fn close(self) {
        debug!(
            message = "Closing result sender.",
            outstanding_senders = self.tx.strong_count() - 1,
        );
    }
}

impl std::fmt::Debug for ResultSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSender")
            .field("capacity", &self.tx.max_capacity())
            .field("dropped", &self.dropped())
            .finish()
    }
}

impl ResultReceiver {
    /// Next result, or `None` once the pipeline is closed and drained.
    pub async fn recv(&mut self) -> Option<CallResult> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<CallResult> {
        self.rx.try_recv().ok()
    }

    /// Results buffered and not yet received.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
