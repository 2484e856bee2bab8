//! Bounded hand-off queue shared by the inbound and outbound pipelines.
//!
//! A thin wrapper over `tokio::sync::mpsc` that adds bounded-wait push,
//! bounded-wait pop and purge.  The receiver sits behind an async mutex so
//! the lifecycle manager can drain it while the worker is between polls.

use std::time::Duration;

use tokio::sync::mpsc::error::{SendTimeoutError, TrySendError};
use tokio::sync::{mpsc, Mutex};

/// Why an item could not be queued.  The rejected item is handed back.
#[derive(Debug)]
pub(crate) enum PushError<T> {
    /// Still full when the wait budget ran out.
    Full(T),
    /// The receiving side is gone.
    Closed(T),
}

pub(crate) struct BoundedQueue<T> {
    tx: mpsc::Sender<T>,
    rx: Mutex<mpsc::Receiver<T>>,
    capacity: usize,
}

impl<T: Send> BoundedQueue<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
            capacity,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    /// Queue `item`, waiting at most `wait` for room; `None` waits forever.
    pub(crate) async fn push(&self, item: T, wait: Option<Duration>) -> Result<(), PushError<T>> {
        match wait {
            None => self.tx.send(item).await.map_err(|e| PushError::Closed(e.0)),
            Some(budget) if budget.is_zero() => self.tx.try_send(item).map_err(|e| match e {
                TrySendError::Full(item) => PushError::Full(item),
                TrySendError::Closed(item) => PushError::Closed(item),
            }),
            Some(budget) => self
                .tx
                .send_timeout(item, budget)
                .await
                .map_err(|e| match e {
                    SendTimeoutError::Timeout(item) => PushError::Full(item),
                    SendTimeoutError::Closed(item) => PushError::Closed(item),
                }),
        }
    }

    /// Wait at most `wait` for the next item.
    pub(crate) async fn pop(&self, wait: Duration) -> Option<T> {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(wait, rx.recv()).await.ok().flatten()
    }

    /// Drop every queued item.  Returns how many were released.
    pub(crate) async fn purge(&self) -> usize {
        let mut rx = self.rx.lock().await;
        let mut purged = 0;
        while rx.try_recv().is_ok() {
            purged += 1;
        }
        purged
    }

    /// Number of items currently queued.
    pub(crate) fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }
}
