//! # Hand-off Queue
//!
//! Unbounded multi-producer FIFO between the bridge's producers and the
//! send loop.
//!
//! Capacity is not enforced here: `push` never blocks and never drops. The
//! consumer reads [`HandoffQueue::size`] and compares it against its own
//! high-water mark to detect congestion.
//!
//! `pop` blocks until an item arrives or the queue is shut down. Shutdown
//! closes a rendezvous channel, which wakes every blocked `pop` at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use thiserror::Error;

/// Error returned when an item is pushed after shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PushError {
    #[error("hand-off queue is shut down")]
    Shutdown,
}

pub struct HandoffQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    /// Dropped on shutdown; its receiver then reports disconnection.
    shutdown_tx: Mutex<Option<Sender<()>>>,
    shutdown_rx: Receiver<()>,
    closed: AtomicBool,
}

impl<T> HandoffQueue<T> {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        let (shutdown_tx, shutdown_rx) = bounded(0);
        HandoffQueue {
            tx,
            rx,
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            shutdown_rx,
            closed: AtomicBool::new(false),
        }
    }

    /// Appends an item. Never blocks.
    ///
    /// Returns `PushError::Shutdown` (dropping the item) once the queue has
    /// been shut down.
    pub fn push(&self, item: T) -> Result<(), PushError> {
        if self.is_shutdown() {
            return Err(PushError::Shutdown);
        }
        // Both ends live in `self`, so the channel cannot be disconnected.
        self.tx.send(item).map_err(|_| PushError::Shutdown)
    }

    /// Removes the oldest item, blocking while the queue is empty.
    ///
    /// A call made after shutdown returns `None` without consuming pending
    /// items.
    pub fn pop(&self) -> Option<T> {
        if self.is_shutdown() {
            return None;
        }
        select! {
            recv(self.shutdown_rx) -> _ => None,
            recv(self.rx) -> item => item.ok(),
        }
    }

    /// Current occupancy.
    pub fn size(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Releases every blocked `pop` and rejects further pushes. Idempotent.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        let tx = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(tx);
    }

    pub fn is_shutdown(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<T> Default for HandoffQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
