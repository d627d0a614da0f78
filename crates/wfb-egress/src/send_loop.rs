//! # Send Loop
//!
//! Drains the hand-off queue into a [`RawSender`] and records every send in
//! the link's [`TransferStats`].
//!
//! Per message:
//!
//! ```text
//! pop ─▶ occupancy ─▶ prepare (encode_time) ─▶ send (send_time)
//!     ─▶ flush = occupancy > max_queue_size ─▶ add_send_stats
//! ```
//!
//! Congestion never drops data: a send made above the high-water mark is
//! still performed and only flagged as a flush.
//!
//! Termination is cooperative. The [`CancelToken`] is checked at the top of
//! every iteration and right after `pop`; a message that was already popped
//! is always sent before the loop stops. Queue shutdown releases a blocked
//! `pop`.
//!
//! ```text
//! Running ──(cancel seen at loop top | queue shut down)──────────▶ Stopped
//! Running ──(cancel seen after pop)──▶ Draining ──(item sent)────▶ Stopped
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use quanta::Instant;
use tracing::{debug, error, info, trace, warn};
use wfb_telemetry::TransferStats;

use crate::message::Message;
use crate::queue::HandoffQueue;
use crate::sink::{RawSender, SendOutcome};

// ─── Cancellation ───────────────────────────────────────────────────────────

/// Shared cooperative termination flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

// ─── Configuration ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendLoopConfig {
    /// Queue occupancy above which a send counts as a flush.
    pub max_queue_size: u16,
    /// Name of the worker thread spawned by [`SendLoopHandle::spawn`].
    pub thread_name: String,
}

impl Default for SendLoopConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 100,
            thread_name: "wfb-send".into(),
        }
    }
}

// ─── Loop ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Running,
    Draining,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Cancelled,
    QueueShutdown,
}

/// Totals for one run of the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendLoopReport {
    pub messages: u64,
    pub flushes: u64,
    /// Sends where the raw sender returned an error.
    pub failures: u64,
    pub stop: StopReason,
}

pub struct SendLoop<S> {
    queue: Arc<HandoffQueue<Message>>,
    sender: S,
    stats: Arc<TransferStats>,
    max_queue_size: u16,
    cancel: CancelToken,
    state: LoopState,
    congested: bool,
    messages: u64,
    flushes: u64,
    failures: u64,
}

impl<S: RawSender> SendLoop<S> {
    pub fn new(
        queue: Arc<HandoffQueue<Message>>,
        sender: S,
        stats: Arc<TransferStats>,
        config: &SendLoopConfig,
        cancel: CancelToken,
    ) -> Self {
        SendLoop {
            queue,
            sender,
            stats,
            max_queue_size: config.max_queue_size,
            cancel,
            state: LoopState::Running,
            congested: false,
            messages: 0,
            flushes: 0,
            failures: 0,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Runs until cancelled or the queue shuts down.
    pub fn run(&mut self) -> SendLoopReport {
        debug!(
            link = %self.stats.name(),
            max_queue_size = self.max_queue_size,
            "send loop started"
        );

        let stop = loop {
            if self.cancel.is_cancelled() {
                break StopReason::Cancelled;
            }
            let Some(msg) = self.queue.pop() else {
                break StopReason::QueueShutdown;
            };
            let occupancy = self.queue.size();
            if self.cancel.is_cancelled() {
                self.state = LoopState::Draining;
                debug!(occupancy, "cancel observed, finishing in-flight message");
            }
            self.send_one(msg, occupancy);
        };

        self.state = LoopState::Stopped;
        let report = SendLoopReport {
            messages: self.messages,
            flushes: self.flushes,
            failures: self.failures,
            stop,
        };
        debug!(
            link = %self.stats.name(),
            messages = report.messages,
            flushes = report.flushes,
            failures = report.failures,
            stop = ?report.stop,
            "send loop stopped"
        );
        report
    }

    fn send_one(&mut self, msg: Message, occupancy: usize) {
        let blocks = msg.blocks();

        let start = Instant::now();
        let msg = self.sender.prepare(msg);
        let prepared = Instant::now();
        let encode_time = prepared.duration_since(start);
        self.stats.add_encode_time(encode_time);

        let len = msg.len();
        let outcome = match self.sender.send(msg) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.failures += 1;
                warn!(error = %e, bytes = len, "raw send failed");
                SendOutcome {
                    bytes_sent: 0,
                    inject_errors: 1,
                }
            }
        };
        let send_time = prepared.elapsed();
        self.stats.add_send_time(send_time);

        let flush = occupancy > self.max_queue_size as usize;
        self.track_congestion(flush, occupancy);

        self.stats.add_send_stats(
            outcome.bytes_sent,
            blocks,
            outcome.inject_errors,
            u32::try_from(occupancy).unwrap_or(u32::MAX),
            flush,
            encode_time + send_time,
        );
        self.messages += 1;

        trace!(
            bytes = outcome.bytes_sent,
            blocks,
            inject_errors = outcome.inject_errors,
            occupancy,
            flush,
            "message sent"
        );
    }

    fn track_congestion(&mut self, flush: bool, occupancy: usize) {
        if flush {
            self.flushes += 1;
        }
        if flush != self.congested {
            self.congested = flush;
            if flush {
                warn!(
                    occupancy,
                    max_queue_size = self.max_queue_size,
                    "send queue above high-water mark"
                );
            } else {
                info!(occupancy, "send queue back under high-water mark");
            }
        }
    }
}

// ─── Thread Handle ──────────────────────────────────────────────────────────

/// Owns the thread running a [`SendLoop`].
///
/// Dropping the handle cancels the loop, shuts the queue down and joins
/// the thread.
pub struct SendLoopHandle {
    queue: Arc<HandoffQueue<Message>>,
    cancel: CancelToken,
    handle: Option<thread::JoinHandle<SendLoopReport>>,
}

impl SendLoopHandle {
    pub fn spawn<S: RawSender + 'static>(
        queue: Arc<HandoffQueue<Message>>,
        sender: S,
        stats: Arc<TransferStats>,
        config: &SendLoopConfig,
    ) -> std::io::Result<Self> {
        let cancel = CancelToken::new();
        let mut send_loop =
            SendLoop::new(queue.clone(), sender, stats, config, cancel.clone());
        let handle = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || send_loop.run())?;

        Ok(Self {
            queue,
            cancel,
            handle: Some(handle),
        })
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }

    /// Waits up to `timeout` for the queue to empty, then shuts down.
    pub fn drain(&mut self, timeout: Duration) -> Option<SendLoopReport> {
        let deadline = Instant::now() + timeout;
        while !self.queue.is_empty() && !self.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        if !self.queue.is_empty() {
            warn!(remaining = self.queue.size(), "abandoning undrained messages");
        }
        self.shutdown()
    }

    /// Cancels the loop, releases a blocked `pop` and joins the thread.
    ///
    /// Returns the loop's report on the first call, `None` afterwards or if
    /// the thread panicked.
    pub fn shutdown(&mut self) -> Option<SendLoopReport> {
        self.cancel.cancel();
        self.queue.shutdown();
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(report) => Some(report),
            Err(_) => {
                error!("send loop thread panicked");
                None
            }
        }
    }
}

impl Drop for SendLoopHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
