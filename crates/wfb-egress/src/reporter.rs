//! # Reporting Path
//!
//! The two non-egress inputs and outputs of a link's [`TransferStats`]:
//!
//! - [`FecDeltaTracker`] turns the FEC decoder's cumulative counters into
//!   the `(current, previous)` pairs the aggregator consumes.
//! - [`StatsReporter`] hands the aggregator to a sink on a fixed interval
//!   from a background thread; the default sink logs the serialized record.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use tracing::{error, info};
use wfb_telemetry::{FecDecoderStats, TransferStats};

/// Remembers the last FEC decoder snapshot fed to an aggregator.
#[derive(Debug, Clone, Copy, Default)]
pub struct FecDeltaTracker {
    previous: FecDecoderStats,
}

impl FecDeltaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a decoder that has already been running.
    pub fn with_baseline(baseline: FecDecoderStats) -> Self {
        FecDeltaTracker { previous: baseline }
    }

    /// Credit the progress since the last observation to `stats`.
    pub fn observe(&mut self, stats: &TransferStats, current: FecDecoderStats) {
        stats.add(&current, &self.previous);
        self.previous = current;
    }

    pub fn previous(&self) -> FecDecoderStats {
        self.previous
    }
}

/// Periodic reader of a link's statistics.
///
/// The default sink logs the record together with the snapshot's loss and
/// inject error ratios.
///
/// Dropping the reporter stops its thread.
pub struct StatsReporter {
    stop_tx: Option<Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl StatsReporter {
    /// Logs the serialized record at `info` every `interval`.
    pub fn spawn(stats: Arc<TransferStats>, interval: Duration) -> std::io::Result<Self> {
        Self::spawn_with(stats, interval, |stats| {
            let snap = stats.get_stats();
            info!(
                record = %stats.serialize(),
                block_error_ratio = snap.block_error_ratio(),
                inject_error_ratio = snap.inject_error_ratio(),
                "link stats"
            );
        })
    }

    /// Calls `sink` with the aggregator every `interval`.
    pub fn spawn_with<F>(
        stats: Arc<TransferStats>,
        interval: Duration,
        mut sink: F,
    ) -> std::io::Result<Self>
    where
        F: FnMut(&TransferStats) + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(0);
        let handle = thread::Builder::new()
            .name("wfb-stats".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => sink(&stats),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Self {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    /// Stops the reporting thread. Idempotent.
    pub fn stop(&mut self) {
        drop(self.stop_tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("stats reporter thread panicked");
            }
        }
    }
}

impl Drop for StatsReporter {
    fn drop(&mut self) {
        self.stop();
    }
}
