//! # Transfer Statistics
//!
//! Thread-safe aggregator of per-link transfer health.
//!
//! Two kinds of state live behind a single mutex:
//!
//! - **cumulative counters** (`u32`, modular): FEC sequences/blocks/bytes and
//!   their error counts, plus egress bytes, blocks, inject errors and flushes;
//! - **smoothed fields** ([`FastEwma`]): queue occupancy, encode/send/packet
//!   times in µs, latency and RSSI.
//!
//! Every public method takes the lock exactly once and never hands out a
//! reference to the guarded state.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::error::StatsError;
use crate::ewma::FastEwma;
use crate::fec::FecDecoderStats;
use crate::record::StatsRecord;

const US_PER_SEC: f64 = 1_000_000.0;

// ─── Snapshot ───────────────────────────────────────────────────────────────

/// Point-in-time copy of a [`TransferStats`].
///
/// RSSI is rounded to the nearest dBm and saturated to `i8`; every other
/// field is copied unchanged. Times are in µs.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransferSnapshot {
    pub name: String,
    pub sequences: u32,
    pub blocks_in: u32,
    pub bytes_in: u32,
    pub block_errors: u32,
    pub sequence_errors: u32,
    pub send_bytes: u32,
    pub send_blocks: u32,
    pub inject_errors: u32,
    pub flush_count: u32,
    pub queue_size: f32,
    pub encode_time: f32,
    pub send_time: f32,
    pub pkt_time: f32,
    pub latency: f32,
    pub rssi: i8,
}

impl TransferSnapshot {
    /// Fraction of received FEC packets that were lost (0.0-1.0).
    pub fn block_error_ratio(&self) -> f64 {
        if self.blocks_in == 0 {
            0.0
        } else {
            self.block_errors as f64 / self.blocks_in as f64
        }
    }

    /// Inject errors per block handed to the link.
    pub fn inject_error_ratio(&self) -> f64 {
        if self.send_blocks == 0 {
            0.0
        } else {
            self.inject_errors as f64 / self.send_blocks as f64
        }
    }
}

// ─── Aggregator ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Inner {
    name: String,
    sequences: u32,
    blocks_in: u32,
    bytes_in: u32,
    block_errors: u32,
    sequence_errors: u32,
    send_bytes: u32,
    send_blocks: u32,
    inject_errors: u32,
    flush_count: u32,
    queue_size: FastEwma,
    encode_time: FastEwma,
    send_time: FastEwma,
    pkt_time: FastEwma,
    latency: FastEwma,
    rssi: FastEwma,
}

/// Rolling transfer statistics for one link, shared across threads.
#[derive(Debug)]
pub struct TransferStats {
    inner: Mutex<Inner>,
}

impl TransferStats {
    /// Create an aggregator with every counter and average at zero.
    ///
    /// `name` becomes the first record field and must not contain a comma.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        debug_assert!(!name.contains(','), "link name {name:?} contains a comma");
        TransferStats {
            inner: Mutex::new(Inner {
                name,
                ..Inner::default()
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Accumulate the FEC decoder progress between two snapshots.
    ///
    /// `current` must be taken after `previous`. Differences and sums are
    /// modular, so a counter that wrapped upstream still yields its true
    /// delta and a regression never panics.
    pub fn add(&self, current: &FecDecoderStats, previous: &FecDecoderStats) {
        let mut s = self.lock();
        s.sequences = s
            .sequences
            .wrapping_add(current.total_blocks.wrapping_sub(previous.total_blocks));
        s.blocks_in = s
            .blocks_in
            .wrapping_add(current.total_packets.wrapping_sub(previous.total_packets));
        s.bytes_in = s
            .bytes_in
            .wrapping_add(current.bytes.wrapping_sub(previous.bytes));
        s.block_errors = s
            .block_errors
            .wrapping_add(current.dropped_packets.wrapping_sub(previous.dropped_packets));
        s.sequence_errors = s
            .sequence_errors
            .wrapping_add(current.dropped_blocks.wrapping_sub(previous.dropped_blocks));
    }

    /// Blend a received signal strength sample (dBm).
    pub fn add_rssi(&self, rssi: i8) {
        self.lock().rssi.update(rssi as f64);
    }

    /// Record the outcome of one send on the egress path.
    ///
    /// `queue_size` is the occupancy observed when the message was dequeued
    /// and `flush` marks a send made while that occupancy exceeded the
    /// congestion threshold.
    pub fn add_send_stats(
        &self,
        bytes: u32,
        blocks: u32,
        inject_errors: u16,
        queue_size: u32,
        flush: bool,
        pkt_time: Duration,
    ) {
        let mut s = self.lock();
        s.send_bytes = s.send_bytes.wrapping_add(bytes);
        s.send_blocks = s.send_blocks.wrapping_add(blocks);
        s.inject_errors = s.inject_errors.wrapping_add(inject_errors as u32);
        s.queue_size.update(queue_size as f64);
        if flush {
            s.flush_count = s.flush_count.wrapping_add(1);
        }
        s.pkt_time.update(pkt_time.as_secs_f64() * US_PER_SEC);
    }

    pub fn add_encode_time(&self, elapsed: Duration) {
        self.lock()
            .encode_time
            .update(elapsed.as_secs_f64() * US_PER_SEC);
    }

    pub fn add_send_time(&self, elapsed: Duration) {
        self.lock()
            .send_time
            .update(elapsed.as_secs_f64() * US_PER_SEC);
    }

    /// Blend a latency sample, already in reporting units.
    pub fn add_latency(&self, latency: f32) {
        self.lock().latency.update(latency as f64);
    }

    pub fn get_stats(&self) -> TransferSnapshot {
        let s = self.lock();
        TransferSnapshot {
            name: s.name.clone(),
            sequences: s.sequences,
            blocks_in: s.blocks_in,
            bytes_in: s.bytes_in,
            block_errors: s.block_errors,
            sequence_errors: s.sequence_errors,
            send_bytes: s.send_bytes,
            send_blocks: s.send_blocks,
            inject_errors: s.inject_errors,
            flush_count: s.flush_count,
            queue_size: s.queue_size.value(),
            encode_time: s.encode_time.value(),
            send_time: s.send_time.value(),
            pkt_time: s.pkt_time.value(),
            latency: s.latency.value(),
            // Float-to-int `as` saturates at the i8 bounds.
            rssi: s.rssi.value().round() as i8,
        }
    }

    pub fn name(&self) -> String {
        self.lock().name.clone()
    }

    /// Copy the current state into its record form.
    pub fn record(&self) -> StatsRecord {
        let s = self.lock();
        StatsRecord {
            name: s.name.clone(),
            sequences: s.sequences,
            blocks_in: s.blocks_in,
            bytes_in: s.bytes_in,
            block_errors: s.block_errors,
            sequence_errors: s.sequence_errors,
            send_bytes: s.send_bytes,
            send_blocks: s.send_blocks,
            inject_errors: s.inject_errors,
            queue_size: s.queue_size.value(),
            encode_time: s.encode_time.value(),
            send_time: s.send_time.value(),
            pkt_time: s.pkt_time.value(),
            latency: s.latency.value(),
            rssi: s.rssi.value(),
        }
    }

    /// Serialize to the single-line record format (see [`crate::record`]).
    pub fn serialize(&self) -> String {
        self.record().to_string()
    }

    /// Overwrite every record field from a serialized record.
    ///
    /// The record is fully decoded before the lock is taken, so on error
    /// the aggregator is left untouched. `flush_count` is not part of the
    /// record and keeps its local value.
    pub fn update(&self, record: &str) -> Result<(), StatsError> {
        let rec: StatsRecord = record.parse().map_err(|e| {
            debug!(error = %e, "rejected stats record");
            e
        })?;
        self.apply(rec);
        Ok(())
    }

    /// Overwrite every record field from an already decoded record.
    pub fn apply(&self, rec: StatsRecord) {
        let mut s = self.lock();
        s.name = rec.name;
        s.sequences = rec.sequences;
        s.blocks_in = rec.blocks_in;
        s.bytes_in = rec.bytes_in;
        s.block_errors = rec.block_errors;
        s.sequence_errors = rec.sequence_errors;
        s.send_bytes = rec.send_bytes;
        s.send_blocks = rec.send_blocks;
        s.inject_errors = rec.inject_errors;
        s.queue_size.set(rec.queue_size);
        s.encode_time.set(rec.encode_time);
        s.send_time.set(rec.send_time);
        s.pkt_time.set(rec.pkt_time);
        s.latency.set(rec.latency);
        s.rssi.set(rec.rssi);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn fec(
        blocks: u32,
        packets: u32,
        dropped_packets: u32,
        dropped_blocks: u32,
        bytes: u32,
    ) -> FecDecoderStats {
        FecDecoderStats {
            total_blocks: blocks,
            total_packets: packets,
            dropped_packets,
            dropped_blocks,
            bytes,
        }
    }

    // ─── FEC Deltas ─────────────────────────────────────────────────────

    #[test]
    fn add_accumulates_deltas() {
        let stats = TransferStats::new("link0");
        let s0 = fec(10, 80, 2, 0, 10_000);
        let s1 = fec(15, 120, 5, 1, 16_000);
        let s2 = fec(20, 160, 5, 1, 22_000);
        stats.add(&s1, &s0);
        stats.add(&s2, &s1);

        let snap = stats.get_stats();
        assert_eq!(snap.sequences, 10);
        assert_eq!(snap.blocks_in, 80);
        assert_eq!(snap.bytes_in, 12_000);
        assert_eq!(snap.block_errors, 3);
        assert_eq!(snap.sequence_errors, 1);
    }

    #[test]
    fn add_handles_upstream_wraparound() {
        let stats = TransferStats::new("link0");
        let prev = fec(u32::MAX - 1, 0, 0, 0, u32::MAX);
        let cur = fec(2, 0, 0, 0, 9);
        stats.add(&cur, &prev);
        let snap = stats.get_stats();
        assert_eq!(snap.sequences, 4);
        assert_eq!(snap.bytes_in, 10);
    }

    #[test]
    fn add_identical_snapshots_is_noop() {
        let stats = TransferStats::new("link0");
        let s = fec(7, 7, 7, 7, 7);
        stats.add(&s, &s);
        let expected = TransferSnapshot {
            name: "link0".into(),
            ..TransferSnapshot::default()
        };
        assert_eq!(stats.get_stats(), expected);
    }

    // ─── Smoothing ──────────────────────────────────────────────────────

    #[test]
    fn rssi_first_sample_from_rest() {
        let stats = TransferStats::new("link0");
        stats.add_rssi(-50);
        assert_eq!(stats.get_stats().rssi, -49); // -49.0 after rounding
        assert!((stats.record().rssi - -49.0).abs() < 1e-4);
    }

    #[test]
    fn rssi_converges_within_two_percent() {
        let stats = TransferStats::new("link0");
        stats.add_rssi(-70);
        stats.add_rssi(-70);
        let v = stats.record().rssi;
        assert!((v - -70.0).abs() <= 0.02 * 70.0, "got {v}");
        assert_eq!(stats.get_stats().rssi, -70);
    }

    #[test]
    fn rssi_snapshot_saturates_to_i8() {
        let stats = TransferStats::new("link0");
        stats.update("l,0,0,0,0,0,0,0,0,0,0,0,0,0,-300.7").unwrap();
        assert_eq!(stats.get_stats().rssi, i8::MIN);
        stats.update("l,0,0,0,0,0,0,0,0,0,0,0,0,0,126.6").unwrap();
        assert_eq!(stats.get_stats().rssi, 127);
    }

    #[test]
    fn encode_and_send_times_are_microseconds() {
        let stats = TransferStats::new("link0");
        stats.add_encode_time(Duration::from_micros(500));
        stats.add_send_time(Duration::from_millis(2));
        let snap = stats.get_stats();
        assert!((snap.encode_time - 490.0).abs() < 1e-3);
        assert!((snap.send_time - 1960.0).abs() < 1e-2);
    }

    #[test]
    fn latency_is_not_scaled() {
        let stats = TransferStats::new("link0");
        stats.add_latency(10.0);
        assert!((stats.get_stats().latency - 9.8).abs() < 1e-5);
    }

    // ─── Send Stats ─────────────────────────────────────────────────────

    #[test]
    fn send_stats_concrete_scenario() {
        let stats = TransferStats::new("link0");
        stats.add_send_stats(1000, 5, 0, 2, false, Duration::from_millis(1));

        let snap = stats.get_stats();
        assert_eq!(snap.send_bytes, 1000);
        assert_eq!(snap.send_blocks, 5);
        assert_eq!(snap.inject_errors, 0);
        assert_eq!(snap.flush_count, 0);
        assert!((snap.pkt_time - 980.0).abs() < 1e-3);
        assert!((snap.queue_size - 1.96).abs() < 1e-6);

        let record = stats.serialize();
        assert!(record.starts_with("link0,0,0,0,0,0,1000,5,0,"), "{record}");
        assert_eq!(record, "link0,0,0,0,0,0,1000,5,0,1.96,0,0,980,0,0");
    }

    #[test]
    fn flush_counts_only_flagged_sends() {
        let stats = TransferStats::new("link0");
        stats.add_send_stats(100, 1, 0, 500, true, Duration::ZERO);
        assert_eq!(stats.get_stats().flush_count, 1);
        for _ in 0..4 {
            stats.add_send_stats(100, 1, 0, 0, false, Duration::ZERO);
        }
        stats.add_send_stats(100, 1, 0, 700, true, Duration::ZERO);
        assert_eq!(stats.get_stats().flush_count, 2);
    }

    #[test]
    fn inject_errors_accumulate() {
        let stats = TransferStats::new("link0");
        stats.add_send_stats(0, 1, 3, 0, false, Duration::ZERO);
        stats.add_send_stats(0, 1, 1, 0, false, Duration::ZERO);
        let snap = stats.get_stats();
        assert_eq!(snap.inject_errors, 4);
        assert!((snap.inject_error_ratio() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn block_error_ratio_from_fec_deltas() {
        let stats = TransferStats::new("link0");
        stats.add(&fec(4, 40, 2, 0, 0), &FecDecoderStats::default());
        assert!((stats.get_stats().block_error_ratio() - 0.05).abs() < 1e-9);
    }

    #[test]
    fn snapshot_ratios_zero_div() {
        let snap = TransferSnapshot::default();
        assert_eq!(snap.block_error_ratio(), 0.0);
        assert_eq!(snap.inject_error_ratio(), 0.0);
    }

    // ─── Record Restore ─────────────────────────────────────────────────

    #[test]
    fn update_restores_serialized_state() {
        let src = TransferStats::new("wlan1");
        src.add(&fec(3, 24, 1, 0, 4096), &FecDecoderStats::default());
        src.add_send_stats(1400, 8, 1, 3, false, Duration::from_micros(750));
        src.add_encode_time(Duration::from_micros(120));
        src.add_send_time(Duration::from_micros(600));
        src.add_latency(3.0);
        src.add_rssi(-61);

        let dst = TransferStats::new("placeholder");
        dst.update(&src.serialize()).unwrap();
        assert_eq!(dst.name(), "wlan1");
        assert_eq!(dst.serialize(), src.serialize());
    }

    #[test]
    fn failed_update_leaves_state_intact() {
        let stats = TransferStats::new("link0");
        stats.add_send_stats(1000, 5, 0, 2, false, Duration::from_millis(1));
        let before = stats.serialize();

        let err = stats.update("other,1,2,3").unwrap_err();
        assert!(matches!(err, StatsError::FieldCount { found: 4, .. }));
        let err = stats
            .update("other,1,2,3,4,5,6,7,8,9,10,11,12,13,abc")
            .unwrap_err();
        assert!(matches!(err, StatsError::InvalidField { field: "rssi", .. }));

        assert_eq!(stats.serialize(), before);
        assert_eq!(stats.name(), "link0");
    }

    #[test]
    fn non_finite_update_leaves_state_intact() {
        let stats = TransferStats::new("link0");
        stats.add_send_stats(1000, 5, 0, 2, false, Duration::from_millis(1));
        stats.add_rssi(-60);
        let before = stats.serialize();

        for record in [
            "peer,0,0,0,0,0,0,0,0,1e39,0,0,0,0,0",
            "peer,0,0,0,0,0,0,0,0,0,nan,0,0,0,0",
            "peer,0,0,0,0,0,0,0,0,0,0,inf,0,0,0",
            "peer,0,0,0,0,0,0,0,0,0,0,0,0,0,-inf",
        ] {
            let err = stats.update(record).unwrap_err();
            assert!(matches!(err, StatsError::InvalidField { .. }), "{record}");
        }
        assert_eq!(stats.serialize(), before);
        assert_eq!(stats.name(), "link0");

        // Still blends normally afterwards.
        stats.add_latency(10.0);
        assert!(stats.get_stats().latency.is_finite());
    }

    #[test]
    fn update_keeps_local_flush_count() {
        let stats = TransferStats::new("link0");
        stats.add_send_stats(0, 0, 0, 0, true, Duration::ZERO);
        stats.update("peer,0,0,0,0,0,0,0,0,0,0,0,0,0,0").unwrap();
        assert_eq!(stats.get_stats().flush_count, 1);
        assert_eq!(stats.name(), "peer");
    }

    // ─── Concurrency ────────────────────────────────────────────────────

    #[test]
    fn concurrent_writers_do_not_lose_updates() {
        let stats = Arc::new(TransferStats::new("link0"));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let stats = stats.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        stats.add_send_stats(10, 1, 0, 1, false, Duration::ZERO);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let snap = stats.get_stats();
        assert_eq!(snap.send_bytes, 40_000);
        assert_eq!(snap.send_blocks, 4_000);
    }

    #[test]
    fn snapshot_json_export() {
        let stats = TransferStats::new("link0");
        stats.add_send_stats(1000, 5, 0, 2, true, Duration::from_millis(1));
        let json = serde_json::to_string(&stats.get_stats()).unwrap();
        assert!(json.contains("\"send_bytes\":1000"), "{json}");
        assert!(json.contains("\"flush_count\":1"), "{json}");
        assert!(json.contains("\"name\":\"link0\""), "{json}");
    }

    #[test]
    #[should_panic(expected = "contains a comma")]
    #[cfg(debug_assertions)]
    fn comma_in_name_is_rejected_in_debug() {
        let _ = TransferStats::new("wlan0,wlan1");
    }
}
