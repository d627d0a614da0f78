//! # wfb-telemetry
//!
//! Rolling link-health statistics for the wfb broadcast bridge.
//!
//! One [`TransferStats`] aggregator exists per monitored link. The egress
//! thread feeds it per-send results, the FEC path feeds it counter deltas,
//! and reporting threads read [`TransferSnapshot`]s or the serialized text
//! record at any time. Every operation runs in its own short critical
//! section, so readers never observe a mix of two updates.
//!
//! ## Crate structure
//!
//! - [`stats`] — the `TransferStats` aggregator and its snapshot type
//! - [`record`] — fixed-order comma-separated text record (serialize/parse)
//! - [`ewma`] — fast-reacting fixed-weight smoothing
//! - [`fec`] — FEC decoder counters consumed as deltas
//! - [`error`] — record parse errors

pub mod error;
pub mod ewma;
pub mod fec;
pub mod record;
pub mod stats;

pub use error::StatsError;
pub use fec::FecDecoderStats;
pub use record::StatsRecord;
pub use stats::{TransferSnapshot, TransferStats};
