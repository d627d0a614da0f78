//! # wfb-egress
//!
//! Outbound half of the wfb broadcast bridge.
//!
//! Producers push [`Message`]s into a [`HandoffQueue`]; a single send loop
//! drains it into a [`RawSender`] and reports every send into the link's
//! [`wfb_telemetry::TransferStats`]. The queue's high-water mark is a
//! congestion signal only: messages are never dropped, sends made while the
//! backlog exceeds it are counted as flushes.
//!
//! ## Crate structure
//!
//! - [`queue`] — unbounded FIFO with observable occupancy and shutdown
//! - [`message`] — ownership-transferred outbound chunk
//! - [`sink`] — raw send capability and the UDP injector
//! - [`send_loop`] — the consumer loop, its thread handle and cancellation
//! - [`reporter`] — FEC delta feeding and periodic stats reporting
//! - [`producer`] — stream input and the bridge's stop signal
//! - [`config`] — TOML bridge configuration

pub mod config;
pub mod message;
pub mod producer;
pub mod queue;
pub mod reporter;
pub mod send_loop;
pub mod sink;

pub use message::Message;
pub use producer::{StopCause, StopSignal};
pub use queue::{HandoffQueue, PushError};
pub use send_loop::{CancelToken, SendLoop, SendLoopConfig, SendLoopHandle};
pub use sink::{RawSender, SendOutcome};
