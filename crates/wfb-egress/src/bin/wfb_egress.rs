//! # wfb-egress
//!
//! Reads a byte stream from stdin, cuts it into messages and injects them
//! through the send loop towards a UDP target, logging the link's stats
//! record periodically.
//!
//! ## Usage
//!
//! ```bash
//! # Config file
//! wfb-egress --config bridge.toml < stream.ts
//!
//! # Minimal, target on the command line
//! wfb-egress --target 127.0.0.1:5600 --name wlan0 < stream.ts
//! ```
//!
//! Stops on EOF (after draining the queue) or on Ctrl-C, even while stdin
//! is open but idle.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::Parser;
use wfb_egress::config::{BridgeConfig, BridgeConfigInput};
use wfb_egress::producer::spawn_producer;
use wfb_egress::reporter::StatsReporter;
use wfb_egress::sink::UdpInjector;
use wfb_egress::{HandoffQueue, SendLoopHandle, StopCause, StopSignal};
use wfb_telemetry::TransferStats;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Inject a byte stream from stdin into a wfb link.
#[derive(Parser, Debug)]
#[command(name = "wfb-egress", about = "wfb packet egress bridge")]
struct Args {
    /// TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Link target `host:port` (overrides `[link] target`).
    #[arg(short, long)]
    target: Option<String>,

    /// Link name used in the stats record (overrides `[link] name`).
    #[arg(short, long)]
    name: Option<String>,
}

fn main() -> anyhow::Result<()> {
    // ── Logging ─────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .compact()
        .init();

    // ── Config ──────────────────────────────────────────────────
    let args = Args::parse();
    let config = load_config(&args)?;
    let target = config
        .link
        .target
        .ok_or_else(|| anyhow!("no link target configured (use --target or [link] target)"))?;

    tracing::info!(
        link = %config.link.name,
        %target,
        max_queue_size = config.send.max_queue_size,
        max_payload = config.link.max_payload,
        report_ms = config.report.interval.as_millis() as u64,
        "wfb-egress starting"
    );

    // ── Egress ──────────────────────────────────────────────────
    let stats = Arc::new(TransferStats::new(config.link.name.clone()));
    let queue = Arc::new(HandoffQueue::new());
    let injector = UdpInjector::connect(target)?;
    let mut egress =
        SendLoopHandle::spawn(queue.clone(), injector, stats.clone(), &config.send)?;
    let mut reporter = StatsReporter::spawn(stats.clone(), config.report.interval)?;

    // ── Stop sources ────────────────────────────────────────────
    let stop = StopSignal::new();
    {
        let notifier = stop.notifier();
        ctrlc::set_handler(move || {
            tracing::info!("interrupt received, stopping");
            notifier.notify(StopCause::Interrupted);
        })
        .context("install Ctrl-C handler")?;
    }
    // Left detached: it may still be blocked reading stdin when we exit.
    let _producer = spawn_producer(
        std::io::stdin(),
        queue.clone(),
        config.link.max_payload,
        stop.notifier(),
    )
    .context("spawn stdin producer")?;

    let cause = stop.wait();
    let report = match &cause {
        StopCause::Eof { bytes } => {
            tracing::info!(bytes, "end of input, draining queue");
            egress.drain(DRAIN_TIMEOUT)
        }
        StopCause::QueueClosed { bytes } => {
            tracing::warn!(bytes, "queue closed before end of input");
            egress.shutdown()
        }
        StopCause::Interrupted => egress.shutdown(),
        StopCause::ReadFailed(e) => {
            tracing::error!(error = %e, "reading stdin failed");
            egress.shutdown()
        }
    };
    reporter.stop();

    if let Some(report) = report {
        tracing::info!(
            messages = report.messages,
            flushes = report.flushes,
            failures = report.failures,
            "send loop finished"
        );
    }
    tracing::info!(record = %stats.serialize(), "final link stats");

    if let StopCause::ReadFailed(e) = cause {
        return Err(e).context("read stdin");
    }
    Ok(())
}

fn load_config(args: &Args) -> anyhow::Result<BridgeConfig> {
    let mut input = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            BridgeConfigInput::from_toml_str(&text)?
        }
        None => BridgeConfigInput::default(),
    };

    // Command-line values override the file.
    if let Some(target) = &args.target {
        input.link.target = Some(target.clone());
    }
    if let Some(name) = &args.name {
        input.link.name = Some(name.clone());
    }
    Ok(input.resolve()?)
}
