//! SCTP association multiplexer binary.
//!
//! Runs one endpoint from the shared reDB configuration file. Readiness is
//! polled on a blocking thread; events delivered by the endpoint are logged
//! as JSON lines.

use anyhow::Context;
use clap::Parser;
use sctp_session::{Endpoint, InterestRegistry, KernelSockets, SctpEvent};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod logging;
mod poller;

use config::SctpServiceConfig;
use logging::RedbLogFormatter;

/// Event-driven SCTP association multiplexer
#[derive(Parser, Debug)]
#[command(name = "redb-sctp", version, about = "Event-driven SCTP association multiplexer")]
struct Args {
    /// Configuration file path
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Reconnect backoff unit, e.g. 500ms; overrides the configured one
    #[arg(long)]
    reconnect_backoff: Option<humantime::Duration>,

    /// Longest wait in one poll round
    #[arg(long, default_value = "100ms")]
    poll_interval: humantime::Duration,
}

fn env_filter(level: &str) -> anyhow::Result<EnvFilter> {
    Ok(EnvFilter::new("info")
        .add_directive(format!("redb_sctp={}", level).parse()?)
        .add_directive(format!("sctp_session={}", level).parse()?)
        .add_directive(format!("sctp_wire={}", level).parse()?))
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(&args.log_level)?)
        .with_target(false)
        .with_ansi(true)
        .event_format(RedbLogFormatter::new("sctp"))
        .with_filter_reloading();
    let filter_handle = subscriber.reload_handle();
    subscriber.init();

    info!("Starting reDB SCTP Service v{}", env!("CARGO_PKG_VERSION"));

    let service_config = SctpServiceConfig::load_from_file(&args.config)?;
    if service_config.endpoint.debug && args.log_level != "debug" {
        filter_handle
            .reload(env_filter("debug")?)
            .context("failed to raise log level")?;
        info!("Debug logging enabled by configuration");
    }

    let mut endpoint_config = service_config.endpoint.clone();
    if let Some(unit) = args.reconnect_backoff {
        endpoint_config.reconnect_backoff_unit = unit.into();
    }

    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<SctpEvent>();
    let registry = InterestRegistry::new();
    let mut endpoint = Endpoint::new(
        endpoint_config,
        Box::new(KernelSockets::new()),
        Box::new(registry.clone()),
        Box::new(event_tx),
    );

    let event_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => info!(component = "events", "{}", line),
                Err(e) => warn!(component = "events", "Failed to encode event {:?}: {}", event, e),
            }
        }
    });

    endpoint.map().context("failed to map endpoint")?;
    endpoint.start();
    info!("Endpoint running in {} mode", endpoint.mode_name());

    if let Some(request) = service_config.listen {
        endpoint.listen(request).context("initial listen failed")?;
    }
    if let Some(request) = service_config.connect {
        endpoint.connect(request).context("initial connect failed")?;
    }

    let running = Arc::new(AtomicBool::new(true));
    let poll_running = running.clone();
    let poll_interval: std::time::Duration = args.poll_interval.into();
    let mut poll_task = tokio::task::spawn_blocking(move || {
        poller::run(endpoint, registry, poll_running, poll_interval)
    });

    let (mut endpoint, outcome) = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Received Ctrl+C, shutting down");
            running.store(false, Ordering::SeqCst);
            (&mut poll_task).await.context("poll loop panicked")?
        }
        finished = &mut poll_task => finished.context("poll loop panicked")?,
    };

    endpoint.stop();
    if let Err(e) = endpoint.unmap() {
        warn!("Failed to unmap endpoint: {}", e);
    }
    drop(endpoint);

    if let Err(e) = event_task.await {
        warn!("Event task failed: {}", e);
    }

    info!("SCTP service shutdown complete");
    outcome
}
