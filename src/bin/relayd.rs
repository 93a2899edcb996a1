//! Relay Daemon - WebSocket broadcast relay with history replay
//!
//! This binary accepts WebSocket peers, relays every message a peer sends
//! to all other peers, replays recent history to newcomers and serves a
//! small HTTP API for collaborators outside the channel.
//!
//! # Usage
//!
//! ```bash
//! # Start on the default port (4000) with WebSocket path /ws
//! relayd
//!
//! # Custom port and path
//! PORT=9000 WS_PATH=/socket relayd
//!
//! # Keep more history and probe peers every 10 seconds
//! relayd --history-capacity 200 --heartbeat-interval-ms 10000
//!
//! # Enable debug logging
//! RUST_LOG=relayd=debug relayd
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: Graceful shutdown (every peer is closed)

use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relayd::config::{
    DEFAULT_HOST, DEFAULT_MAX_FRAME_BYTES, DEFAULT_PORT, DEFAULT_SEND_QUEUE, DEFAULT_WS_PATH,
};
use relayd::coordinator::DEFAULT_WELCOME_MESSAGE;
use relayd::history::DEFAULT_HISTORY_CAPACITY;
use relayd::{spawn_coordinator, RelayConfig, RelayServer};

/// Relay daemon - real-time WebSocket broadcast relay
#[derive(Parser, Debug)]
#[command(name = "relayd", version, about)]
struct Args {
    /// Address to bind
    #[arg(long, env = "RELAY_HOST", default_value = DEFAULT_HOST)]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Path that accepts WebSocket upgrades
    #[arg(long, env = "WS_PATH", default_value = DEFAULT_WS_PATH)]
    ws_path: String,

    /// Number of messages kept for replay to new peers
    #[arg(long, env = "RELAY_HISTORY_CAPACITY", default_value_t = DEFAULT_HISTORY_CAPACITY)]
    history_capacity: usize,

    /// Milliseconds between liveness probes
    #[arg(long, env = "RELAY_HEARTBEAT_INTERVAL_MS", default_value_t = 30_000)]
    heartbeat_interval_ms: u64,

    /// Outbound frames buffered per peer before frames are dropped
    #[arg(long, env = "RELAY_SEND_QUEUE", default_value_t = DEFAULT_SEND_QUEUE)]
    send_queue: usize,

    /// Largest frame accepted from a peer, in bytes
    #[arg(long, default_value_t = DEFAULT_MAX_FRAME_BYTES)]
    max_frame_bytes: usize,

    /// Greeting sent to every new peer
    #[arg(long, default_value = DEFAULT_WELCOME_MESSAGE)]
    welcome_message: String,
}

impl From<Args> for RelayConfig {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            ws_path: args.ws_path,
            history_capacity: args.history_capacity,
            heartbeat_interval: Duration::from_millis(args.heartbeat_interval_ms),
            send_queue: args.send_queue,
            max_frame_bytes: args.max_frame_bytes,
            welcome_message: args.welcome_message,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("relayd=info".parse()?)
                .add_directive("relay_protocol=info".parse()?),
        )
        .init();

    let config = RelayConfig::from(Args::parse());
    config.validate().context("Invalid relay configuration")?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        "Relay daemon starting"
    );

    // Create cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    // Setup signal handlers
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let coordinator = spawn_coordinator(config.history_capacity, config.welcome_message.clone());
    info!(
        history_capacity = config.history_capacity,
        "Coordinator started"
    );

    let bind_addr = config.bind_addr();
    let ws_path = config.ws_path.clone();
    let server = RelayServer::new(config, coordinator, cancel_token)?;

    info!(addr = %bind_addr, ws_path = %ws_path, "Starting server");

    if let Err(e) = server.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Relay daemon stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
