//! Relay Client - watch or chat on a socket relay from the terminal
//!
//! # Usage
//!
//! ```bash
//! # Print all traffic, reconnecting if the relay goes away
//! relay watch
//!
//! # Chat: every stdin line is sent as a client:message
//! relay --url ws://relay.internal:4000/ws chat
//!
//! # Show client diagnostics on stderr
//! RUST_LOG=relay=debug relay watch
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use relay::render::{render_envelope, render_event};
use relay::{connect_with_retry, ClientConfig, ClientError, RelayClient, DEFAULT_URL};
use relay_protocol::ServerEvent;

/// Relay client - terminal peer for a socket relay
#[derive(Parser, Debug)]
#[command(name = "relay", version, about)]
struct Args {
    /// WebSocket URL of the relay
    #[arg(long, env = "RELAY_URL", default_value = DEFAULT_URL)]
    url: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print all traffic; reconnect with backoff when disconnected
    Watch,
    /// Send stdin lines as chat messages and print what others send
    Chat,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so they never mix with traffic on stdout
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("relay=warn".parse()?))
        .init();

    let args = Args::parse();
    let config = ClientConfig {
        url: args.url,
        ..Default::default()
    };

    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown_token.cancel();
        }
    });

    match args.command.unwrap_or(Command::Watch) {
        Command::Watch => watch(&config, &cancel_token).await,
        Command::Chat => chat(&config, &cancel_token).await,
    }
}

/// Prints one event, expanding history into its entries.
fn print_event(event: &ServerEvent, client: &RelayClient) {
    println!("{}", render_event(event, client.state()));
    if let ServerEvent::History(entries) = event {
        for entry in entries {
            println!("  {}", render_envelope(entry, client.state()));
        }
    }
}

/// Prints traffic until cancelled, reconnecting whenever the relay drops.
async fn watch(config: &ClientConfig, cancel: &CancellationToken) -> Result<()> {
    loop {
        let mut client = match connect_with_retry(config, cancel).await {
            Ok(client) => client,
            Err(ClientError::Cancelled) => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        info!(url = %config.url, "Connected to relay");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = client.close().await;
                    return Ok(());
                }
                event = client.next_event() => match event {
                    Ok(Some(event)) => print_event(&event, &client),
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "Connection lost");
                        break;
                    }
                }
            }
        }

        println!("* disconnected, reconnecting...");
    }
}

/// Chats until stdin ends, the relay goes away, or the user interrupts.
async fn chat(config: &ClientConfig, cancel: &CancellationToken) -> Result<()> {
    let mut client = match connect_with_retry(config, cancel).await {
        Ok(client) => client,
        Err(ClientError::Cancelled) => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = client.next_event() => match event? {
                Some(event) => print_event(&event, &client),
                None => {
                    println!("* relay closed the connection");
                    return Ok(());
                }
            },
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                match client.send_message(Value::String(text.to_string())).await {
                    Ok(echo) => println!("{}", render_envelope(&echo, client.state())),
                    Err(ClientError::NotJoined) => println!("* not joined yet, message dropped"),
                    Err(e) => return Err(e.into()),
                }
            }
        }
    }

    client.close().await.context("Failed to close connection")?;
    Ok(())
}
