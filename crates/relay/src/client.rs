//! WebSocket client for the relay.
//!
//! This module provides the `RelayClient` which handles:
//! - Connecting to the relay's WebSocket endpoint
//! - Decoding server envelopes into `ServerEvent`s and tracking the roster
//! - Sending `client:message` envelopes
//! - Reconnecting with exponential backoff via [`connect_with_retry`]
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::time::Duration;

use chrono::{SubsecRound, Utc};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relay_protocol::{Envelope, MessageType, ServerEvent};

use crate::error::{ClientError, Result};
use crate::state::ClientState;

/// Default relay endpoint.
pub const DEFAULT_URL: &str = "ws://127.0.0.1:4000/ws";

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the relay client.
///
/// # Example
///
/// ```rust
/// use relay::client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig {
///     url: "ws://relay.internal:4000/ws".to_string(),
///     retry_initial_delay: Duration::from_millis(500),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// WebSocket URL of the relay.
    pub url: String,

    /// Initial delay before first retry after connection failure.
    pub retry_initial_delay: Duration,

    /// Maximum delay between retry attempts.
    pub retry_max_delay: Duration,

    /// Multiplier for exponential backoff (e.g., 2.0 doubles delay each retry).
    pub retry_multiplier: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            retry_initial_delay: Duration::from_secs(1),
            retry_max_delay: Duration::from_secs(30),
            retry_multiplier: 2.0,
        }
    }
}

impl ClientConfig {
    /// Returns the delay to wait after `current`, capped at the maximum.
    #[must_use]
    pub fn next_delay(&self, current: Duration) -> Duration {
        let next_ms = (current.as_millis() as f64 * self.retry_multiplier) as u64;
        Duration::from_millis(next_ms).min(self.retry_max_delay)
    }
}

// ============================================================================
// Relay Client
// ============================================================================

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A connected relay peer.
///
/// Reading events keeps [`ClientState`] current; liveness probes from the
/// relay are answered while reading, so a client that stops calling
/// [`RelayClient::next_event`] will eventually be dropped by the relay.
pub struct RelayClient {
    socket: Socket,
    state: ClientState,
}

impl RelayClient {
    /// Opens a WebSocket to `url`.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Connection` if the handshake fails.
    pub async fn connect(url: &str) -> Result<Self> {
        let (socket, _response) =
            connect_async(url)
                .await
                .map_err(|e| ClientError::Connection {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;

        debug!(url, "WebSocket connected");
        Ok(Self {
            socket,
            state: ClientState::default(),
        })
    }

    /// What this peer has learned from the relay so far.
    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// Waits for the next envelope from the relay.
    ///
    /// Frames that are not valid envelopes are logged and skipped.
    /// Returns `Ok(None)` once the relay closes the connection.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Socket` on a transport failure.
    pub async fn next_event(&mut self) -> Result<Option<ServerEvent>> {
        loop {
            let text = match self.socket.next().await {
                Some(Ok(Message::Text(text))) => text.as_str().to_string(),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => text,
                    Err(_) => {
                        warn!("Skipping non-UTF-8 binary frame");
                        continue;
                    }
                },
                Some(Ok(Message::Close(_))) | None => {
                    info!("Relay closed the connection");
                    return Ok(None);
                }
                // Pings are answered by tungstenite itself
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            };

            match ServerEvent::from_frame(&text) {
                Ok(event) => {
                    self.state.apply(&event);
                    return Ok(Some(event));
                }
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable frame");
                }
            }
        }
    }

    /// Sends a `client:message` with `payload`.
    ///
    /// The relay never echoes a message to its sender, so the returned
    /// envelope is the local copy, stamped as the relay would stamp it.
    ///
    /// # Errors
    ///
    /// - `ClientError::NotJoined` before the welcome has been read
    /// - `ClientError::Socket` if the write fails
    pub async fn send_message(&mut self, payload: Value) -> Result<Envelope> {
        let own_id = self.state.own_id().cloned().ok_or(ClientError::NotJoined)?;

        let envelope = Envelope::new(MessageType::ClientMessage, Some(payload));
        self.send(&envelope).await?;
        self.state.record_local_send();

        Ok(envelope.stamped(&own_id, Utc::now().trunc_subsecs(3)))
    }

    /// Sends an arbitrary envelope as-is.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Socket` if the write fails.
    pub async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let json = envelope.to_json()?;
        self.socket.send(Message::Text(json.into())).await?;
        debug!(kind = %envelope.kind(), "Sent envelope");
        Ok(())
    }

    /// Closes the connection politely.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Socket` if the close frame cannot be sent.
    pub async fn close(mut self) -> Result<()> {
        self.socket.close(None).await?;
        Ok(())
    }
}

/// Connects to the relay, retrying with exponential backoff.
///
/// Retries indefinitely until a connection succeeds or `cancel` fires.
///
/// # Errors
///
/// Returns `ClientError::Cancelled` if cancelled while retrying.
pub async fn connect_with_retry(
    config: &ClientConfig,
    cancel: &CancellationToken,
) -> Result<RelayClient> {
    let mut delay = config.retry_initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt = attempt.saturating_add(1);
        debug!(attempt, url = %config.url, "Attempting to connect to relay");

        match RelayClient::connect(&config.url).await {
            Ok(client) => {
                debug!(attempt, "Connection successful");
                return Ok(client);
            }
            Err(e) if attempt == 1 => {
                warn!(error = %e, "Relay not reachable, will retry");
            }
            Err(e) => {
                debug!(attempt, error = %e, "Connection attempt failed");
            }
        }

        // Wait before retry, checking for cancellation
        tokio::select! {
            _ = sleep(delay) => {
                delay = config.next_delay(delay);
            }
            _ = cancel.cancelled() => {
                info!("Connection retry cancelled");
                return Err(ClientError::Cancelled);
            }
        }
    }
}
