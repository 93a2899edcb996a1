//! Connection handler for individual WebSocket peers.
//!
//! Each upgraded socket gets its own `ConnectionHandler` that:
//! - Registers the peer with the coordinator
//! - Reads inbound frames and forwards them as coordinator commands
//! - Writes queued frames and liveness probes back to the socket
//! - Disconnects the peer exactly once when either side ends
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate's panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Connection errors are logged and result in graceful disconnect

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use relay_protocol::PeerId;

use crate::connections::{Outbound, PeerLink};
use crate::coordinator::{CoordinatorHandle, DisconnectReason};

/// Write timeout (10 seconds)
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that end a peer's writer.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Write timeout")]
    Timeout,

    #[error("WebSocket error: {0}")]
    Socket(String),
}

/// Connection handler for a single peer.
pub struct ConnectionHandler {
    /// Identity assigned on accept
    peer_id: PeerId,

    /// Handle to the coordinator
    coordinator: CoordinatorHandle,

    /// Server-wide shutdown signal
    shutdown: CancellationToken,

    /// Closes this peer only; a child of `shutdown`
    closer: CancellationToken,

    /// Outbound queue length
    send_queue: usize,
}

impl ConnectionHandler {
    /// Creates a handler with a freshly generated peer id.
    pub fn new(
        coordinator: CoordinatorHandle,
        shutdown: &CancellationToken,
        send_queue: usize,
    ) -> Self {
        Self {
            peer_id: PeerId::generate(),
            coordinator,
            shutdown: shutdown.clone(),
            closer: shutdown.child_token(),
            send_queue,
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    /// Runs the peer until the socket closes, a write fails, the
    /// coordinator terminates it, or the server shuts down.
    ///
    /// Returns the reason the peer was disconnected.
    pub async fn run(self, socket: WebSocket) -> DisconnectReason {
        let (tx, outbound) = mpsc::channel(self.send_queue.max(1));
        let link = PeerLink::new(tx, self.closer.clone());

        match self.coordinator.connect(self.peer_id.clone(), link).await {
            Ok(welcome) => {
                info!(
                    peer_id = %self.peer_id,
                    connected = welcome.connected,
                    "WebSocket peer connected"
                );
            }
            Err(e) => {
                warn!(peer_id = %self.peer_id, error = %e, "Rejecting WebSocket peer");
                return DisconnectReason::Closed;
            }
        }

        let (sink, stream) = socket.split();

        let writer = tokio::spawn(write_loop(
            sink,
            outbound,
            self.closer.clone(),
            self.peer_id.clone(),
        ));

        self.read_loop(stream).await;
        self.closer.cancel();

        let write_result = writer
            .await
            .unwrap_or_else(|e| Err(ConnectionError::Socket(e.to_string())));

        let reason = if self.shutdown.is_cancelled() {
            DisconnectReason::Shutdown
        } else if let Err(e) = &write_result {
            debug!(peer_id = %self.peer_id, error = %e, "Writer ended with error");
            DisconnectReason::WriteFailed
        } else {
            DisconnectReason::Closed
        };

        // No-op if the heartbeat already removed this peer
        self.coordinator.disconnect(self.peer_id.clone(), reason).await;
        reason
    }

    /// Forwards inbound frames until the peer closes or the link is closed.
    async fn read_loop(&self, mut stream: SplitStream<WebSocket>) {
        loop {
            let msg = tokio::select! {
                _ = self.closer.cancelled() => break,
                msg = stream.next() => msg,
            };

            match msg {
                Some(Ok(Message::Text(text))) => {
                    self.coordinator
                        .relay_frame(&self.peer_id, text.as_str())
                        .await;
                }
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => self.coordinator.relay_frame(&self.peer_id, text).await,
                    Err(_) => {
                        debug!(peer_id = %self.peer_id, "Dropping non-UTF-8 binary frame");
                    }
                },
                Some(Ok(Message::Pong(_))) => {
                    self.coordinator.liveness_ack(self.peer_id.clone()).await;
                }
                // axum answers pings on its own
                Some(Ok(Message::Ping(_))) => {}
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    debug!(peer_id = %self.peer_id, error = %e, "WebSocket read error");
                    break;
                }
            }
        }
    }
}

/// Writes queued frames to the socket until the link closes.
///
/// A failed or slow write cancels `closer` so the reader stops too.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Outbound>,
    closer: CancellationToken,
    peer_id: PeerId,
) -> Result<(), ConnectionError> {
    let result = loop {
        let frame = tokio::select! {
            _ = closer.cancelled() => break Ok(()),
            frame = outbound.recv() => frame,
        };

        let msg = match frame {
            Some(Outbound::Text(text)) => Message::Text(text.to_string().into()),
            Some(Outbound::Ping) => Message::Ping(Vec::new().into()),
            None => break Ok(()),
        };

        match timeout(WRITE_TIMEOUT, sink.send(msg)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => break Err(ConnectionError::Socket(e.to_string())),
            Err(_) => {
                warn!(peer_id = %peer_id, "Write timed out, closing peer");
                break Err(ConnectionError::Timeout);
            }
        }
    };

    closer.cancel();
    if result.is_ok() {
        // Best effort; the peer may already be gone
        let _ = timeout(WRITE_TIMEOUT, sink.send(Message::Close(None))).await;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::spawn_coordinator;

    #[test]
    fn test_connection_error_display() {
        assert_eq!(ConnectionError::Timeout.to_string(), "Write timeout");
        assert_eq!(
            ConnectionError::Socket("reset".to_string()).to_string(),
            "WebSocket error: reset"
        );
    }

    #[tokio::test]
    async fn test_closer_is_child_of_shutdown() {
        let coordinator = spawn_coordinator(10, "hi");
        let shutdown = CancellationToken::new();
        let handler = ConnectionHandler::new(coordinator, &shutdown, 8);

        shutdown.cancel();
        assert!(handler.closer.is_cancelled());
    }

    #[tokio::test]
    async fn test_handlers_get_distinct_ids() {
        let coordinator = spawn_coordinator(10, "hi");
        let shutdown = CancellationToken::new();
        let a = ConnectionHandler::new(coordinator.clone(), &shutdown, 8);
        let b = ConnectionHandler::new(coordinator, &shutdown, 8);

        assert_ne!(a.peer_id(), b.peer_id());
    }
}
