//! Client interface for interacting with the CoordinatorActor.
//!
//! The `CoordinatorHandle` is a cheap-to-clone interface shared by the
//! WebSocket accept path, the HTTP routes and the heartbeat task.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate's panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel errors are mapped to `RelayError::ChannelClosed`

use relay_protocol::{Envelope, PeerId};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::commands::{
    CoordinatorCommand, DisconnectReason, HealthInfo, RelayError, SweepReport, Welcome,
};
use crate::connections::PeerLink;

// ============================================================================
// Coordinator Handle
// ============================================================================

/// Handle for interacting with the coordinator actor.
///
/// All methods are async and communicate with the actor via channels.
/// Commands sent from one task are processed in the order they were sent.
///
/// # Usage
///
/// ```ignore
/// let (link, outbound_rx) = PeerLink::channel(64);
/// let peer_id = PeerId::generate();
///
/// // Join: the peer's queue now holds welcome, history and roster
/// let welcome = handle.connect(peer_id.clone(), link).await?;
///
/// // Relay a raw frame from the socket
/// handle.relay_frame(&peer_id, r#"{"type":"client:message","payload":"hi"}"#).await;
///
/// // Leave
/// handle.disconnect(peer_id, DisconnectReason::Closed).await;
/// ```
#[derive(Clone)]
pub struct CoordinatorHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<CoordinatorCommand>,
}

impl CoordinatorHandle {
    /// Create a new coordinator handle.
    pub fn new(sender: mpsc::Sender<CoordinatorCommand>) -> Self {
        Self { sender }
    }

    /// Register a peer and queue its welcome, history and roster.
    ///
    /// Disconnecting the returned peer with [`Self::disconnect`] is the only
    /// way to take it off the roster besides a heartbeat timeout.
    ///
    /// # Errors
    ///
    /// - `RelayError::DuplicateId` if a peer with this id is registered
    /// - `RelayError::ChannelClosed` if the actor has shut down
    pub async fn connect(&self, peer_id: PeerId, link: PeerLink) -> Result<Welcome, RelayError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(CoordinatorCommand::Connect {
                peer_id,
                link,
                respond_to: tx,
            })
            .await
            .map_err(|_| RelayError::ChannelClosed)?;

        rx.await.map_err(|_| RelayError::ChannelClosed)?
    }

    /// Parse a raw frame from a peer and relay it to everyone else.
    ///
    /// Malformed frames are dropped here without telling the sender.
    pub async fn relay_frame(&self, peer_id: &PeerId, frame: &str) {
        match Envelope::from_client_frame(frame) {
            Ok(envelope) => self.relay(peer_id.clone(), envelope).await,
            Err(e) => {
                debug!(peer_id = %peer_id, error = %e, "Dropping malformed frame");
            }
        }
    }

    /// Relay an already parsed envelope from a peer.
    ///
    /// Fire-and-forget: send errors mean the actor is gone and are ignored.
    pub async fn relay(&self, peer_id: PeerId, envelope: Envelope) {
        let _ = self
            .sender
            .send(CoordinatorCommand::Message { peer_id, envelope })
            .await;
    }

    /// Record that a peer answered a liveness probe.
    pub async fn liveness_ack(&self, peer_id: PeerId) {
        let _ = self
            .sender
            .send(CoordinatorCommand::LivenessAck { peer_id })
            .await;
    }

    /// Remove a peer and notify the others.
    ///
    /// Idempotent. Returns `true` only for the call that actually removed
    /// the peer; `false` if it was already gone or the actor has stopped.
    pub async fn disconnect(&self, peer_id: PeerId, reason: DisconnectReason) -> bool {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(CoordinatorCommand::Disconnect {
                peer_id,
                reason,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            return false;
        }

        rx.await.unwrap_or(false)
    }

    /// Broadcast a message from outside the channel to every peer.
    ///
    /// # Errors
    ///
    /// - `RelayError::ChannelClosed` if the actor has shut down
    pub async fn submit(&self, payload: serde_json::Value) -> Result<bool, RelayError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(CoordinatorCommand::Submit {
                payload,
                respond_to: tx,
            })
            .await
            .map_err(|_| RelayError::ChannelClosed)?;

        rx.await.map_err(|_| RelayError::ChannelClosed)
    }

    /// Get the connected peer ids in join order.
    ///
    /// Returns an empty vector if communication with the actor fails.
    pub async fn list_client_ids(&self) -> Vec<PeerId> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(CoordinatorCommand::ListClients { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Get a copy of the history, oldest first.
    ///
    /// Returns an empty vector if communication with the actor fails.
    pub async fn history_snapshot(&self) -> Vec<Envelope> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(CoordinatorCommand::GetHistory { respond_to: tx })
            .await
            .is_err()
        {
            return Vec::new();
        }

        rx.await.unwrap_or_default()
    }

    /// Get relay status.
    ///
    /// # Errors
    ///
    /// - `RelayError::ChannelClosed` if the actor has shut down
    pub async fn health_info(&self) -> Result<HealthInfo, RelayError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(CoordinatorCommand::Health { respond_to: tx })
            .await
            .map_err(|_| RelayError::ChannelClosed)?;

        rx.await.map_err(|_| RelayError::ChannelClosed)
    }

    /// Run one heartbeat sweep and wait for its outcome.
    ///
    /// # Errors
    ///
    /// - `RelayError::ChannelClosed` if the actor has shut down
    pub async fn heartbeat_sweep(&self) -> Result<SweepReport, RelayError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(CoordinatorCommand::HeartbeatSweep { respond_to: tx })
            .await
            .map_err(|_| RelayError::ChannelClosed)?;

        rx.await.map_err(|_| RelayError::ChannelClosed)
    }

    /// Check if the actor is still running.
    ///
    /// Returns `true` if the command channel is still open.
    pub fn is_connected(&self) -> bool {
        !self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_protocol::MessageType;

    fn create_test_handle() -> (CoordinatorHandle, mpsc::Receiver<CoordinatorCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        (CoordinatorHandle::new(cmd_tx), cmd_rx)
    }

    #[tokio::test]
    async fn test_handle_is_clone() {
        let (handle, _rx) = create_test_handle();
        let _cloned = handle.clone();
    }

    #[tokio::test]
    async fn test_connect_sends_command() {
        let (handle, mut rx) = create_test_handle();

        let cmd_handler = tokio::spawn(async move {
            if let Some(CoordinatorCommand::Connect {
                peer_id,
                respond_to,
                ..
            }) = rx.recv().await
            {
                let _ = respond_to.send(Ok(Welcome {
                    peer_id,
                    connected: 1,
                }));
                return true;
            }
            false
        });

        let (link, _out) = PeerLink::channel(4);
        let welcome = handle.connect(PeerId::new("peer-1"), link).await.unwrap();
        assert_eq!(welcome.peer_id, PeerId::new("peer-1"));
        assert_eq!(welcome.connected, 1);
        assert!(cmd_handler.await.unwrap());
    }

    #[tokio::test]
    async fn test_connect_channel_closed_error() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        let (link, _out) = PeerLink::channel(4);
        let result = handle.connect(PeerId::new("peer-1"), link).await;
        assert!(matches!(result, Err(RelayError::ChannelClosed)));
    }

    #[tokio::test]
    async fn test_relay_frame_parses_before_sending() {
        let (handle, mut rx) = create_test_handle();

        handle
            .relay_frame(&PeerId::new("peer-1"), r#"{"type":"client:message","payload":"hi"}"#)
            .await;

        match rx.try_recv() {
            Ok(CoordinatorCommand::Message { peer_id, envelope }) => {
                assert_eq!(peer_id, PeerId::new("peer-1"));
                assert_eq!(envelope.kind(), &MessageType::ClientMessage);
            }
            other => panic!("Expected Message command, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_relay_frame_drops_malformed() {
        let (handle, mut rx) = create_test_handle();

        handle.relay_frame(&PeerId::new("peer-1"), "not json").await;
        handle.relay_frame(&PeerId::new("peer-1"), "[1,2]").await;
        handle.relay_frame(&PeerId::new("peer-1"), r#"{"payload":1}"#).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_returns_false_on_channel_close() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        assert!(
            !handle
                .disconnect(PeerId::new("peer-1"), DisconnectReason::Closed)
                .await
        );
    }

    #[tokio::test]
    async fn test_queries_return_empty_on_channel_close() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        assert!(handle.list_client_ids().await.is_empty());
        assert!(handle.history_snapshot().await.is_empty());
        assert!(matches!(
            handle.health_info().await,
            Err(RelayError::ChannelClosed)
        ));
        assert!(matches!(
            handle.submit(serde_json::json!("x")).await,
            Err(RelayError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_liveness_ack_ignores_closed_channel() {
        let (handle, rx) = create_test_handle();
        drop(rx);

        // Should not panic or error
        handle.liveness_ack(PeerId::new("peer-1")).await;
    }

    #[tokio::test]
    async fn test_is_connected() {
        let (handle, rx) = create_test_handle();
        assert!(handle.is_connected());

        drop(rx);
        assert!(!handle.is_connected());
    }
}
