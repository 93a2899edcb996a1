//! Coordinator commands, errors, and replies.
//!
//! This module defines the message types for communicating with the
//! `CoordinatorActor`:
//! - `CoordinatorCommand`: events and queries sent to the actor
//! - `RelayError`: errors that can occur during coordinator operations
//! - `DisconnectReason`: why a peer left the roster
//! - `Welcome`, `HealthInfo`, `SweepReport`: replies

use relay_protocol::{Envelope, PeerId};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::connections::PeerLink;

// ============================================================================
// Coordinator Commands
// ============================================================================

/// Commands sent to the coordinator actor.
///
/// Commands that need an answer carry a oneshot sender; peer traffic and
/// liveness acks are fire-and-forget.
#[derive(Debug)]
pub enum CoordinatorCommand {
    /// A transport accepted a new peer.
    ///
    /// # Errors
    /// - `RelayError::DuplicateId` if the id is already registered
    Connect {
        /// Identity generated for the peer
        peer_id: PeerId,
        /// Outbound queue and close capability
        link: PeerLink,
        /// Channel to send the result
        respond_to: oneshot::Sender<Result<Welcome, RelayError>>,
    },

    /// A peer sent a well-formed envelope (not yet stamped).
    Message {
        /// Sending peer
        peer_id: PeerId,
        /// Parsed envelope as received
        envelope: Envelope,
    },

    /// A peer answered a liveness probe.
    LivenessAck {
        /// Responding peer
        peer_id: PeerId,
    },

    /// A peer's transport closed.
    ///
    /// Responds `true` if the peer was still registered.
    Disconnect {
        /// Departing peer
        peer_id: PeerId,
        /// Why it left
        reason: DisconnectReason,
        /// Channel to send the result
        respond_to: oneshot::Sender<bool>,
    },

    /// Broadcast a message on behalf of an external collaborator.
    Submit {
        /// Arbitrary JSON payload
        payload: serde_json::Value,
        /// Channel to send the delivered flag
        respond_to: oneshot::Sender<bool>,
    },

    /// Get the roster in join order.
    ListClients {
        /// Channel to send the results
        respond_to: oneshot::Sender<Vec<PeerId>>,
    },

    /// Get the history, oldest first.
    GetHistory {
        /// Channel to send the results
        respond_to: oneshot::Sender<Vec<Envelope>>,
    },

    /// Get liveness information about the relay itself.
    Health {
        /// Channel to send the results
        respond_to: oneshot::Sender<HealthInfo>,
    },

    /// Run one heartbeat sweep over all connections.
    HeartbeatSweep {
        /// Channel to send the sweep outcome
        respond_to: oneshot::Sender<SweepReport>,
    },
}

// ============================================================================
// Relay Errors
// ============================================================================

/// Errors that can occur during coordinator operations.
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    /// A connection with this id is already registered.
    #[error("peer already registered: {0}")]
    DuplicateId(PeerId),

    /// The coordinator stopped before answering.
    #[error("coordinator channel closed")]
    ChannelClosed,
}

// ============================================================================
// Replies
// ============================================================================

/// What a newly connected peer was told in its `server:welcome`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Welcome {
    /// Assigned identity
    pub peer_id: PeerId,
    /// Roster size including the new peer
    pub connected: usize,
}

/// Relay status for the health endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthInfo {
    /// Always "ok" while the coordinator answers
    pub status: &'static str,
    /// Seconds since the coordinator started
    pub uptime: f64,
    /// Number of registered connections
    #[serde(rename = "clients")]
    pub connection_count: usize,
}

/// Outcome of one heartbeat sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Peers that were sent a probe this sweep
    pub probed: usize,
    /// Peers terminated for not answering the previous probe
    pub terminated: Vec<PeerId>,
}

/// Reason why a peer was removed from the roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The peer closed the channel or the socket ended.
    Closed,

    /// The peer did not answer a liveness probe within one interval.
    HeartbeatTimeout,

    /// Writing to the peer failed or timed out.
    WriteFailed,

    /// The relay is shutting down.
    Shutdown,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "connection closed"),
            Self::HeartbeatTimeout => write!(f, "heartbeat missed"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::Shutdown => write!(f, "relay shutting down"),
        }
    }
}
