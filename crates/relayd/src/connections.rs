//! Registry of live peer connections.
//!
//! Each entry pairs a `PeerId` with the `PeerLink` used to reach it and
//! the liveness flag the heartbeat sweep flips. The registry is owned by
//! the coordinator actor; nothing here locks or awaits.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate's panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Sends never block: a full or closed queue is reported as `SendError`

use std::collections::HashMap;
use std::sync::Arc;

use relay_protocol::PeerId;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::coordinator::RelayError;

// ============================================================================
// Peer Link
// ============================================================================

/// A frame queued for a peer's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Serialized envelope, shared between all recipients of a broadcast
    Text(Arc<str>),
    /// Liveness probe
    Ping,
}

/// Capability to reach one peer: queue frames to it, or close it.
#[derive(Debug, Clone)]
pub struct PeerLink {
    outbound: mpsc::Sender<Outbound>,
    closer: CancellationToken,
}

impl PeerLink {
    /// Wraps an outbound queue and the token that closes the transport.
    pub fn new(outbound: mpsc::Sender<Outbound>, closer: CancellationToken) -> Self {
        Self { outbound, closer }
    }

    /// Creates a link with a fresh bounded queue of `capacity` frames.
    ///
    /// Returns the link and the receiving end for the writer task.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx, CancellationToken::new()), rx)
    }

    /// Returns a clone of the token cancelled when the link is closed.
    pub fn close_token(&self) -> CancellationToken {
        self.closer.clone()
    }

    /// Asks the transport to shut down.
    pub fn close(&self) {
        self.closer.cancel();
    }

    /// Returns true once the link was closed or its writer went away.
    pub fn is_closed(&self) -> bool {
        self.closer.is_cancelled() || self.outbound.is_closed()
    }
}

// ============================================================================
// Send Errors
// ============================================================================

/// Why a frame could not be queued for a peer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The peer is not registered or its transport is gone.
    #[error("peer not connected: {0}")]
    NotConnected(PeerId),

    /// The peer's outbound queue is full; the frame was dropped.
    #[error("outbound queue full for peer {0}")]
    QueueFull(PeerId),
}

// ============================================================================
// Connection Registry
// ============================================================================

#[derive(Debug)]
struct Connection {
    link: PeerLink,
    alive: bool,
    joined_seq: u64,
}

/// The set of live connections keyed by peer identity.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<PeerId, Connection>,
    next_seq: u64,
}

impl ConnectionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new connection, initially alive.
    ///
    /// # Errors
    ///
    /// - `RelayError::DuplicateId` if `id` is already registered
    pub fn add(&mut self, id: PeerId, link: PeerLink) -> Result<(), RelayError> {
        if self.connections.contains_key(&id) {
            return Err(RelayError::DuplicateId(id));
        }

        let joined_seq = self.next_seq;
        self.next_seq = self.next_seq.wrapping_add(1);
        self.connections.insert(
            id,
            Connection {
                link,
                alive: true,
                joined_seq,
            },
        );
        Ok(())
    }

    /// Removes a connection, returning its link if it was present.
    ///
    /// Removing an absent id is a no-op.
    pub fn remove(&mut self, id: &PeerId) -> Option<PeerLink> {
        self.connections.remove(id).map(|conn| conn.link)
    }

    /// Looks up the link for `id`.
    pub fn get(&self, id: &PeerId) -> Option<&PeerLink> {
        self.connections.get(id).map(|conn| &conn.link)
    }

    pub fn contains(&self, id: &PeerId) -> bool {
        self.connections.contains_key(id)
    }

    /// Snapshot of all registered ids in join order.
    pub fn ids(&self) -> Vec<PeerId> {
        let mut entries: Vec<(&PeerId, u64)> = self
            .connections
            .iter()
            .map(|(id, conn)| (id, conn.joined_seq))
            .collect();
        entries.sort_by_key(|(_, seq)| *seq);
        entries.into_iter().map(|(id, _)| id.clone()).collect()
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Queues a frame for one peer without waiting.
    ///
    /// # Errors
    ///
    /// - `SendError::NotConnected` if the peer is unknown or its link is closed
    /// - `SendError::QueueFull` if the peer is not draining its queue
    pub fn send_to(&self, id: &PeerId, frame: Outbound) -> Result<(), SendError> {
        let conn = self
            .connections
            .get(id)
            .ok_or_else(|| SendError::NotConnected(id.clone()))?;

        if conn.link.closer.is_cancelled() {
            return Err(SendError::NotConnected(id.clone()));
        }

        conn.link.outbound.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => SendError::QueueFull(id.clone()),
            TrySendError::Closed(_) => SendError::NotConnected(id.clone()),
        })
    }

    /// Records a liveness response. Returns false for unknown peers.
    pub fn mark_alive(&mut self, id: &PeerId) -> bool {
        self.set_alive(id, true)
    }

    /// Returns the liveness flag for `id`, or `None` if it is not registered.
    pub fn is_alive(&self, id: &PeerId) -> Option<bool> {
        self.connections.get(id).map(|conn| conn.alive)
    }

    /// Sets the liveness flag. Returns false for unknown peers.
    pub fn set_alive(&mut self, id: &PeerId, alive: bool) -> bool {
        match self.connections.get_mut(id) {
            Some(conn) => {
                conn.alive = alive;
                true
            }
            None => false,
        }
    }
}
