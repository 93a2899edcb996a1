//! Coordinator actor - owns the roster and history and processes commands.
//!
//! The CoordinatorActor is the single owner of relay state. Joins, leaves,
//! relayed messages and heartbeat sweeps are handled one at a time, so every
//! broadcast sees the roster exactly as the previous event left it.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate's panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Per-peer send failures are logged and never abort a broadcast

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, SubsecRound, Utc};
use relay_protocol::{Envelope, PeerId};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::commands::{
    CoordinatorCommand, DisconnectReason, HealthInfo, RelayError, SweepReport, Welcome,
};
use crate::connections::{ConnectionRegistry, Outbound, PeerLink};
use crate::heartbeat;
use crate::history::HistoryRing;

/// Greeting sent in every `server:welcome`.
pub const DEFAULT_WELCOME_MESSAGE: &str = "Welcome to the relay";

// ============================================================================
// Coordinator Actor
// ============================================================================

/// The coordinator actor - owns all relay state.
///
/// # Ownership
///
/// The actor owns:
/// - `connections`: live peers, their outbound queues and liveness flags
/// - `history`: the bounded replay buffer
///
/// Nothing else holds a reference to either; peers and HTTP routes reach
/// them only through `CoordinatorCommand`s.
pub struct CoordinatorActor {
    /// Command receiver
    receiver: mpsc::Receiver<CoordinatorCommand>,

    /// Live connections keyed by peer id
    connections: ConnectionRegistry,

    /// Recent envelopes for replay to new peers
    history: HistoryRing,

    /// Text of the `server:welcome` greeting
    welcome_message: String,

    /// When the actor was created, for uptime reporting
    started_at: Instant,
}

impl CoordinatorActor {
    /// Creates a new coordinator actor.
    ///
    /// # Arguments
    ///
    /// * `receiver` - Channel for receiving commands
    /// * `history_capacity` - Number of envelopes kept for replay
    /// * `welcome_message` - Greeting sent to each new peer
    pub fn new(
        receiver: mpsc::Receiver<CoordinatorCommand>,
        history_capacity: usize,
        welcome_message: impl Into<String>,
    ) -> Self {
        Self {
            receiver,
            connections: ConnectionRegistry::new(),
            history: HistoryRing::new(history_capacity),
            welcome_message: welcome_message.into(),
            started_at: Instant::now(),
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all senders dropped),
    /// then closes every remaining peer.
    pub async fn run(mut self) {
        info!(
            history_capacity = self.history.capacity(),
            "Coordinator actor starting"
        );

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        for id in self.connections.ids() {
            if let Some(link) = self.connections.remove(&id) {
                link.close();
            }
        }

        info!(
            history = self.history.count(),
            "Coordinator actor stopped"
        );
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: CoordinatorCommand) {
        match cmd {
            CoordinatorCommand::Connect {
                peer_id,
                link,
                respond_to,
            } => {
                let result = self.handle_connect(peer_id, link);
                // Ignore send error - the accept path may have given up
                let _ = respond_to.send(result);
            }
            CoordinatorCommand::Message { peer_id, envelope } => {
                self.handle_message(&peer_id, envelope, now_millis());
            }
            CoordinatorCommand::LivenessAck { peer_id } => {
                if !self.connections.mark_alive(&peer_id) {
                    debug!(peer_id = %peer_id, "Liveness ack from unknown peer");
                }
            }
            CoordinatorCommand::Disconnect {
                peer_id,
                reason,
                respond_to,
            } => {
                let removed = self.handle_disconnect(&peer_id, reason);
                let _ = respond_to.send(removed);
            }
            CoordinatorCommand::Submit {
                payload,
                respond_to,
            } => {
                let delivered = self.handle_submit(payload, now_millis());
                let _ = respond_to.send(delivered);
            }
            CoordinatorCommand::ListClients { respond_to } => {
                let _ = respond_to.send(self.connections.ids());
            }
            CoordinatorCommand::GetHistory { respond_to } => {
                let _ = respond_to.send(self.history.snapshot());
            }
            CoordinatorCommand::Health { respond_to } => {
                let _ = respond_to.send(self.health_info());
            }
            CoordinatorCommand::HeartbeatSweep { respond_to } => {
                let report = self.handle_heartbeat_sweep();
                let _ = respond_to.send(report);
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Registers a peer and brings it up to date.
    ///
    /// The new peer's queue receives welcome, history and roster (in that
    /// order) before anyone else hears about the join. The roster it sees
    /// already includes itself.
    fn handle_connect(&mut self, peer_id: PeerId, link: PeerLink) -> Result<Welcome, RelayError> {
        self.connections.add(peer_id.clone(), link)?;
        let connected = self.connections.len();

        self.send_envelope(
            &peer_id,
            &Envelope::welcome(&peer_id, &self.welcome_message, connected),
        );

        match Envelope::history(&self.history.snapshot()) {
            Ok(history) => self.send_envelope(&peer_id, &history),
            Err(e) => error!(peer_id = %peer_id, error = %e, "Failed to build history"),
        }

        self.send_envelope(&peer_id, &Envelope::clients(&self.connections.ids()));

        let notified = self.broadcast(&Envelope::joined(&peer_id), Some(&peer_id));

        info!(
            peer_id = %peer_id,
            connected,
            notified,
            "Peer joined"
        );

        Ok(Welcome { peer_id, connected })
    }

    /// Stamps a peer's envelope, records it, and relays it to the others.
    ///
    /// Frames from ids that are no longer registered are dropped; this can
    /// happen when a frame races the peer's own disconnect.
    fn handle_message(&mut self, peer_id: &PeerId, envelope: Envelope, sent_at: DateTime<Utc>) {
        if !self.connections.contains(peer_id) {
            debug!(peer_id = %peer_id, "Dropping message from unregistered peer");
            return;
        }

        let stamped = envelope.stamped(peer_id, sent_at);
        self.history.append(stamped.clone());
        let delivered = self.broadcast(&stamped, Some(peer_id));

        debug!(
            peer_id = %peer_id,
            kind = %stamped.kind(),
            delivered,
            "Relayed message"
        );
    }

    /// Removes a peer and tells everyone left.
    ///
    /// Returns false if the peer was already gone; no second notice is sent.
    fn handle_disconnect(&mut self, peer_id: &PeerId, reason: DisconnectReason) -> bool {
        let Some(link) = self.connections.remove(peer_id) else {
            debug!(peer_id = %peer_id, %reason, "Disconnect for unknown peer ignored");
            return false;
        };
        link.close();

        self.broadcast(&Envelope::left(peer_id), None);

        info!(
            peer_id = %peer_id,
            %reason,
            remaining = self.connections.len(),
            "Peer left"
        );
        true
    }

    /// Records an external submission and delivers it to every peer.
    fn handle_submit(&mut self, payload: serde_json::Value, sent_at: DateTime<Utc>) -> bool {
        let envelope = Envelope::external(payload, sent_at);
        self.history.append(envelope.clone());
        let delivered = self.broadcast(&envelope, None);

        info!(delivered, "External message broadcast");
        true
    }

    /// Terminates peers that missed the last probe and probes the rest.
    ///
    /// All unanswered peers are removed before any `server:left` is sent,
    /// so no notice is queued to a peer that is itself being dropped.
    fn handle_heartbeat_sweep(&mut self) -> SweepReport {
        let sweep = heartbeat::sweep(&mut self.connections);

        for id in &sweep.unanswered {
            if let Some(link) = self.connections.remove(id) {
                link.close();
            }
        }

        for id in &sweep.unanswered {
            self.broadcast(&Envelope::left(id), None);
            warn!(
                peer_id = %id,
                reason = %DisconnectReason::HeartbeatTimeout,
                "Peer terminated"
            );
        }

        if sweep.probed > 0 || !sweep.unanswered.is_empty() {
            debug!(
                probed = sweep.probed,
                terminated = sweep.unanswered.len(),
                "Heartbeat sweep complete"
            );
        }

        SweepReport {
            probed: sweep.probed,
            terminated: sweep.unanswered,
        }
    }

    fn health_info(&self) -> HealthInfo {
        HealthInfo {
            status: "ok",
            uptime: self.started_at.elapsed().as_secs_f64(),
            connection_count: self.connections.len(),
        }
    }

    // ========================================================================
    // Delivery
    // ========================================================================

    /// Serializes once and queues the frame for every peer except `exclude`.
    ///
    /// Returns how many peers accepted the frame.
    fn broadcast(&self, envelope: &Envelope, exclude: Option<&PeerId>) -> usize {
        let frame: Arc<str> = match envelope.to_json() {
            Ok(json) => Arc::from(json),
            Err(e) => {
                error!(kind = %envelope.kind(), error = %e, "Failed to serialize broadcast");
                return 0;
            }
        };

        let mut delivered = 0;
        for id in self.connections.ids() {
            if exclude == Some(&id) {
                continue;
            }
            match self.connections.send_to(&id, Outbound::Text(Arc::clone(&frame))) {
                Ok(()) => delivered += 1,
                Err(e) => warn!(kind = %envelope.kind(), error = %e, "Broadcast send failed"),
            }
        }
        delivered
    }

    /// Queues one envelope for one peer.
    fn send_envelope(&self, peer_id: &PeerId, envelope: &Envelope) {
        let frame = match envelope.to_json() {
            Ok(json) => json,
            Err(e) => {
                error!(peer_id = %peer_id, error = %e, "Failed to serialize envelope");
                return;
            }
        };

        if let Err(e) = self.connections.send_to(peer_id, Outbound::Text(Arc::from(frame))) {
            warn!(kind = %envelope.kind(), error = %e, "Direct send failed");
        }
    }

    // ========================================================================
    // Accessors (for testing)
    // ========================================================================

    /// Returns the number of registered peers.
    #[cfg(test)]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

/// Current time at the precision carried on the wire.
fn now_millis() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
