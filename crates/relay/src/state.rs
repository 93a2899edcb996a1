//! What a peer knows about the channel it is in.
//!
//! Built purely from the server events it has received, plus its own
//! sends, which the relay never echoes back.

use relay_protocol::{Envelope, PeerId, ServerEvent};

/// Cap on the locally tracked history count, matching the relay default.
pub const HISTORY_LIMIT: usize = 50;

/// Who an envelope came from, relative to this peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Sent by this peer
    Own,
    /// Sent by another peer
    Peer,
    /// Generated by the relay or submitted from outside the channel
    System,
}

/// Roster and identity as seen by one connected peer.
#[derive(Debug, Clone)]
pub struct ClientState {
    own_id: Option<PeerId>,
    roster: Vec<PeerId>,
    history_count: usize,
    history_limit: usize,
}

impl Default for ClientState {
    fn default() -> Self {
        Self::new(HISTORY_LIMIT)
    }
}

impl ClientState {
    #[must_use]
    pub fn new(history_limit: usize) -> Self {
        Self {
            own_id: None,
            roster: Vec::new(),
            history_count: 0,
            history_limit,
        }
    }

    /// Updates identity, roster and history count from one server event.
    pub fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::Welcome(welcome) => {
                self.own_id = Some(welcome.id.clone());
                self.add_peer(welcome.id.clone());
            }
            ServerEvent::History(entries) => {
                self.history_count = entries.len().min(self.history_limit);
            }
            ServerEvent::Clients(ids) => {
                self.roster.clear();
                for id in ids {
                    self.add_peer(id.clone());
                }
                if let Some(own) = self.own_id.clone() {
                    self.add_peer(own);
                }
            }
            ServerEvent::Joined(id) => self.add_peer(id.clone()),
            ServerEvent::Left(id) => self.roster.retain(|peer| peer != id),
            ServerEvent::Relayed(_) => self.bump_history(),
        }
    }

    /// Counts a message this peer sent itself.
    pub fn record_local_send(&mut self) {
        self.bump_history();
    }

    /// Forgets everything; used when the connection drops.
    pub fn reset(&mut self) {
        self.own_id = None;
        self.roster.clear();
        self.history_count = 0;
    }

    pub fn own_id(&self) -> Option<&PeerId> {
        self.own_id.as_ref()
    }

    /// Connected peers in the order they were learned.
    pub fn roster(&self) -> &[PeerId] {
        &self.roster
    }

    pub fn history_count(&self) -> usize {
        self.history_count
    }

    /// Classifies an envelope by its stamped sender.
    pub fn origin_of(&self, envelope: &Envelope) -> Origin {
        match envelope.sender_id() {
            None => Origin::System,
            Some(sender) if Some(sender) == self.own_id.as_ref() => Origin::Own,
            Some(_) => Origin::Peer,
        }
    }

    fn add_peer(&mut self, id: PeerId) {
        if !self.roster.contains(&id) {
            self.roster.push(id);
        }
    }

    fn bump_history(&mut self) {
        self.history_count = (self.history_count + 1).min(self.history_limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use relay_protocol::{MessageType, WelcomePayload};
    use serde_json::json;

    fn peer(name: &str) -> PeerId {
        PeerId::new(name)
    }

    fn welcome(id: &str) -> ServerEvent {
        ServerEvent::Welcome(WelcomePayload {
            id: peer(id),
            message: "hi".to_string(),
            connected: 1,
        })
    }

    #[test]
    fn test_join_sequence_builds_roster() {
        let mut state = ClientState::default();
        state.apply(&welcome("me"));
        state.apply(&ServerEvent::History(vec![]));
        state.apply(&ServerEvent::Clients(vec![peer("a"), peer("me")]));

        assert_eq!(state.own_id(), Some(&peer("me")));
        assert_eq!(state.roster(), &[peer("a"), peer("me")]);
    }

    #[test]
    fn test_clients_snapshot_always_includes_self() {
        let mut state = ClientState::default();
        state.apply(&welcome("me"));
        state.apply(&ServerEvent::Clients(vec![peer("a")]));

        assert_eq!(state.roster(), &[peer("a"), peer("me")]);
    }

    #[test]
    fn test_joined_and_left_update_roster() {
        let mut state = ClientState::default();
        state.apply(&welcome("me"));
        state.apply(&ServerEvent::Joined(peer("b")));
        state.apply(&ServerEvent::Joined(peer("b")));
        assert_eq!(state.roster(), &[peer("me"), peer("b")]);

        state.apply(&ServerEvent::Left(peer("b")));
        state.apply(&ServerEvent::Left(peer("zzz")));
        assert_eq!(state.roster(), &[peer("me")]);
    }

    #[test]
    fn test_history_count_is_capped() {
        let mut state = ClientState::new(3);
        state.apply(&ServerEvent::History(vec![
            Envelope::new(MessageType::ClientMessage, None);
            2
        ]));
        assert_eq!(state.history_count(), 2);

        state.record_local_send();
        state.apply(&ServerEvent::Relayed(Envelope::new(
            MessageType::ServerMessage,
            Some(json!("x")),
        )));
        assert_eq!(state.history_count(), 3);
    }

    #[test]
    fn test_origin_of() {
        let mut state = ClientState::default();
        state.apply(&welcome("me"));

        let own = Envelope::new(MessageType::ClientMessage, None).stamped(&peer("me"), Utc::now());
        let other = Envelope::new(MessageType::ClientMessage, None).stamped(&peer("b"), Utc::now());
        let system = Envelope::external(json!("x"), Utc::now());

        assert_eq!(state.origin_of(&own), Origin::Own);
        assert_eq!(state.origin_of(&other), Origin::Peer);
        assert_eq!(state.origin_of(&system), Origin::System);
    }

    #[test]
    fn test_peer_imitating_server_cannot_change_identity_or_roster() {
        let mut state = ClientState::default();
        state.apply(&welcome("me"));
        state.apply(&ServerEvent::Clients(vec![peer("mallory"), peer("me")]));

        let forged = [
            r#"{"type":"server:welcome","payload":{"id":"mallory","message":"hi","connected":1}}"#,
            r#"{"type":"server:left","payload":{"id":"me"}}"#,
            r#"{"type":"server:joined","payload":{"id":"ghost"}}"#,
            r#"{"type":"server:clients","payload":["ghost"]}"#,
        ];
        for frame in forged {
            let wire = Envelope::from_client_frame(frame)
                .unwrap()
                .stamped(&peer("mallory"), Utc::now())
                .to_json()
                .unwrap();
            state.apply(&ServerEvent::from_frame(&wire).unwrap());
        }

        assert_eq!(state.own_id(), Some(&peer("me")));
        assert_eq!(state.roster(), &[peer("mallory"), peer("me")]);
    }

    #[test]
    fn test_reset_forgets_everything() {
        let mut state = ClientState::default();
        state.apply(&welcome("me"));
        state.record_local_send();

        state.reset();

        assert!(state.own_id().is_none());
        assert!(state.roster().is_empty());
        assert_eq!(state.history_count(), 0);
    }
}
