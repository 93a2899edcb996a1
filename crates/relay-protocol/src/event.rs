//! Typed view of the envelopes a peer receives.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::envelope::{Envelope, MessageType};
use crate::error::{ProtocolError, ProtocolResult};
use crate::peer::PeerId;

/// Payload of `server:welcome`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WelcomePayload {
    /// The identity the relay assigned to this peer
    pub id: PeerId,
    /// Human-readable greeting
    pub message: String,
    /// Number of connected peers, including this one
    pub connected: usize,
}

#[derive(Deserialize)]
struct IdPayload {
    id: PeerId,
}

/// An inbound envelope decoded by its type tag.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// First envelope after connecting
    Welcome(WelcomePayload),
    /// Recent traffic, oldest first
    History(Vec<Envelope>),
    /// Current roster
    Clients(Vec<PeerId>),
    /// Another peer connected
    Joined(PeerId),
    /// Another peer disconnected
    Left(PeerId),
    /// Anything else: peer traffic or an external `server:message`
    Relayed(Envelope),
}

impl ServerEvent {
    /// Decodes an envelope into its typed form.
    ///
    /// Control envelopes built by the relay never carry a sender. A control
    /// type with `meta.senderId` set was relayed from a peer, so it decodes
    /// as `Relayed` and cannot alter identity or roster.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::UnexpectedPayload` when a control envelope
    /// carries a payload of the wrong shape.
    pub fn from_envelope(envelope: Envelope) -> ProtocolResult<Self> {
        let kind = envelope.kind().clone();
        if !kind.is_control() || envelope.sender_id().is_some() {
            return Ok(Self::Relayed(envelope));
        }
        match kind {
            MessageType::Welcome => decode(&kind, envelope).map(Self::Welcome),
            MessageType::History => decode(&kind, envelope).map(Self::History),
            MessageType::Clients => decode(&kind, envelope).map(Self::Clients),
            MessageType::Joined => {
                decode::<IdPayload>(&kind, envelope).map(|p| Self::Joined(p.id))
            }
            MessageType::Left => decode::<IdPayload>(&kind, envelope).map(|p| Self::Left(p.id)),
            _ => Ok(Self::Relayed(envelope)),
        }
    }

    /// Parses and decodes a raw text frame.
    pub fn from_frame(frame: &str) -> ProtocolResult<Self> {
        let envelope: Envelope = serde_json::from_str(frame).map_err(ProtocolError::json)?;
        Self::from_envelope(envelope)
    }
}

fn decode<T: serde::de::DeserializeOwned>(kind: &MessageType, envelope: Envelope) -> ProtocolResult<T> {
    let payload = envelope.into_payload().unwrap_or(Value::Null);
    serde_json::from_value(payload).map_err(|e| ProtocolError::UnexpectedPayload {
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_decode_welcome() {
        let env = Envelope::welcome(&PeerId::new("p1"), "hi", 2);
        let event = ServerEvent::from_envelope(env).unwrap();

        assert_eq!(
            event,
            ServerEvent::Welcome(WelcomePayload {
                id: PeerId::new("p1"),
                message: "hi".to_string(),
                connected: 2,
            })
        );
    }

    #[test]
    fn test_decode_roster_and_notices() {
        let ids = vec![PeerId::new("a"), PeerId::new("b")];
        assert_eq!(
            ServerEvent::from_envelope(Envelope::clients(&ids)).unwrap(),
            ServerEvent::Clients(ids)
        );
        assert_eq!(
            ServerEvent::from_envelope(Envelope::joined(&PeerId::new("c"))).unwrap(),
            ServerEvent::Joined(PeerId::new("c"))
        );
        assert_eq!(
            ServerEvent::from_envelope(Envelope::left(&PeerId::new("c"))).unwrap(),
            ServerEvent::Left(PeerId::new("c"))
        );
    }

    #[test]
    fn test_decode_history() {
        let entry = Envelope::external(json!("x"), Utc::now());
        let env = Envelope::history(std::slice::from_ref(&entry)).unwrap();

        match ServerEvent::from_envelope(env).unwrap() {
            ServerEvent::History(entries) => {
                assert_eq!(entries.len(), 1);
                assert_eq!(entries[0].payload(), Some(&json!("x")));
            }
            other => panic!("Expected History, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_relayed_frame() {
        let frame = r#"{"type":"client:message","payload":"hi","meta":{"senderId":"p1"}}"#;
        match ServerEvent::from_frame(frame).unwrap() {
            ServerEvent::Relayed(env) => {
                assert_eq!(env.sender_id(), Some(&PeerId::new("p1")));
                assert_eq!(env.payload(), Some(&json!("hi")));
            }
            other => panic!("Expected Relayed, got {other:?}"),
        }
    }

    #[test]
    fn test_peer_sent_control_types_stay_relayed() {
        let sender = PeerId::new("mallory");
        let frames = [
            r#"{"type":"server:welcome","payload":{"id":"mallory","message":"hi","connected":1}}"#,
            r#"{"type":"server:joined","payload":{"id":"ghost"}}"#,
            r#"{"type":"server:left","payload":{"id":"alice"}}"#,
            r#"{"type":"server:clients","payload":["mallory"]}"#,
            r#"{"type":"server:history","payload":[]}"#,
        ];

        for frame in frames {
            let relayed = Envelope::from_client_frame(frame)
                .unwrap()
                .stamped(&sender, Utc::now());
            let wire = relayed.to_json().unwrap();

            match ServerEvent::from_frame(&wire).unwrap() {
                ServerEvent::Relayed(env) => assert_eq!(env.sender_id(), Some(&sender)),
                other => panic!("Expected Relayed for {frame}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_decode_bad_payload() {
        let env = Envelope::new(MessageType::Joined, Some(json!("no id here")));
        let err = ServerEvent::from_envelope(env).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::UnexpectedPayload { ref kind, .. } if kind == "server:joined"
        ));
    }
}
