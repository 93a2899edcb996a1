//! The wire-level envelope exchanged over the relay channel.
//!
//! ```text
//! { "type": string, "payload"?: any, "meta"?: { "senderId"?, "sentAt"?, "origin"? } }
//! ```
//!
//! Envelopes are immutable once built. The relay never trusts a client's own
//! `meta`: inbound frames are parsed with [`Envelope::from_client_frame`],
//! which discards it, and the coordinator then applies
//! [`Envelope::stamped`] with the authoritative sender and timestamp.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::error::{ProtocolError, ProtocolResult};
use crate::peer::PeerId;

/// `meta.origin` value for envelopes submitted from outside the channel.
pub const ORIGIN_EXTERNAL: &str = "external";

// ============================================================================
// Message Type
// ============================================================================

/// The `type` tag of an envelope.
///
/// Known server and client kinds get their own variant. Anything else a
/// client sends is kept verbatim in `Custom` so it can be relayed untouched.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `server:welcome` - first envelope a new peer receives
    Welcome,
    /// `server:history` - replay of recent traffic
    History,
    /// `server:clients` - roster snapshot
    Clients,
    /// `server:joined` - another peer connected
    Joined,
    /// `server:left` - another peer disconnected
    Left,
    /// `server:message` - externally submitted broadcast
    ServerMessage,
    /// `client:message` - the conventional peer chat message
    ClientMessage,
    /// Any other type string
    Custom(String),
}

impl MessageType {
    /// Returns the wire representation.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Welcome => "server:welcome",
            Self::History => "server:history",
            Self::Clients => "server:clients",
            Self::Joined => "server:joined",
            Self::Left => "server:left",
            Self::ServerMessage => "server:message",
            Self::ClientMessage => "client:message",
            Self::Custom(s) => s,
        }
    }

    /// Maps a wire string onto its variant.
    pub fn parse(s: &str) -> Self {
        match s {
            "server:welcome" => Self::Welcome,
            "server:history" => Self::History,
            "server:clients" => Self::Clients,
            "server:joined" => Self::Joined,
            "server:left" => Self::Left,
            "server:message" => Self::ServerMessage,
            "client:message" => Self::ClientMessage,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Returns true for the control envelopes the relay emits on its own
    /// (welcome, history, roster, join and leave notices).
    pub fn is_control(&self) -> bool {
        matches!(
            self,
            Self::Welcome | Self::History | Self::Clients | Self::Joined | Self::Left
        )
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MessageType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MessageType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

// ============================================================================
// Meta
// ============================================================================

/// Server-assigned envelope metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Meta {
    /// Peer that sent the message (absent for external submissions)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<PeerId>,

    /// When the relay accepted the message
    #[serde(default, skip_serializing_if = "Option::is_none", with = "sent_at")]
    pub sent_at: Option<DateTime<Utc>>,

    /// Where the message came from when it did not come from a peer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

/// `sentAt` is written as RFC 3339 UTC with millisecond precision.
mod sent_at {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.map(|s| {
            DateTime::parse_from_rfc3339(&s)
                .map(|ts| ts.with_timezone(&Utc))
                .map_err(serde::de::Error::custom)
        })
        .transpose()
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// A tagged message unit with optional payload and metadata.
///
/// Top-level fields beyond `type`, `payload` and `meta` are preserved in
/// `extra` and written back out when the envelope is relayed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    kind: MessageType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    meta: Option<Meta>,

    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl Envelope {
    /// Creates an envelope with no metadata.
    pub fn new(kind: MessageType, payload: Option<Value>) -> Self {
        Self {
            kind,
            payload,
            meta: None,
            extra: Map::new(),
        }
    }

    /// Creates the `server:welcome` envelope for a newly joined peer.
    pub fn welcome(id: &PeerId, message: &str, connected: usize) -> Self {
        Self::new(
            MessageType::Welcome,
            Some(json!({
                "id": id.as_str(),
                "message": message,
                "connected": connected,
            })),
        )
    }

    /// Creates the `server:history` envelope carrying `entries` oldest-first.
    pub fn history(entries: &[Envelope]) -> ProtocolResult<Self> {
        let payload = serde_json::to_value(entries).map_err(ProtocolError::json)?;
        Ok(Self::new(MessageType::History, Some(payload)))
    }

    /// Creates the `server:clients` roster envelope.
    pub fn clients(ids: &[PeerId]) -> Self {
        let roster = ids
            .iter()
            .map(|id| Value::String(id.as_str().to_string()))
            .collect();
        Self::new(MessageType::Clients, Some(Value::Array(roster)))
    }

    /// Creates the `server:joined` notice.
    pub fn joined(id: &PeerId) -> Self {
        Self::new(MessageType::Joined, Some(json!({ "id": id.as_str() })))
    }

    /// Creates the `server:left` notice.
    pub fn left(id: &PeerId) -> Self {
        Self::new(MessageType::Left, Some(json!({ "id": id.as_str() })))
    }

    /// Creates a `server:message` for a submission from outside the channel.
    pub fn external(payload: Value, sent_at: DateTime<Utc>) -> Self {
        Self {
            kind: MessageType::ServerMessage,
            payload: Some(payload),
            meta: Some(Meta {
                sender_id: None,
                sent_at: Some(sent_at),
                origin: Some(ORIGIN_EXTERNAL.to_string()),
            }),
            extra: Map::new(),
        }
    }

    /// Parses an inbound peer frame.
    ///
    /// Accepts any JSON object with a string `type`. The payload and any
    /// extra fields pass through unvalidated; a client-supplied `meta` is
    /// dropped.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::InvalidJson` if the frame is not JSON
    /// - `ProtocolError::NotAnObject` if it is JSON but not an object
    /// - `ProtocolError::MissingType` / `InvalidType` for a bad `type` field
    pub fn from_client_frame(frame: &str) -> ProtocolResult<Self> {
        let value: Value = serde_json::from_str(frame).map_err(ProtocolError::json)?;

        let Value::Object(mut fields) = value else {
            return Err(ProtocolError::NotAnObject);
        };

        let kind = match fields.remove("type") {
            Some(Value::String(s)) => MessageType::parse(&s),
            Some(_) => return Err(ProtocolError::InvalidType),
            None => return Err(ProtocolError::MissingType),
        };

        let payload = fields.remove("payload");
        fields.remove("meta");

        Ok(Self {
            kind,
            payload,
            meta: None,
            extra: fields,
        })
    }

    /// Returns a copy of this envelope attributed to `sender`.
    ///
    /// Any existing metadata is replaced.
    #[must_use]
    pub fn stamped(self, sender: &PeerId, sent_at: DateTime<Utc>) -> Self {
        Self {
            meta: Some(Meta {
                sender_id: Some(sender.clone()),
                sent_at: Some(sent_at),
                origin: None,
            }),
            ..self
        }
    }

    /// Serializes the envelope to a JSON text frame.
    pub fn to_json(&self) -> ProtocolResult<String> {
        serde_json::to_string(self).map_err(ProtocolError::json)
    }

    /// Returns the type tag.
    pub fn kind(&self) -> &MessageType {
        &self.kind
    }

    /// Returns the payload, if any.
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    /// Returns the metadata, if any.
    pub fn meta(&self) -> Option<&Meta> {
        self.meta.as_ref()
    }

    /// Returns the extra top-level fields carried from the sender.
    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    /// Returns the stamped sender, if any.
    pub fn sender_id(&self) -> Option<&PeerId> {
        self.meta.as_ref().and_then(|m| m.sender_id.as_ref())
    }

    /// Consumes the envelope and returns its payload.
    pub fn into_payload(self) -> Option<Value> {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, 12, 30, 0).unwrap()
    }

    #[test]
    fn test_message_type_wire_names() {
        assert_eq!(MessageType::Welcome.as_str(), "server:welcome");
        assert_eq!(MessageType::Left.as_str(), "server:left");
        assert_eq!(MessageType::ClientMessage.as_str(), "client:message");
        assert_eq!(MessageType::parse("server:joined"), MessageType::Joined);
        assert_eq!(
            MessageType::parse("typing"),
            MessageType::Custom("typing".to_string())
        );
    }

    #[test]
    fn test_is_control() {
        assert!(MessageType::Welcome.is_control());
        assert!(MessageType::Left.is_control());
        assert!(!MessageType::ServerMessage.is_control());
        assert!(!MessageType::ClientMessage.is_control());
        assert!(!MessageType::Custom("x".into()).is_control());
    }

    #[test]
    fn test_client_frame_drops_client_meta() {
        let frame = r#"{"type":"client:message","payload":"hi","meta":{"senderId":"spoofed","sentAt":"garbage"}}"#;
        let env = Envelope::from_client_frame(frame).unwrap();

        assert_eq!(env.kind(), &MessageType::ClientMessage);
        assert_eq!(env.payload(), Some(&json!("hi")));
        assert!(env.meta().is_none());
    }

    #[test]
    fn test_client_frame_keeps_extra_fields() {
        let frame = r#"{"type":"cursor","payload":{"x":1},"room":"lobby"}"#;
        let env = Envelope::from_client_frame(frame).unwrap();

        assert_eq!(env.kind(), &MessageType::Custom("cursor".to_string()));
        assert_eq!(env.extra().get("room"), Some(&json!("lobby")));

        let json: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(json["room"], "lobby");
        assert_eq!(json["type"], "cursor");
    }

    #[test]
    fn test_client_frame_rejects_malformed() {
        assert!(matches!(
            Envelope::from_client_frame("not json"),
            Err(ProtocolError::InvalidJson(_))
        ));
        assert_eq!(
            Envelope::from_client_frame("[1,2,3]"),
            Err(ProtocolError::NotAnObject)
        );
        assert_eq!(
            Envelope::from_client_frame("\"hello\""),
            Err(ProtocolError::NotAnObject)
        );
        assert_eq!(
            Envelope::from_client_frame(r#"{"payload":"hi"}"#),
            Err(ProtocolError::MissingType)
        );
        assert_eq!(
            Envelope::from_client_frame(r#"{"type":42}"#),
            Err(ProtocolError::InvalidType)
        );
    }

    #[test]
    fn test_client_frame_without_payload() {
        let env = Envelope::from_client_frame(r#"{"type":"ping"}"#).unwrap();
        assert!(env.payload().is_none());
        assert_eq!(env.to_json().unwrap(), r#"{"type":"ping"}"#);
    }

    #[test]
    fn test_client_frame_keeps_explicit_null_payload() {
        let env = Envelope::from_client_frame(r#"{"type":"x","payload":null}"#).unwrap();
        assert_eq!(env.payload(), Some(&Value::Null));
        assert_eq!(env.to_json().unwrap(), r#"{"type":"x","payload":null}"#);
    }

    #[test]
    fn test_stamped_overwrites_meta() {
        let sender = PeerId::new("peer-1");
        let env = Envelope::external(json!("hello"), fixed_time()).stamped(&sender, fixed_time());

        let meta = env.meta().unwrap();
        assert_eq!(meta.sender_id.as_ref(), Some(&sender));
        assert_eq!(meta.sent_at, Some(fixed_time()));
        assert!(meta.origin.is_none());
        assert_eq!(env.sender_id(), Some(&sender));
    }

    #[test]
    fn test_sent_at_wire_format() {
        let env = Envelope::external(json!({"text": "hi"}), fixed_time());
        let json: Value = serde_json::from_str(&env.to_json().unwrap()).unwrap();

        assert_eq!(json["type"], "server:message");
        assert_eq!(json["meta"]["sentAt"], "2026-10-18T12:30:00.000Z");
        assert_eq!(json["meta"]["origin"], ORIGIN_EXTERNAL);
        assert!(json["meta"].get("senderId").is_none());
    }

    #[test]
    fn test_stamped_envelope_survives_the_wire() {
        let env = Envelope::from_client_frame(r#"{"type":"client:message","payload":[1,2]}"#)
            .unwrap()
            .stamped(&PeerId::new("peer-9"), fixed_time());

        let parsed: Envelope = serde_json::from_str(&env.to_json().unwrap()).unwrap();
        assert_eq!(parsed, env);
    }

    #[test]
    fn test_control_envelopes() {
        let id = PeerId::new("peer-1");

        let welcome = Envelope::welcome(&id, "hello there", 3);
        assert_eq!(welcome.kind(), &MessageType::Welcome);
        assert_eq!(
            welcome.payload(),
            Some(&json!({"id": "peer-1", "message": "hello there", "connected": 3}))
        );

        let roster = Envelope::clients(&[id.clone(), PeerId::new("peer-2")]);
        assert_eq!(roster.payload(), Some(&json!(["peer-1", "peer-2"])));

        assert_eq!(Envelope::joined(&id).payload(), Some(&json!({"id": "peer-1"})));
        assert_eq!(Envelope::left(&id).kind(), &MessageType::Left);
    }

    #[test]
    fn test_history_envelope_preserves_order() {
        let a = Envelope::external(json!("a"), fixed_time());
        let b = Envelope::external(json!("b"), fixed_time());

        let history = Envelope::history(&[a.clone(), b.clone()]).unwrap();
        let entries: Vec<Envelope> =
            serde_json::from_value(history.payload().cloned().unwrap()).unwrap();
        assert_eq!(entries, vec![a, b]);
    }
}
