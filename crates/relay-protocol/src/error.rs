//! Protocol error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur while decoding frames and envelopes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The frame was not valid JSON
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// The frame was valid JSON but not an object
    #[error("frame is not a JSON object")]
    NotAnObject,

    /// The object has no `type` field
    #[error("frame has no type field")]
    MissingType,

    /// The `type` field is present but not a string
    #[error("type field must be a string")]
    InvalidType,

    /// A server envelope carried a payload of the wrong shape
    #[error("unexpected payload for {kind}: {reason}")]
    UnexpectedPayload { kind: String, reason: String },
}

impl ProtocolError {
    /// Creates an invalid-JSON error from any error type.
    pub fn json<E: std::fmt::Display>(err: E) -> Self {
        Self::InvalidJson(err.to_string())
    }
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_error_display() {
        assert_eq!(
            ProtocolError::NotAnObject.to_string(),
            "frame is not a JSON object"
        );
        assert_eq!(
            ProtocolError::MissingType.to_string(),
            "frame has no type field"
        );

        let err = ProtocolError::UnexpectedPayload {
            kind: "server:joined".to_string(),
            reason: "missing id".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unexpected payload for server:joined: missing id"
        );
    }

    #[test]
    fn test_json_helper() {
        let err = ProtocolError::json("EOF while parsing");
        assert!(matches!(err, ProtocolError::InvalidJson(_)));
        assert!(err.to_string().contains("EOF while parsing"));
    }
}
