//! Error types for the relay client.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use relay_protocol::ProtocolError;
use thiserror::Error;

// ============================================================================
// Client Error Type
// ============================================================================

/// Errors that can occur while talking to a relay.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Failed to open the WebSocket.
    ///
    /// Usually the relay is not running or the URL is wrong.
    #[error("Failed to connect to relay at {url}: {reason}")]
    Connection {
        /// The URL that was dialed.
        url: String,
        /// Underlying failure.
        reason: String,
    },

    /// The socket failed after it was established.
    #[error("WebSocket error: {0}")]
    Socket(String),

    /// A frame could not be encoded or decoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// An operation needed an identity the relay has not assigned yet.
    #[error("Not joined: no welcome received yet")]
    NotJoined,

    /// The operation was cancelled before it finished.
    #[error("Cancelled")]
    Cancelled,
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Socket(err.to_string())
    }
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::Connection {
            url: "ws://127.0.0.1:4000/ws".to_string(),
            reason: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to connect to relay at ws://127.0.0.1:4000/ws: connection refused"
        );
        assert_eq!(ClientError::Cancelled.to_string(), "Cancelled");
    }

    #[test]
    fn test_protocol_error_conversion() {
        let err: ClientError = ProtocolError::MissingType.into();
        assert!(matches!(err, ClientError::Protocol(ProtocolError::MissingType)));
    }
}
