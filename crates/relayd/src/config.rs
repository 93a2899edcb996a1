//! Relay configuration.
//!
//! `RelayConfig` carries everything the daemon needs to start. The binary
//! fills it from flags and environment; tests build it by hand.

use std::time::Duration;

use thiserror::Error;

use crate::coordinator::DEFAULT_WELCOME_MESSAGE;
use crate::heartbeat::DEFAULT_HEARTBEAT_INTERVAL;
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::server::rest::HTTP_ROUTES;

/// Default listening port
pub const DEFAULT_PORT: u16 = 4000;

/// Default WebSocket upgrade path
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Default bind address
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default per-peer outbound queue length
pub const DEFAULT_SEND_QUEUE: usize = 256;

/// Default largest inbound frame or message accepted from a peer
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;

/// Frames queued to a new peer before it is announced:
/// welcome, history and roster.
pub const JOIN_BURST: usize = 3;

/// Errors detected while validating a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("WebSocket path must start with '/': {0}")]
    WsPathNotAbsolute(String),

    #[error("WebSocket path {0} collides with an HTTP route")]
    WsPathCollision(String),

    #[error("heartbeat interval must be greater than zero")]
    ZeroHeartbeatInterval,

    #[error("send queue of {got} cannot hold the join burst (need at least {min})")]
    SendQueueTooSmall { got: usize, min: usize },

    #[error("max frame size must be greater than zero")]
    ZeroMaxFrame,
}

/// Runtime settings for the relay daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Address to bind
    pub host: String,
    /// Port to bind; 0 picks a free one
    pub port: u16,
    /// Path that accepts WebSocket upgrades
    pub ws_path: String,
    /// Envelopes kept for replay
    pub history_capacity: usize,
    /// Time between liveness sweeps
    pub heartbeat_interval: Duration,
    /// Outbound frames buffered per peer before dropping
    pub send_queue: usize,
    /// Largest frame accepted from a peer
    pub max_frame_bytes: usize,
    /// Greeting carried in `server:welcome`
    pub welcome_message: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            ws_path: DEFAULT_WS_PATH.to_string(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            send_queue: DEFAULT_SEND_QUEUE,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            welcome_message: DEFAULT_WELCOME_MESSAGE.to_string(),
        }
    }
}

impl RelayConfig {
    /// Checks the settings for values the relay cannot run with.
    ///
    /// # Errors
    ///
    /// Returns the first `ConfigError` found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.ws_path.starts_with('/') {
            return Err(ConfigError::WsPathNotAbsolute(self.ws_path.clone()));
        }
        if HTTP_ROUTES.contains(&self.ws_path.as_str()) {
            return Err(ConfigError::WsPathCollision(self.ws_path.clone()));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::ZeroHeartbeatInterval);
        }
        if self.send_queue < JOIN_BURST {
            return Err(ConfigError::SendQueueTooSmall {
                got: self.send_queue,
                min: JOIN_BURST,
            });
        }
        if self.max_frame_bytes == 0 {
            return Err(ConfigError::ZeroMaxFrame);
        }
        Ok(())
    }

    /// Returns the `host:port` string to bind.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.port, 4000);
        assert_eq!(config.ws_path, "/ws");
        assert_eq!(config.history_capacity, 50);
        assert_eq!(config.heartbeat_interval, Duration::from_millis(30_000));
        assert_eq!(config.bind_addr(), "0.0.0.0:4000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_ws_path_must_be_absolute() {
        let config = RelayConfig {
            ws_path: "ws".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::WsPathNotAbsolute("ws".to_string()))
        );
    }

    #[test]
    fn test_ws_path_cannot_shadow_http_routes() {
        for route in ["/health", "/clients", "/messages", "/message"] {
            let config = RelayConfig {
                ws_path: route.to_string(),
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::WsPathCollision(_))
            ));
        }
    }

    #[test]
    fn test_zero_heartbeat_rejected() {
        let config = RelayConfig {
            heartbeat_interval: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroHeartbeatInterval));
    }

    #[test]
    fn test_send_queue_must_hold_join_burst() {
        let config = RelayConfig {
            send_queue: 2,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::SendQueueTooSmall { got: 2, min: 3 })
        );

        let config = RelayConfig {
            send_queue: JOIN_BURST,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_history_is_allowed() {
        let config = RelayConfig {
            history_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            ConfigError::SendQueueTooSmall { got: 1, min: 3 }.to_string(),
            "send queue of 1 cannot hold the join burst (need at least 3)"
        );
        assert_eq!(
            ConfigError::WsPathCollision("/health".to_string()).to_string(),
            "WebSocket path /health collides with an HTTP route"
        );
    }
}
