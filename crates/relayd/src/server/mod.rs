//! HTTP and WebSocket server for the relay.
//!
//! The server:
//! - Accepts WebSocket upgrades at the configured path
//! - Spawns a ConnectionHandler for each peer
//! - Serves the collaborator HTTP routes next to it
//! - Drives the heartbeat while it runs
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   RelayServer   │
//! │  axum::Router   │
//! └───────┬─────────┘
//!         │ upgrade          HTTP routes
//!         ▼                       │
//! ┌─────────────────┐     ┌───────▼─────────┐
//! │ConnectionHandler│────▶│CoordinatorHandle│
//! │   (per peer)    │     │                 │
//! └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate's panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Per-connection errors are logged and never stop the server

mod connection;
pub mod rest;

pub use connection::{ConnectionError, ConnectionHandler, WRITE_TIMEOUT};

use std::net::SocketAddr;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::config::{ConfigError, RelayConfig};
use crate::coordinator::CoordinatorHandle;
use crate::heartbeat::spawn_heartbeat;

/// Shared state passed to axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: CoordinatorHandle,
    pub shutdown: CancellationToken,
    pub send_queue: usize,
    pub max_frame_bytes: usize,
}

/// Builds the router: WebSocket upgrades at `config.ws_path` plus the
/// HTTP routes, with permissive CORS.
pub fn build_router(
    config: &RelayConfig,
    coordinator: CoordinatorHandle,
    shutdown: CancellationToken,
) -> Router {
    let state = AppState {
        coordinator,
        shutdown,
        send_queue: config.send_queue,
        max_frame_bytes: config.max_frame_bytes,
    };

    Router::new()
        .route(&config.ws_path, get(ws_handler))
        .merge(rest::routes())
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.max_frame_size(state.max_frame_bytes)
        .max_message_size(state.max_frame_bytes)
        .on_upgrade(move |socket| async move {
            let handler =
                ConnectionHandler::new(state.coordinator, &state.shutdown, state.send_queue);
            let peer_id = handler.peer_id().clone();
            let reason = handler.run(socket).await;
            debug!(peer_id = %peer_id, %reason, "WebSocket peer finished");
        })
}

/// The relay's network front end.
pub struct RelayServer {
    /// Validated settings
    config: RelayConfig,

    /// Handle to the coordinator
    coordinator: CoordinatorHandle,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,
}

impl RelayServer {
    /// Creates a new relay server.
    ///
    /// # Errors
    ///
    /// - `ServerError::Config` if `config` does not validate
    pub fn new(
        config: RelayConfig,
        coordinator: CoordinatorHandle,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        Ok(Self {
            config,
            coordinator,
            cancel_token,
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Binds the configured address.
    ///
    /// Split from [`Self::serve`] so callers can learn the real port when
    /// binding port 0.
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let addr = self.config.bind_addr();
        TcpListener::bind(&addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr,
                error: e.to_string(),
            })
    }

    /// Serves on `listener` until the cancellation token is triggered.
    pub async fn serve(self, listener: TcpListener) -> Result<(), ServerError> {
        let local_addr: Option<SocketAddr> = listener.local_addr().ok();
        info!(
            addr = ?local_addr,
            ws_path = %self.config.ws_path,
            "Relay server listening"
        );

        let heartbeat_cancel = self.cancel_token.child_token();
        let heartbeat = spawn_heartbeat(
            self.coordinator.clone(),
            self.config.heartbeat_interval,
            heartbeat_cancel.clone(),
        );

        let router = build_router(&self.config, self.coordinator, self.cancel_token.clone());
        let shutdown = self.cancel_token.clone();

        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("Server shutdown requested");
            })
            .await
            .map_err(|e| ServerError::Serve(e.to_string()));

        heartbeat_cancel.cancel();
        let _ = heartbeat.await;

        info!("Server stopped");
        result
    }

    /// Binds and serves until shutdown.
    pub async fn run(self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }
}

/// Errors that stop the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: String, error: String },

    #[error("Server error: {0}")]
    Serve(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::spawn_coordinator;

    #[test]
    fn test_server_error_display() {
        let err = ServerError::Bind {
            addr: "0.0.0.0:4000".to_string(),
            error: "address in use".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to bind 0.0.0.0:4000: address in use");

        let err = ServerError::from(ConfigError::ZeroHeartbeatInterval);
        assert_eq!(
            err.to_string(),
            "Invalid configuration: heartbeat interval must be greater than zero"
        );
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let config = RelayConfig {
            ws_path: "/health".to_string(),
            ..Default::default()
        };
        let result = RelayServer::new(config, spawn_coordinator(10, "hi"), CancellationToken::new());
        assert!(matches!(result, Err(ServerError::Config(_))));
    }

    #[tokio::test]
    async fn test_build_router_creates_routes() {
        let config = RelayConfig::default();
        let _router = build_router(&config, spawn_coordinator(10, "hi"), CancellationToken::new());
    }
}
