//! Relay daemon - connection registry, history and broadcast coordinator
//!
//! This crate provides the core infrastructure for the relay:
//! - `coordinator` - Actor that owns the roster and history and orders all events
//! - `connections` - Registry of live peers and their outbound queues
//! - `history` - Bounded replay buffer
//! - `heartbeat` - Liveness probing of idle peers
//! - `server` - axum WebSocket endpoint and collaborator HTTP routes
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        relayd                               │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │   RelayServer   │────▶│     CoordinatorActor        │    │
//! │  │  (axum Router)  │     │  (roster + history owner)   │    │
//! │  └────────┬────────┘     └──────────────┬──────────────┘    │
//! │           │                             │                   │
//! │           │ upgrades                    │ Outbound frames   │
//! │           ▼                             ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐    │
//! │  │ConnectionHandler│◀────│   PeerLink (bounded mpsc)   │    │
//! │  │   (per peer)    │     │   one per peer              │    │
//! │  └─────────────────┘     └─────────────────────────────┘    │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod connections;
pub mod coordinator;
pub mod heartbeat;
pub mod history;
pub mod server;

pub use config::{ConfigError, RelayConfig};
pub use coordinator::{spawn_coordinator, CoordinatorHandle, DisconnectReason, RelayError};
pub use server::{RelayServer, ServerError};
