//! Terminal client library for the socket relay.
//!
//! - `client` - WebSocket connection, event decoding and reconnect backoff
//! - `state` - Identity and roster tracking from server events
//! - `render` - One-line text rendering of relay traffic
//! - `error` - Client error types
//!
//! **Panic-Free Policy:** This crate follows the project's panic-free guidelines.

pub mod client;
pub mod error;
pub mod render;
pub mod state;

pub use client::{connect_with_retry, ClientConfig, RelayClient, DEFAULT_URL};
pub use error::{ClientError, Result};
pub use state::{ClientState, Origin};
