//! Relay coordinator using the Actor pattern.
//!
//! The coordinator is the single owner of the roster and the history ring.
//! Peer tasks, HTTP routes and the heartbeat timer all talk to it through a
//! tokio mpsc channel, so joins, leaves and broadcasts are totally ordered.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐                       ┌──────────────────┐
//! │  Peer tasks     │──┐                 ┌─▶│ PeerLink queues  │
//! └─────────────────┘  │                 │  └──────────────────┘
//! ┌─────────────────┐  │ CoordinatorCmd  │          │
//! │  HTTP routes    │──┼──(mpsc)──▶ CoordinatorActor│ Outbound frames
//! └─────────────────┘  │                 │          ▼
//! ┌─────────────────┐  │                 │   peer writer tasks
//! │  Heartbeat      │──┘   ConnectionRegistry + HistoryRing
//! └─────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All operations in this module follow the panic-free policy:
//! - No `.unwrap()` or `.expect()` in production code
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

use tokio::sync::mpsc;

mod actor;
mod commands;
mod handle;

pub use actor::{CoordinatorActor, DEFAULT_WELCOME_MESSAGE};
pub use commands::{
    CoordinatorCommand, DisconnectReason, HealthInfo, RelayError, SweepReport, Welcome,
};
pub use handle::CoordinatorHandle;

/// Channel buffer size
const COMMAND_BUFFER: usize = 256;

/// Spawn the coordinator actor and return a handle for interaction.
///
/// The heartbeat is not started here; see
/// [`spawn_heartbeat`](crate::heartbeat::spawn_heartbeat).
///
/// # Example
///
/// ```no_run
/// use relayd::coordinator::spawn_coordinator;
///
/// #[tokio::main]
/// async fn main() {
///     let handle = spawn_coordinator(50, "Welcome to the relay");
///
///     let roster = handle.list_client_ids().await;
///     assert!(roster.is_empty());
/// }
/// ```
pub fn spawn_coordinator(
    history_capacity: usize,
    welcome_message: impl Into<String>,
) -> CoordinatorHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);

    let actor = CoordinatorActor::new(cmd_rx, history_capacity, welcome_message);
    tokio::spawn(actor.run());

    CoordinatorHandle::new(cmd_tx)
}
