//! Liveness probing.
//!
//! Every interval each peer is either terminated (it never answered the
//! previous probe) or marked unanswered and probed again. A peer that acks
//! in between is marked alive by the coordinator. So a silent peer survives
//! at most two intervals.

use std::time::Duration;

use relay_protocol::PeerId;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::connections::{ConnectionRegistry, Outbound};
use crate::coordinator::CoordinatorHandle;

/// Default time between sweeps.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Outcome of [`sweep`] before the coordinator removes anyone.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Sweep {
    /// Peers that were sent a probe
    pub probed: usize,
    /// Peers that never answered the previous probe, in join order
    pub unanswered: Vec<PeerId>,
}

/// Flags every live peer as unanswered and queues a probe for it.
///
/// Peers already flagged are collected in `unanswered` and left in the
/// registry; the caller decides how to remove and announce them.
pub fn sweep(registry: &mut ConnectionRegistry) -> Sweep {
    let mut result = Sweep::default();

    for id in registry.ids() {
        match registry.is_alive(&id) {
            Some(true) => {
                registry.set_alive(&id, false);
                match registry.send_to(&id, Outbound::Ping) {
                    Ok(()) => result.probed += 1,
                    Err(e) => debug!(peer_id = %id, error = %e, "Probe not queued"),
                }
            }
            Some(false) => result.unanswered.push(id),
            None => {}
        }
    }

    result
}

/// Spawn a background task that asks the coordinator for a sweep every
/// `period`, until `cancel` fires or the coordinator stops.
///
/// The first sweep happens one full period after spawning.
pub fn spawn_heartbeat(
    handle: CoordinatorHandle,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Heartbeat task cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    match handle.heartbeat_sweep().await {
                        Ok(report) if !report.terminated.is_empty() => {
                            info!(
                                probed = report.probed,
                                terminated = report.terminated.len(),
                                "Heartbeat terminated unresponsive peers"
                            );
                        }
                        Ok(_) => {}
                        Err(_) => {
                            debug!("Heartbeat task stopping: coordinator channel closed");
                            break;
                        }
                    }
                }
            }
        }
    })
}
