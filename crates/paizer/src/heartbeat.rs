//! Heartbeat monitor: the background sweep that evicts silent sessions.
//!
//! A peer that dies without closing its socket (power loss, a yanked
//! cable, a NAT that forgot the mapping) never produces a read error.
//! The monitor is the safety net for that case: every `sweep_interval` it
//! scans the registry and evicts any session whose last heartbeat is older
//! than `stale_after`. It does not depend on the peer ever doing anything.

use std::sync::Arc;

use paizer_protocol::SessionId;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::{Departure, Relay};

/// Periodically evicts sessions that stopped proving liveness.
#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    relay: Arc<Relay>,
}

impl HeartbeatMonitor {
    /// Creates a monitor for the given relay.
    pub fn new(relay: Arc<Relay>) -> Self {
        Self { relay }
    }

    /// Starts the periodic sweep on its own task.
    ///
    /// The first sweep runs one full period after start. Abort the
    /// returned handle to stop the monitor.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }

    async fn run(self) {
        let period = self.relay.config().sweep_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        // A late sweep should not be followed by a burst of catch-up sweeps.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::debug!(?period, "heartbeat monitor started");
        loop {
            ticker.tick().await;
            let evicted = self.sweep().await;
            if !evicted.is_empty() {
                tracing::debug!(count = evicted.len(), "sweep evicted sessions");
            }
        }
    }

    /// Runs one sweep and returns the ids this sweep evicted.
    ///
    /// A session that some other path removed between the snapshot and
    /// the eviction is skipped silently; it is not in the result.
    pub async fn sweep(&self) -> Vec<SessionId> {
        let stale_after = self.relay.config().stale_after;
        let now = Instant::now();

        let mut evicted = Vec::new();
        for session in self.relay.registry().snapshot().await {
            let silent_for = session.idle_for(now);
            if silent_for <= stale_after {
                continue;
            }
            tracing::info!(
                id = %session.id(),
                user = session.name(),
                ip = %session.short_address(),
                ?silent_for,
                "heartbeat detection failed"
            );
            if self
                .relay
                .evict(session.id(), Departure::HeartbeatTimeout)
                .await
            {
                evicted.push(session.id());
            }
        }
        evicted
    }
}
