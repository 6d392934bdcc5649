//! Fan-out of one logical message to every registered session.

use std::sync::Arc;

use paizer_protocol::{Message, MessageKind, SessionId};
use paizer_session::Registry;

/// Delivers messages to all (or all-but-one) registered sessions.
///
/// Delivery is best-effort per recipient: each session's [`Outlet`]
/// encodes for its own transport and queues the bytes; if one recipient
/// fails (its handler is already gone, or encoding failed) that is logged
/// and the fan-out carries on. Nothing is reported back to whoever
/// triggered the broadcast.
///
/// [`Outlet`]: paizer_session::Outlet
#[derive(Debug, Clone)]
pub struct Broadcaster {
    registry: Arc<Registry>,
}

impl Broadcaster {
    /// Creates a broadcaster over the given registry.
    pub fn new(registry: Arc<Registry>) -> Self {
        Self { registry }
    }

    /// Sends `msg` to every registered session except `exclude`.
    ///
    /// Returns how many recipients the message was queued for. Heartbeats
    /// are point-to-point probes and are refused here.
    pub async fn broadcast(
        &self,
        msg: &Message,
        exclude: Option<SessionId>,
    ) -> usize {
        if msg.kind == MessageKind::Heartbeat {
            tracing::warn!("refusing to broadcast a heartbeat");
            return 0;
        }

        // Copy the recipient list, then release the lock before encoding.
        let recipients = self.registry.snapshot().await;

        let mut delivered = 0;
        for session in recipients {
            if Some(session.id()) == exclude {
                continue;
            }
            match session.outlet().deliver(session.id(), msg) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::warn!(
                        recipient = %session.id(),
                        error = %e,
                        "failed to deliver broadcast, skipping recipient"
                    );
                }
            }
        }

        tracing::trace!(kind = ?msg.kind, delivered, "broadcast complete");
        delivered
    }
}
