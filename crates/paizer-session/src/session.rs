//! Session: the server's record of one joined client.
//!
//! A session tracks:
//! - WHO the client is (id, display name, peer address)
//! - HOW to reach it (its [`Outlet`])
//! - WHEN it last proved it was alive (the heartbeat timestamp)

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use paizer_protocol::{Sender, SessionId, short_address};
use paizer_transport::TransportKind;
use tokio::time::Instant;

use crate::Outlet;

/// A single joined client.
///
/// Sessions are shared as `Arc<Session>` between the registry, the
/// connection handler that owns the socket, and whoever is broadcasting.
/// Everything but the heartbeat timestamp is immutable after creation.
///
/// # Liveness timestamp
///
/// The last heartbeat is stored as microseconds since `joined_at` in an
/// `AtomicU64` and only ever moved forward with `fetch_max`. Two racing
/// [`touch`](Self::touch) calls can therefore never move it backwards,
/// and no lock is needed to update it.
///
/// The clock is `tokio::time::Instant` so tests can pause and advance
/// time.
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    name: String,
    address: String,
    joined_at: Instant,
    last_heartbeat_us: AtomicU64,
    outlet: Outlet,
}

impl Session {
    /// Creates a session whose last heartbeat is "now".
    pub fn new(
        id: SessionId,
        name: impl Into<String>,
        address: impl Into<String>,
        outlet: Outlet,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            address: address.into(),
            joined_at: Instant::now(),
            last_heartbeat_us: AtomicU64::new(0),
            outlet,
        }
    }

    /// The session's unique id.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Client-supplied display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Peer address, unshortened.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Peer address shortened for display.
    pub fn short_address(&self) -> String {
        short_address(&self.address)
    }

    /// The transport this client is connected over.
    pub fn kind(&self) -> TransportKind {
        self.outlet.kind()
    }

    /// The session's send capability.
    pub fn outlet(&self) -> &Outlet {
        &self.outlet
    }

    /// The sender block to stamp on messages about this session.
    pub fn sender(&self) -> Sender {
        Sender {
            id: self.id,
            name: self.name.clone(),
            address: self.address.clone(),
        }
    }

    /// When the session was created.
    pub fn joined_at(&self) -> Instant {
        self.joined_at
    }

    /// Records liveness proof received now.
    pub fn touch(&self) {
        self.touch_at(Instant::now());
    }

    /// Records liveness proof received at `at`. Earlier instants than the
    /// current value are ignored.
    pub fn touch_at(&self, at: Instant) {
        let offset = at.saturating_duration_since(self.joined_at);
        let micros = u64::try_from(offset.as_micros()).unwrap_or(u64::MAX);
        self.last_heartbeat_us.fetch_max(micros, Ordering::Relaxed);
    }

    /// When the session last proved it was alive.
    pub fn last_heartbeat(&self) -> Instant {
        let micros = self.last_heartbeat_us.load(Ordering::Relaxed);
        self.joined_at + Duration::from_micros(micros)
    }

    /// How long the session has been silent as of `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_heartbeat())
    }
}
