//! The shared relay core every task works through.
//!
//! `Relay` bundles the registry, the id allocator, the broadcaster, and
//! the config. It is created once per server and shared as `Arc<Relay>`
//! by the accept loops, every connection handler, and the heartbeat
//! monitor. The registry inside it is the only shared mutable state.

use std::fmt;
use std::sync::Arc;

use paizer_protocol::{Message, SessionId};
use paizer_session::{IdAllocator, Registry, Session};

use crate::{Broadcaster, PaizerError, RelayConfig};

/// Sent to each client right after it joins.
pub const WELCOME: &str = "You have successfully joined the server!";

/// Why a session ended. Only used for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// The peer closed the connection cleanly.
    PeerClosed,
    /// Reading from the peer failed.
    ReadFailed,
    /// Writing to the peer failed (including the heartbeat probe).
    WriteFailed,
    /// The per-connection inactivity timer fired.
    IdleTimeout,
    /// The heartbeat monitor found the session stale.
    HeartbeatTimeout,
    /// Someone else already evicted the session.
    Evicted,
}

impl fmt::Display for Departure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::PeerClosed => "peer closed the connection",
            Self::ReadFailed => "read failed",
            Self::WriteFailed => "write failed",
            Self::IdleTimeout => "heartbeat timeout",
            Self::HeartbeatTimeout => "heartbeat detection failed",
            Self::Evicted => "evicted",
        };
        f.write_str(text)
    }
}

/// Shared state for one relay server.
#[derive(Debug)]
pub struct Relay {
    registry: Arc<Registry>,
    ids: IdAllocator,
    broadcaster: Broadcaster,
    config: RelayConfig,
}

impl Relay {
    /// Creates a relay with an empty registry.
    pub fn new(config: RelayConfig) -> Self {
        let registry = Arc::new(Registry::new());
        Self {
            broadcaster: Broadcaster::new(Arc::clone(&registry)),
            registry,
            ids: IdAllocator::new(),
            config,
        }
    }

    /// The client registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The relay's timing configuration.
    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Allocates the id for a newly joining client.
    pub fn next_id(&self) -> SessionId {
        self.ids.next()
    }

    /// Fans `msg` out to everyone except `exclude`.
    pub async fn broadcast(&self, msg: &Message, exclude: Option<SessionId>) -> usize {
        self.broadcaster.broadcast(msg, exclude).await
    }

    /// Registers a freshly joined session, announces it to everyone else,
    /// and queues the welcome notice for the newcomer.
    ///
    /// # Errors
    /// Fails only if the id is already registered (an internal bug).
    pub async fn admit(&self, session: Arc<Session>) -> Result<(), PaizerError> {
        self.registry.register(Arc::clone(&session)).await?;

        tracing::info!(
            id = %session.id(),
            user = session.name(),
            ip = %session.short_address(),
            transport = %session.kind(),
            "joined the chat"
        );
        self.broadcast(&Message::join(session.sender()), Some(session.id()))
            .await;

        // The newcomer's handler may already be gone; eviction will follow.
        if let Err(e) = session
            .outlet()
            .deliver(session.id(), &Message::system(WELCOME))
        {
            tracing::debug!(id = %session.id(), error = %e, "welcome not delivered");
        }
        Ok(())
    }

    /// Relays chat text from `session` to everyone else.
    pub async fn relay_chat(&self, session: &Session, text: &str) -> usize {
        tracing::info!(
            id = %session.id(),
            user = session.name(),
            ip = %session.short_address(),
            content = text,
            "chat"
        );
        self.broadcast(&Message::chat(session.sender(), text), Some(session.id()))
            .await
    }

    /// Removes a session and announces its departure.
    ///
    /// This is the only removal path, used both by a handler that saw its
    /// own connection fail and by the heartbeat monitor. Because
    /// [`Registry::unregister`] is idempotent, whichever caller gets there
    /// first performs the eviction and the Leave broadcast; later callers
    /// get `false` and nothing is announced twice.
    pub async fn evict(&self, id: SessionId, cause: Departure) -> bool {
        let Some(session) = self.registry.unregister(id).await else {
            tracing::debug!(%id, %cause, "session already removed");
            return false;
        };

        // Tell the owning handler to release the socket. A no-op if the
        // handler is the one evicting.
        session.outlet().close();

        tracing::info!(
            %id,
            user = session.name(),
            ip = %session.short_address(),
            %cause,
            "left the chat"
        );
        self.broadcast(&Message::leave(session.sender()), Some(id)).await;
        true
    }
}
