//! The per-session send capability.
//!
//! Nothing outside a connection's own handler ever touches its socket.
//! Everyone else (the broadcaster, the heartbeat monitor) goes through the
//! session's [`Outlet`]: encode with the session's codec, then queue the
//! bytes on a channel the handler drains. This keeps network writes out of
//! the registry lock and out of other clients' tasks.

use std::sync::Arc;

use paizer_protocol::{Message, SessionId, WireCodec};
use paizer_transport::TransportKind;
use tokio::sync::mpsc;

/// What an outlet can hand to its connection handler.
#[derive(Debug, PartialEq, Eq)]
pub enum Outbound {
    /// One encoded unit to write to the peer.
    Frame(Vec<u8>),
    /// Stop: the session was evicted and its connection must be released.
    Close,
}

/// Receiving end of an [`Outlet`], owned by the connection handler.
pub type OutboundReceiver = mpsc::UnboundedReceiver<Outbound>;

/// Encodes messages for one session and queues them for its handler.
///
/// Cheap to clone: an `Arc` to the codec plus a channel sender.
#[derive(Clone)]
pub struct Outlet {
    codec: Arc<dyn WireCodec>,
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Outlet {
    /// Creates an outlet and the receiver its handler drains.
    pub fn new(codec: Arc<dyn WireCodec>) -> (Self, OutboundReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { codec, tx }, rx)
    }

    /// The transport the codec targets.
    pub fn kind(&self) -> TransportKind {
        self.codec.kind()
    }

    /// Encodes `msg` for this session's transport and queues it.
    ///
    /// `id` is only used to label the error.
    pub fn deliver(
        &self,
        id: SessionId,
        msg: &Message,
    ) -> Result<(), crate::SessionError> {
        let bytes = self.codec.encode(msg)?;
        self.tx
            .send(Outbound::Frame(bytes))
            .map_err(|_| crate::SessionError::OutletClosed(id))
    }

    /// Asks the handler to release the connection.
    ///
    /// Returns `false` if the handler is already gone, which is fine:
    /// there is nothing left to release.
    pub fn close(&self) -> bool {
        self.tx.send(Outbound::Close).is_ok()
    }

    /// Returns `true` once the handler has dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl std::fmt::Debug for Outlet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outlet")
            .field("kind", &self.kind())
            .field("closed", &self.is_closed())
            .finish()
    }
}
