//! Error types for the session layer.

use paizer_protocol::{ProtocolError, SessionId};

/// Errors that can occur while tracking sessions or delivering to them.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A session with this id is already registered.
    ///
    /// Ids come from [`IdAllocator`](crate::IdAllocator) and are never
    /// reused, so seeing this means an internal invariant broke.
    #[error("session {0} is already registered")]
    AlreadyRegistered(SessionId),

    /// The session's handler has already shut down, so nothing can be
    /// queued for it any more.
    #[error("outlet for session {0} is closed")]
    OutletClosed(SessionId),

    /// The message could not be encoded for this session's transport.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
