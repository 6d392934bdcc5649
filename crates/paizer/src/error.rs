//! Unified error type for the Paizer relay.

use paizer_protocol::ProtocolError;
use paizer_session::SessionError;
use paizer_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` attribute on each variant auto-generates `From` impls,
/// so the `?` operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum PaizerError {
    /// A transport-level error (accept, handshake, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (duplicate id, closed outlet).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The join handshake failed. No session was created.
    #[error("join handshake failed: {0}")]
    Handshake(String),

    /// The server was built without any listener.
    #[error("no listener configured; bind a stream or WebSocket address")]
    NoListeners,
}
