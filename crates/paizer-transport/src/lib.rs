//! Transport abstraction layer for Paizer.
//!
//! Provides the [`Listener`], [`Incoming`], and [`Connection`] traits that
//! abstract over the two wire transports the relay speaks:
//!
//! - **RawStream** — newline-delimited text over plain TCP ([`LineListener`])
//! - **FramedJSON** — one JSON object per WebSocket frame ([`WebSocketListener`])
//!
//! The layer only moves opaque units of bytes. It has no idea what a chat
//! message or a heartbeat is; that is the protocol crate's job.
//!
//! ```text
//! Listener ──accept()──→ Incoming ──establish()──→ Connection
//!                                                     │
//!                                           into_split()
//!                                                     ▼
//!                                      FrameReader + FrameWriter
//! ```
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket transport via `tokio-tungstenite`

use std::fmt;
use std::future::Future;
use std::net::SocketAddr;

mod error;
mod line;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
pub use line::{LineConnection, LineIncoming, LineListener, LineReader, LineWriter, MAX_LINE_BYTES};
#[cfg(feature = "websocket")]
pub use websocket::{
    WebSocketConnection, WebSocketIncoming, WebSocketListener, WebSocketReader,
    WebSocketWriter,
};

/// Which wire transport a connection uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// Line-oriented text over a raw TCP stream.
    RawStream,
    /// JSON objects carried in WebSocket frames.
    FramedJson,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RawStream => f.write_str("raw-stream"),
            Self::FramedJson => f.write_str("framed-json"),
        }
    }
}

/// Accepts new incoming sockets.
///
/// `accept` only takes the socket off the listen queue. Any protocol
/// upgrade (the WebSocket handshake) is deferred to [`Incoming::establish`],
/// which runs inside the per-connection task, so one slow client can never
/// stall the accept loop.
///
/// Every future returned here is `Send` so generic code can hand it to
/// `tokio::spawn`.
pub trait Listener: Send + Sync + 'static {
    /// The not-yet-established connection produced by this listener.
    type Incoming: Incoming;

    /// Waits for and accepts the next incoming socket.
    fn accept(
        &mut self,
    ) -> impl Future<Output = Result<Self::Incoming, TransportError>> + Send;

    /// Returns the local address the listener is bound to.
    fn local_addr(&self) -> Result<SocketAddr, TransportError>;
}

/// A freshly accepted socket that still has to finish its transport
/// handshake.
pub trait Incoming: Send + 'static {
    /// The connection type produced once the handshake completes.
    type Connection: Connection;

    /// The remote peer's socket address.
    fn peer_addr(&self) -> SocketAddr;

    /// Completes the transport handshake (a no-op for raw TCP).
    fn establish(
        self,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// An established connection that can be split into independent read and
/// write halves.
pub trait Connection: Send + 'static {
    /// The receiving half.
    type Reader: FrameReader;
    /// The sending half.
    type Writer: FrameWriter;

    /// Which transport this connection speaks.
    fn kind(&self) -> TransportKind;

    /// Splits the connection so reads and writes can run in different tasks.
    fn into_split(self) -> (Self::Reader, Self::Writer);
}

/// The receiving half of a [`Connection`].
pub trait FrameReader: Send + 'static {
    /// Receives the next unit (a line, or a frame payload).
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &mut self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;
}

/// The sending half of a [`Connection`].
pub trait FrameWriter: Send + 'static {
    /// Sends one already-encoded unit to the remote peer.
    fn send(
        &mut self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Closes the sending side of the connection.
    fn close(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send;
}
