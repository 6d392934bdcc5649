//! Line-oriented TCP transport (the RawStream wire).
//!
//! One unit is one `\n`-terminated line. This is what `nc`/`telnet` style
//! clients speak.

use std::net::SocketAddr;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};

use crate::{
    Connection, FrameReader, FrameWriter, Incoming, Listener, TransportError,
    TransportKind,
};

/// Longest line accepted from a peer, newline included.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// A TCP listener producing line-oriented connections.
pub struct LineListener {
    listener: TcpListener,
}

impl LineListener {
    /// Binds a new line listener to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "raw stream transport listening");
        Ok(Self { listener })
    }
}

impl Listener for LineListener {
    type Incoming = LineIncoming;

    async fn accept(&mut self) -> Result<LineIncoming, TransportError> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::debug!(%peer, "accepted raw stream socket");
        Ok(LineIncoming { stream, peer })
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener
            .local_addr()
            .map_err(TransportError::AcceptFailed)
    }
}

/// An accepted TCP socket. Raw streams have no handshake, so
/// [`establish`](Incoming::establish) just wraps the socket.
pub struct LineIncoming {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Incoming for LineIncoming {
    type Connection = LineConnection;

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    async fn establish(self) -> Result<LineConnection, TransportError> {
        Ok(LineConnection { stream: self.stream })
    }
}

/// A single line-oriented TCP connection.
pub struct LineConnection {
    stream: TcpStream,
}

impl Connection for LineConnection {
    type Reader = LineReader;
    type Writer = LineWriter;

    fn kind(&self) -> TransportKind {
        TransportKind::RawStream
    }

    fn into_split(self) -> (LineReader, LineWriter) {
        let (read, write) = self.stream.into_split();
        (
            LineReader {
                reader: BufReader::new(read),
            },
            LineWriter { writer: write },
        )
    }
}

/// Reading half of a [`LineConnection`].
pub struct LineReader {
    reader: BufReader<OwnedReadHalf>,
}

impl FrameReader for LineReader {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut line = Vec::new();
        // `take` bounds how much a peer can make us buffer while we wait
        // for its newline.
        let read = (&mut self.reader)
            .take(MAX_LINE_BYTES as u64)
            .read_until(b'\n', &mut line)
            .await
            .map_err(TransportError::ReceiveFailed)?;

        if read == 0 {
            return Ok(None);
        }
        if line.last() != Some(&b'\n') {
            if line.len() >= MAX_LINE_BYTES {
                return Err(TransportError::ReceiveFailed(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "line exceeds maximum length",
                )));
            }
            // Partial final line before EOF.
            return Ok(None);
        }

        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Ok(Some(line))
    }
}

/// Writing half of a [`LineConnection`].
pub struct LineWriter {
    writer: OwnedWriteHalf,
}

impl FrameWriter for LineWriter {
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.writer
            .write_all(data)
            .await
            .map_err(TransportError::SendFailed)?;
        self.writer.flush().await.map_err(TransportError::SendFailed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.writer
            .shutdown()
            .await
            .map_err(TransportError::SendFailed)
    }
}
