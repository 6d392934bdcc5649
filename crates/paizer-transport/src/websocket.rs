//! WebSocket transport implementation using `tokio-tungstenite`
//! (the FramedJSON wire).

use std::net::SocketAddr;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;

use crate::{
    Connection, FrameReader, FrameWriter, Incoming, Listener, TransportError,
    TransportKind,
};

type WsStream = tokio_tungstenite::WebSocketStream<TcpStream>;

/// A WebSocket-based [`Listener`].
pub struct WebSocketListener {
    listener: TcpListener,
}

impl WebSocketListener {
    /// Binds a new WebSocket listener to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self { listener })
    }
}

impl Listener for WebSocketListener {
    type Incoming = WebSocketIncoming;

    async fn accept(&mut self) -> Result<WebSocketIncoming, TransportError> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::debug!(%peer, "accepted WebSocket socket");
        Ok(WebSocketIncoming { stream, peer })
    }

    fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener
            .local_addr()
            .map_err(TransportError::AcceptFailed)
    }
}

/// A TCP socket waiting for its WebSocket upgrade.
pub struct WebSocketIncoming {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Incoming for WebSocketIncoming {
    type Connection = WebSocketConnection;

    fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    async fn establish(self) -> Result<WebSocketConnection, TransportError> {
        let ws = tokio_tungstenite::accept_async(self.stream)
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;
        tracing::debug!(peer = %self.peer, "WebSocket handshake complete");
        Ok(WebSocketConnection { ws })
    }
}

/// A single established WebSocket connection.
pub struct WebSocketConnection {
    ws: WsStream,
}

impl Connection for WebSocketConnection {
    type Reader = WebSocketReader;
    type Writer = WebSocketWriter;

    fn kind(&self) -> TransportKind {
        TransportKind::FramedJson
    }

    fn into_split(self) -> (WebSocketReader, WebSocketWriter) {
        let (sink, stream) = self.ws.split();
        (WebSocketReader { stream }, WebSocketWriter { sink })
    }
}

/// Receiving half of a [`WebSocketConnection`].
pub struct WebSocketReader {
    stream: SplitStream<WsStream>,
}

impl FrameReader for WebSocketReader {
    async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Binary(data))) => {
                    return Ok(Some(data.to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // skip ping/pong/frame
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(
                        std::io::Error::new(
                            std::io::ErrorKind::ConnectionReset,
                            e,
                        ),
                    ));
                }
            }
        }
    }
}

/// Sending half of a [`WebSocketConnection`].
pub struct WebSocketWriter {
    sink: SplitSink<WsStream, Message>,
}

impl FrameWriter for WebSocketWriter {
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        // JSON is text; browsers hand binary frames to scripts as Blobs.
        let msg = match std::str::from_utf8(data) {
            Ok(text) => Message::text(text.to_owned()),
            Err(_) => Message::binary(data.to_vec()),
        };
        self.sink.send(msg).await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.sink.close().await.map_err(|e| {
            TransportError::SendFailed(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))
        })
    }
}
