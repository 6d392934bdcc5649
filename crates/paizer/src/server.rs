//! `RelayServer` builder and server loop.
//!
//! This is the entry point for running a Paizer relay. It ties together
//! all the layers: transport → protocol → session → relay core.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use paizer_transport::{Incoming, LineListener, Listener, WebSocketListener};
use tokio::task::JoinHandle;

use crate::handler::handle_connection;
use crate::{HeartbeatMonitor, PaizerError, Relay, RelayConfig};

/// Pause after a failed accept so a persistent error (out of file
/// descriptors, say) does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Builder for configuring and starting a relay server.
///
/// At least one of the two listeners must be configured.
///
/// # Example
///
/// ```rust,ignore
/// use paizer::prelude::*;
///
/// let server = RelayServer::builder()
///     .bind_stream("0.0.0.0:32768")
///     .bind_websocket("0.0.0.0:32769")
///     .build()
///     .await?;
/// server.run().await
/// ```
#[derive(Debug, Clone, Default)]
pub struct RelayServerBuilder {
    stream_addr: Option<String>,
    websocket_addr: Option<String>,
    config: RelayConfig,
}

impl RelayServerBuilder {
    /// Creates a builder with no listeners and default timings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts raw line-oriented TCP clients on `addr`.
    pub fn bind_stream(mut self, addr: impl Into<String>) -> Self {
        self.stream_addr = Some(addr.into());
        self
    }

    /// Accepts WebSocket clients on `addr`.
    pub fn bind_websocket(mut self, addr: impl Into<String>) -> Self {
        self.websocket_addr = Some(addr.into());
        self
    }

    /// Sets the liveness and handshake timings.
    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Binds the configured listeners.
    ///
    /// # Errors
    /// [`PaizerError::NoListeners`] if neither listener was configured, or
    /// a transport error if binding fails.
    pub async fn build(self) -> Result<RelayServer, PaizerError> {
        if self.stream_addr.is_none() && self.websocket_addr.is_none() {
            return Err(PaizerError::NoListeners);
        }

        let stream = match &self.stream_addr {
            Some(addr) => Some(LineListener::bind(addr).await?),
            None => None,
        };
        let websocket = match &self.websocket_addr {
            Some(addr) => Some(WebSocketListener::bind(addr).await?),
            None => None,
        };

        Ok(RelayServer {
            stream,
            websocket,
            relay: Arc::new(Relay::new(self.config.validated())),
        })
    }
}

/// A bound relay server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct RelayServer {
    stream: Option<LineListener>,
    websocket: Option<WebSocketListener>,
    relay: Arc<Relay>,
}

impl RelayServer {
    /// Creates a new builder.
    pub fn builder() -> RelayServerBuilder {
        RelayServerBuilder::new()
    }

    /// Address of the raw stream listener, if one is bound.
    pub fn local_stream_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// Address of the WebSocket listener, if one is bound.
    pub fn local_websocket_addr(&self) -> Option<SocketAddr> {
        self.websocket.as_ref().and_then(|l| l.local_addr().ok())
    }

    /// The shared relay state, for inspection.
    pub fn relay(&self) -> Arc<Relay> {
        Arc::clone(&self.relay)
    }

    /// Runs the server until the process is terminated.
    pub async fn run(self) -> Result<(), PaizerError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loops and the heartbeat monitor until `shutdown`
    /// completes.
    ///
    /// On shutdown the accept loops and the monitor are stopped. Handlers
    /// for already-connected clients are not waited for.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), PaizerError>
    where
        F: Future<Output = ()>,
    {
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        if let Some(listener) = self.stream {
            if let Ok(addr) = listener.local_addr() {
                tracing::info!(%addr, "raw stream listener ready");
            }
            tasks.push(tokio::spawn(accept_loop(listener, Arc::clone(&self.relay))));
        }
        if let Some(listener) = self.websocket {
            if let Ok(addr) = listener.local_addr() {
                tracing::info!(%addr, "websocket listener ready");
            }
            tasks.push(tokio::spawn(accept_loop(listener, Arc::clone(&self.relay))));
        }
        tasks.push(HeartbeatMonitor::new(Arc::clone(&self.relay)).spawn());

        tracing::info!("Paizer relay running");
        shutdown.await;

        tracing::info!("shutting down");
        for task in tasks {
            task.abort();
        }
        Ok(())
    }
}

impl std::fmt::Debug for RelayServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayServer")
            .field("stream", &self.local_stream_addr())
            .field("websocket", &self.local_websocket_addr())
            .field("relay", &self.relay)
            .finish()
    }
}

/// Accepts connections forever, one handler task per connection.
async fn accept_loop<L: Listener>(mut listener: L, relay: Arc<Relay>) {
    loop {
        match listener.accept().await {
            Ok(incoming) => {
                let relay = Arc::clone(&relay);
                tokio::spawn(async move {
                    let peer = incoming.peer_addr();
                    if let Err(e) = handle_connection(incoming, relay).await {
                        tracing::debug!(%peer, error = %e, "connection ended with error");
                    }
                });
            }
            Err(e) => {
                tracing::error!(error = %e, "accept failed");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}
