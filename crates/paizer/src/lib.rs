//! # Paizer
//!
//! Real-time message relay for chat clients on two transports.
//!
//! Clients join over either a raw line-oriented TCP stream or a WebSocket
//! carrying one JSON object per frame. Every chat line a client sends is
//! relayed to all other joined clients, encoded for each recipient's own
//! transport. Joins and departures are announced, and clients that stop
//! proving liveness are evicted.
//!
//! The relay is layered:
//!
//! - [`paizer_transport`]: listeners and split connections
//! - [`paizer_protocol`]: messages and per-transport wire codecs
//! - [`paizer_session`]: sessions, send capabilities, the registry
//! - this crate: the relay core, the heartbeat monitor, the server
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use paizer::prelude::*;
//!
//! # async fn start() -> Result<(), PaizerError> {
//! let server = RelayServer::builder()
//!     .bind_stream("0.0.0.0:32768")
//!     .bind_websocket("0.0.0.0:32769")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```

mod broadcast;
mod config;
mod error;
mod handler;
mod heartbeat;
mod relay;
mod server;

pub use broadcast::Broadcaster;
pub use config::RelayConfig;
pub use error::PaizerError;
pub use heartbeat::HeartbeatMonitor;
pub use relay::{Departure, Relay, WELCOME};
pub use server::{RelayServer, RelayServerBuilder};

/// Commonly used types, re-exported for convenience.
pub mod prelude {
    pub use crate::{
        Departure, HeartbeatMonitor, PaizerError, Relay, RelayConfig, RelayServer,
        RelayServerBuilder, WELCOME,
    };
    pub use paizer_protocol::{Message, MessageKind, SessionId};
    pub use paizer_session::{Registry, Session};
    pub use paizer_transport::TransportKind;
}
