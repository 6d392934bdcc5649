//! Session tracking for Paizer.
//!
//! This crate knows who is connected and how to reach them:
//!
//! 1. **Identity** — unique, never-reused session ids ([`IdAllocator`])
//! 2. **Sessions** — one record per joined client ([`Session`]), each with
//!    a transport-specific send capability ([`Outlet`])
//! 3. **Registry** — the shared id → session map ([`Registry`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Relay (above)  ← broadcasts through outlets, evicts via the registry
//!     ↕
//! Session Layer (this crate)  ← who is connected, how to reach them
//!     ↕
//! Protocol Layer (below)  ← SessionId, Message, WireCodec
//! ```

mod error;
mod id;
mod outlet;
mod registry;
mod session;

pub use error::SessionError;
pub use id::IdAllocator;
pub use outlet::{Outbound, OutboundReceiver, Outlet};
pub use registry::Registry;
pub use session::Session;
