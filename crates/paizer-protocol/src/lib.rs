//! Wire protocol for Paizer.
//!
//! This crate defines the "language" the relay speaks:
//!
//! - **Types** ([`Message`], [`MessageKind`], [`Frame`], [`SessionId`]) —
//!   the logical messages the relay fans out, and the JSON object
//!   FramedJSON clients exchange.
//! - **Codecs** ([`WireCodec`], [`LineCodec`], [`JsonCodec`]) — how one
//!   logical message becomes bytes for a given transport, and how a
//!   client's bytes become an [`Inbound`] unit.
//! - **Errors** ([`ProtocolError`]) — what can go wrong in between.
//!
//! # Architecture
//!
//! ```text
//! Transport (bytes) → Protocol (Message / Inbound) → Session (who sent it)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{HEARTBEAT_TOKEN, LineCodec, WireCodec, codec_for};
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    Frame, Inbound, Message, MessageKind, Sender, SessionId, short_address,
};
