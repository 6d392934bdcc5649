//! Core protocol types: what a relay message is, independent of how any
//! particular transport puts it on the wire.

use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// A unique identifier for one joined client.
///
/// Newtype over `u64` so a session id can't be confused with any other
/// counter. It prints as the bare number because that is exactly the
/// `uid` string clients see on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// What a message means.
///
/// `#[serde(rename_all = "lowercase")]` gives the wire spelling used in
/// the JSON `type` field: `"join"`, `"chat"`, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// A client registered.
    Join,
    /// Chat text from a client.
    Chat,
    /// A client went away (clean close, failure, or timeout).
    Leave,
    /// A server advisory, e.g. the welcome notice.
    System,
    /// A point-to-point liveness probe. Never relayed.
    Heartbeat,
}

/// Who a Join/Chat/Leave message is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    /// The sender's session id.
    pub id: SessionId,
    /// Client-supplied display name.
    pub name: String,
    /// Peer address (IP, no port), unshortened.
    pub address: String,
}

/// One logical unit of relay content.
///
/// Messages are never stored. They exist while a broadcast fans them out
/// and, after that, only in each transport's encoded bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    /// What the message means.
    pub kind: MessageKind,
    /// Present for Join/Chat/Leave, absent for System/Heartbeat.
    pub sender: Option<Sender>,
    /// Chat body or system advisory. Empty for the other kinds.
    pub content: String,
    /// Local wall-clock time the message was created.
    pub at: DateTime<Local>,
}

impl Message {
    /// `sender` joined the chat.
    pub fn join(sender: Sender) -> Self {
        Self::with_sender(MessageKind::Join, sender, String::new())
    }

    /// `sender` said `content`.
    pub fn chat(sender: Sender, content: impl Into<String>) -> Self {
        Self::with_sender(MessageKind::Chat, sender, content.into())
    }

    /// `sender` left the chat.
    pub fn leave(sender: Sender) -> Self {
        Self::with_sender(MessageKind::Leave, sender, String::new())
    }

    /// A server advisory.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::System,
            sender: None,
            content: content.into(),
            at: Local::now(),
        }
    }

    /// A liveness probe.
    pub fn heartbeat() -> Self {
        Self {
            kind: MessageKind::Heartbeat,
            sender: None,
            content: String::new(),
            at: Local::now(),
        }
    }

    fn with_sender(kind: MessageKind, sender: Sender, content: String) -> Self {
        Self {
            kind,
            sender: Some(sender),
            content,
            at: Local::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Frame — the FramedJSON wire object
// ---------------------------------------------------------------------------

/// The JSON object carried in one WebSocket frame.
///
/// ```json
/// {"type":"chat","uid":"1","user":"alice","content":"hi","ip":"127.0.0.1"}
/// ```
///
/// Every field except `type` is optional. `skip_serializing_if` keeps
/// absent fields off the wire, and `#[serde(default)]` lets clients omit
/// them on the way in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Message kind, spelled `type` on the wire.
    #[serde(rename = "type")]
    pub kind: MessageKind,

    /// Sender's session id as a decimal string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,

    /// Sender's display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Chat body or system advisory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Sender's peer address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

impl From<&Message> for Frame {
    fn from(msg: &Message) -> Self {
        let content = match msg.kind {
            MessageKind::Chat | MessageKind::System => Some(msg.content.clone()),
            _ => None,
        };
        Self {
            kind: msg.kind,
            uid: msg.sender.as_ref().map(|s| s.id.to_string()),
            user: msg.sender.as_ref().map(|s| s.name.clone()),
            content,
            ip: msg.sender.as_ref().map(|s| s.address.clone()),
        }
    }
}

// ---------------------------------------------------------------------------
// Inbound — what a joined client can send
// ---------------------------------------------------------------------------

/// A decoded unit from an already-joined client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Liveness proof. Refreshes the session, is never relayed.
    Heartbeat,
    /// Chat text to relay to everyone else.
    Chat(String),
}

// ---------------------------------------------------------------------------
// Address display
// ---------------------------------------------------------------------------

/// Shortens a peer address for display.
///
/// Addresses longer than 20 characters (typically IPv6) render as the
/// first 10 characters, `...`, and the last 6. Shorter ones are returned
/// unchanged.
pub fn short_address(address: &str) -> String {
    let count = address.chars().count();
    if count <= 20 {
        return address.to_string();
    }
    let head: String = address.chars().take(10).collect();
    let tail: String = address.chars().skip(count - 6).collect();
    format!("{head}...{tail}")
}
