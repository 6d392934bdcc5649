//! Per-transport wire codecs.
//!
//! The relay fans one logical [`Message`] out to clients on different
//! transports, so encoding is a *capability* each session carries rather
//! than a branch on a type tag. [`WireCodec`] is that capability:
//!
//! - [`LineCodec`] — human-readable lines for the RawStream transport
//! - [`JsonCodec`] — JSON [`Frame`]s for the FramedJSON transport
//!
//! The trait is object-safe (no generic methods) so the broadcaster can
//! hold an `Arc<dyn WireCodec>` per recipient and never care which one it
//! is talking to.

use std::sync::Arc;

use paizer_transport::TransportKind;

use crate::types::short_address;
use crate::{Frame, Inbound, Message, MessageKind, ProtocolError};

/// The literal heartbeat token on the RawStream wire, in both directions.
pub const HEARTBEAT_TOKEN: &str = "HEARTBEAT";

/// Encodes relay messages for one transport and decodes what its clients
/// send.
pub trait WireCodec: Send + Sync + 'static {
    /// The transport this codec speaks.
    fn kind(&self) -> TransportKind;

    /// Encodes a message into one wire unit, ready for
    /// [`FrameWriter::send`](paizer_transport::FrameWriter::send).
    fn encode(&self, msg: &Message) -> Result<Vec<u8>, ProtocolError>;

    /// Decodes the first unit of a connection into the client's display
    /// name.
    ///
    /// # Errors
    /// Any error here means the handshake failed and the connection must
    /// be dropped without registering a session.
    fn decode_join(&self, data: &[u8]) -> Result<String, ProtocolError>;

    /// Decodes a unit from a joined client.
    fn decode(&self, data: &[u8]) -> Result<Inbound, ProtocolError>;
}

/// Returns the codec for a transport kind.
pub fn codec_for(kind: TransportKind) -> Arc<dyn WireCodec> {
    match kind {
        TransportKind::RawStream => Arc::new(LineCodec),
        #[cfg(feature = "json")]
        TransportKind::FramedJson => Arc::new(JsonCodec),
        #[cfg(not(feature = "json"))]
        TransportKind::FramedJson => unreachable!("FramedJSON requires the `json` feature"),
    }
}

// ---------------------------------------------------------------------------
// LineCodec
// ---------------------------------------------------------------------------

/// Codec for the newline-delimited text transport.
///
/// Outbound lines look like:
///
/// ```text
/// [09:05:07] [alice@127.0.0.1] hi
/// [09:05:07] bob@127.0.0.1 joined the chat
/// [09:05:30] bob@127.0.0.1 left the chat
/// You have successfully joined the server!
/// HEARTBEAT
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LineCodec;

impl WireCodec for LineCodec {
    fn kind(&self) -> TransportKind {
        TransportKind::RawStream
    }

    fn encode(&self, msg: &Message) -> Result<Vec<u8>, ProtocolError> {
        let stamp = msg.at.format("%H:%M:%S");
        let line = match (msg.kind, &msg.sender) {
            (MessageKind::Chat, Some(s)) => format!(
                "[{stamp}] [{}@{}] {}",
                s.name,
                short_address(&s.address),
                msg.content
            ),
            (MessageKind::Join, Some(s)) => format!(
                "[{stamp}] {}@{} joined the chat",
                s.name,
                short_address(&s.address)
            ),
            (MessageKind::Leave, Some(s)) => format!(
                "[{stamp}] {}@{} left the chat",
                s.name,
                short_address(&s.address)
            ),
            (MessageKind::System, _) => msg.content.clone(),
            (MessageKind::Heartbeat, _) => HEARTBEAT_TOKEN.to_string(),
            (kind, None) => {
                return Err(ProtocolError::InvalidMessage(format!(
                    "{kind:?} message without a sender"
                )));
            }
        };
        let mut bytes = line.into_bytes();
        bytes.push(b'\n');
        Ok(bytes)
    }

    fn decode_join(&self, data: &[u8]) -> Result<String, ProtocolError> {
        let name = String::from_utf8_lossy(data).trim().to_string();
        if name.is_empty() {
            return Err(ProtocolError::InvalidMessage(
                "empty display name".into(),
            ));
        }
        Ok(name)
    }

    fn decode(&self, data: &[u8]) -> Result<Inbound, ProtocolError> {
        let text = String::from_utf8_lossy(data);
        let text = text.trim();
        if text == HEARTBEAT_TOKEN {
            Ok(Inbound::Heartbeat)
        } else {
            Ok(Inbound::Chat(text.to_string()))
        }
    }
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// Codec for the WebSocket transport: one [`Frame`] per unit.
///
/// ## Example
///
/// ```rust
/// use paizer_protocol::{Inbound, JsonCodec, WireCodec};
///
/// let codec = JsonCodec;
/// let name = codec.decode_join(br#"{"type":"join","user":"bob"}"#).unwrap();
/// assert_eq!(name, "bob");
///
/// let inbound = codec.decode(br#"{"type":"chat","content":"hi"}"#).unwrap();
/// assert_eq!(inbound, Inbound::Chat("hi".into()));
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl WireCodec for JsonCodec {
    fn kind(&self) -> TransportKind {
        TransportKind::FramedJson
    }

    fn encode(&self, msg: &Message) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(&Frame::from(msg)).map_err(ProtocolError::Encode)
    }

    fn decode_join(&self, data: &[u8]) -> Result<String, ProtocolError> {
        let frame: Frame =
            serde_json::from_slice(data).map_err(ProtocolError::Decode)?;
        if frame.kind != MessageKind::Join {
            return Err(ProtocolError::InvalidMessage(format!(
                "first frame must be join, got {:?}",
                frame.kind
            )));
        }
        match frame.user {
            Some(user) if !user.trim().is_empty() => Ok(user),
            _ => Err(ProtocolError::InvalidMessage(
                "join frame without user".into(),
            )),
        }
    }

    fn decode(&self, data: &[u8]) -> Result<Inbound, ProtocolError> {
        let frame: Frame =
            serde_json::from_slice(data).map_err(ProtocolError::Decode)?;
        match frame.kind {
            MessageKind::Heartbeat => Ok(Inbound::Heartbeat),
            MessageKind::Chat => {
                Ok(Inbound::Chat(frame.content.unwrap_or_default()))
            }
            other => Err(ProtocolError::InvalidMessage(format!(
                "clients may not send {other:?} frames"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone};

    use super::*;
    use crate::{Sender, SessionId};

    fn at_09_05_07(mut msg: Message) -> Message {
        msg.at = Local
            .with_ymd_and_hms(2024, 3, 1, 9, 5, 7)
            .single()
            .expect("unambiguous local time");
        msg
    }

    fn bob() -> Sender {
        Sender {
            id: SessionId(2),
            name: "bob".into(),
            address: "127.0.0.1".into(),
        }
    }

    fn line(msg: Message) -> String {
        let bytes = LineCodec.encode(&at_09_05_07(msg)).expect("encode");
        String::from_utf8(bytes).expect("utf8")
    }

    // =====================================================================
    // LineCodec
    // =====================================================================

    #[test]
    fn test_line_encode_chat_formats_timestamp_and_sender() {
        assert_eq!(
            line(Message::chat(bob(), "hello all")),
            "[09:05:07] [bob@127.0.0.1] hello all\n"
        );
    }

    #[test]
    fn test_line_encode_join_and_leave() {
        assert_eq!(
            line(Message::join(bob())),
            "[09:05:07] bob@127.0.0.1 joined the chat\n"
        );
        assert_eq!(
            line(Message::leave(bob())),
            "[09:05:07] bob@127.0.0.1 left the chat\n"
        );
    }

    #[test]
    fn test_line_encode_shortens_long_addresses() {
        let sender = Sender {
            address: "2001:0db8:85a3:0000:0000:8a2e:0370:7334".into(),
            ..bob()
        };
        assert_eq!(
            line(Message::join(sender)),
            "[09:05:07] bob@2001:0db8:...0:7334 joined the chat\n"
        );
    }

    #[test]
    fn test_line_encode_system_is_verbatim() {
        assert_eq!(
            line(Message::system("You have successfully joined the server!")),
            "You have successfully joined the server!\n"
        );
    }

    #[test]
    fn test_line_encode_heartbeat_is_token() {
        assert_eq!(line(Message::heartbeat()), "HEARTBEAT\n");
    }

    #[test]
    fn test_line_encode_chat_without_sender_is_invalid() {
        let mut msg = Message::chat(bob(), "x");
        msg.sender = None;
        assert!(matches!(
            LineCodec.encode(&msg),
            Err(ProtocolError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_line_decode_join_trims_name() {
        assert_eq!(LineCodec.decode_join(b"  alice \r").unwrap(), "alice");
    }

    #[test]
    fn test_line_decode_join_rejects_blank_name() {
        assert!(LineCodec.decode_join(b"   ").is_err());
    }

    #[test]
    fn test_line_decode_recognises_heartbeat_token() {
        assert_eq!(LineCodec.decode(b"HEARTBEAT").unwrap(), Inbound::Heartbeat);
        assert_eq!(
            LineCodec.decode(b"heartbeat").unwrap(),
            Inbound::Chat("heartbeat".into()),
            "token is case-sensitive"
        );
    }

    #[test]
    fn test_line_decode_tolerates_invalid_utf8() {
        let decoded = LineCodec.decode(&[b'h', 0xff, b'i']).unwrap();
        assert!(matches!(decoded, Inbound::Chat(text) if text.starts_with('h')));
    }

    // =====================================================================
    // JsonCodec
    // =====================================================================

    #[test]
    fn test_json_encode_chat_has_all_fields() {
        let bytes = JsonCodec.encode(&Message::chat(bob(), "hi")).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "chat");
        assert_eq!(value["uid"], "2");
        assert_eq!(value["user"], "bob");
        assert_eq!(value["content"], "hi");
        assert_eq!(value["ip"], "127.0.0.1");
    }

    #[test]
    fn test_json_encode_system_omits_sender_fields() {
        let bytes = JsonCodec.encode(&Message::system("welcome")).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "system");
        assert_eq!(value["content"], "welcome");
        assert!(value.get("uid").is_none());
        assert!(value.get("user").is_none());
        assert!(value.get("ip").is_none());
    }

    #[test]
    fn test_json_encode_heartbeat_is_bare_type() {
        let bytes = JsonCodec.encode(&Message::heartbeat()).unwrap();
        assert_eq!(bytes, br#"{"type":"heartbeat"}"#);
    }

    #[test]
    fn test_json_decode_join_requires_join_type() {
        let err = JsonCodec
            .decode_join(br#"{"type":"chat","user":"bob"}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidMessage(_)));
    }

    #[test]
    fn test_json_decode_join_requires_user() {
        assert!(JsonCodec.decode_join(br#"{"type":"join"}"#).is_err());
        assert!(JsonCodec.decode_join(br#"{"type":"join","user":" "}"#).is_err());
    }

    #[test]
    fn test_json_decode_join_rejects_malformed_json() {
        let err = JsonCodec.decode_join(b"bob").unwrap_err();
        assert!(matches!(err, ProtocolError::Decode(_)));
    }

    #[test]
    fn test_json_decode_heartbeat_and_chat() {
        assert_eq!(
            JsonCodec.decode(br#"{"type":"heartbeat"}"#).unwrap(),
            Inbound::Heartbeat
        );
        assert_eq!(
            JsonCodec
                .decode(br#"{"type":"chat","content":"yo","uid":"9"}"#)
                .unwrap(),
            Inbound::Chat("yo".into())
        );
    }

    #[test]
    fn test_json_decode_rejects_server_only_kinds() {
        assert!(JsonCodec.decode(br#"{"type":"leave"}"#).is_err());
        assert!(JsonCodec.decode(br#"{"type":"system","content":"x"}"#).is_err());
    }

    #[test]
    fn test_json_decode_rejects_unknown_type() {
        assert!(matches!(
            JsonCodec.decode(br#"{"type":"dance"}"#),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn test_codec_for_matches_kind() {
        assert_eq!(codec_for(TransportKind::RawStream).kind(), TransportKind::RawStream);
        assert_eq!(codec_for(TransportKind::FramedJson).kind(), TransportKind::FramedJson);
    }
}
