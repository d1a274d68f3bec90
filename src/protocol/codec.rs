//! Codec for encoding/decoding protocol messages to/from frames
//!
//! This module provides the bridge between typed messages and binary frames.

use super::frame::{Frame, FrameType};
use super::messages::*;
use bytes::Bytes;
use std::io::{self, Error as IoError, ErrorKind};

/// Trait for messages that can be encoded to frames
pub trait Encodable {
    /// Get the frame type for this message
    fn frame_type(&self) -> FrameType;

    /// Encode the message payload to bytes
    fn encode_payload(&self) -> io::Result<Bytes>;

    /// Encode the complete frame
    fn encode_frame(&self) -> io::Result<Frame> {
        Ok(Frame::new(self.frame_type(), self.encode_payload()?))
    }
}

/// Trait for messages that can be decoded from frames
pub trait Decodable: Sized {
    /// Expected frame type for this message
    fn expected_frame_type() -> FrameType;

    /// Decode the message from a payload
    fn decode_payload(payload: &[u8]) -> io::Result<Self>;

    /// Decode from a complete frame, validating the frame type
    fn decode_frame(frame: &Frame) -> io::Result<Self> {
        if frame.frame_type != Self::expected_frame_type() {
            return Err(IoError::new(
                ErrorKind::InvalidData,
                format!(
                    "Expected frame type {:?}, got {:?}",
                    Self::expected_frame_type(),
                    frame.frame_type
                ),
            ));
        }
        Self::decode_payload(&frame.payload)
    }
}

/// Helper macro to implement Encodable and Decodable for a message type
macro_rules! impl_codec {
    ($type:ty, $frame_type:expr) => {
        impl Encodable for $type {
            fn frame_type(&self) -> FrameType {
                $frame_type
            }

            fn encode_payload(&self) -> io::Result<Bytes> {
                serde_json::to_vec(self)
                    .map(Bytes::from)
                    .map_err(|e| IoError::new(ErrorKind::InvalidData, e))
            }
        }

        impl Decodable for $type {
            fn expected_frame_type() -> FrameType {
                $frame_type
            }

            fn decode_payload(payload: &[u8]) -> io::Result<Self> {
                serde_json::from_slice(payload).map_err(|e| IoError::new(ErrorKind::InvalidData, e))
            }
        }
    };
}

// Control messages
impl_codec!(Hello, FrameType::Hello);
impl_codec!(HelloAck, FrameType::HelloAck);
impl_codec!(Register, FrameType::Register);
impl_codec!(RegisterOk, FrameType::RegisterOk);
impl_codec!(RegisterFailed, FrameType::RegisterFailed);
impl_codec!(Ping, FrameType::Ping);
impl_codec!(Pong, FrameType::Pong);
impl_codec!(Logout, FrameType::Logout);
impl_codec!(LogoutOk, FrameType::LogoutOk);
impl_codec!(Goodbye, FrameType::Goodbye);

// Queue commands
impl_codec!(QueueJoin, FrameType::QueueJoin);
impl_codec!(QueueLeave, FrameType::QueueLeave);
impl_codec!(QueueStatus, FrameType::QueueStatus);
impl_codec!(StatsRequest, FrameType::StatsRequest);

// Chat commands
impl_codec!(ChatSend, FrameType::ChatSend);
impl_codec!(ChatLeave, FrameType::ChatLeave);

// Server -> client events
impl_codec!(QueueJoined, FrameType::QueueJoined);
impl_codec!(QueueLeft, FrameType::QueueLeft);
impl_codec!(QueueStatusInfo, FrameType::QueueStatusInfo);
impl_codec!(MatchFound, FrameType::MatchFound);
impl_codec!(SessionMessage, FrameType::SessionMessage);
impl_codec!(ChatLeft, FrameType::ChatLeft);
impl_codec!(PartnerLeft, FrameType::PartnerLeft);
impl_codec!(StatsInfo, FrameType::StatsInfo);

// Datagram messages
impl_codec!(Typing, FrameType::Typing);
impl_codec!(PartnerTyping, FrameType::PartnerTyping);

// Error message
impl_codec!(Error, FrameType::Error);

/// Decode any frame into a typed message enum
#[derive(Debug, Clone)]
pub enum DecodedMessage {
    // Control
    Hello(Hello),
    HelloAck(HelloAck),
    Register(Register),
    RegisterOk(RegisterOk),
    RegisterFailed(RegisterFailed),
    Ping(Ping),
    Pong(Pong),
    Logout(Logout),
    LogoutOk(LogoutOk),
    Goodbye(Goodbye),

    // Queue commands
    QueueJoin(QueueJoin),
    QueueLeave(QueueLeave),
    QueueStatus(QueueStatus),
    StatsRequest(StatsRequest),

    // Chat commands
    ChatSend(ChatSend),
    ChatLeave(ChatLeave),

    // Server -> client events
    QueueJoined(QueueJoined),
    QueueLeft(QueueLeft),
    QueueStatusInfo(QueueStatusInfo),
    MatchFound(MatchFound),
    SessionMessage(SessionMessage),
    ChatLeft(ChatLeft),
    PartnerLeft(PartnerLeft),
    StatsInfo(StatsInfo),

    // Datagram
    Typing(Typing),
    PartnerTyping(PartnerTyping),

    // Error
    Error(Error),
}

impl DecodedMessage {
    /// Decode a frame into a typed message
    pub fn decode(frame: &Frame) -> io::Result<Self> {
        let payload = &frame.payload;

        match frame.frame_type {
            // Control
            FrameType::Hello => Ok(Self::Hello(serde_json::from_slice(payload)?)),
            FrameType::HelloAck => Ok(Self::HelloAck(serde_json::from_slice(payload)?)),
            FrameType::Register => Ok(Self::Register(serde_json::from_slice(payload)?)),
            FrameType::RegisterOk => Ok(Self::RegisterOk(serde_json::from_slice(payload)?)),
            FrameType::RegisterFailed => {
                Ok(Self::RegisterFailed(serde_json::from_slice(payload)?))
            }
            FrameType::Ping => Ok(Self::Ping(serde_json::from_slice(payload)?)),
            FrameType::Pong => Ok(Self::Pong(serde_json::from_slice(payload)?)),
            FrameType::Logout => Ok(Self::Logout(serde_json::from_slice(payload)?)),
            FrameType::LogoutOk => Ok(Self::LogoutOk(serde_json::from_slice(payload)?)),
            FrameType::Goodbye => Ok(Self::Goodbye(serde_json::from_slice(payload)?)),

            // Queue commands
            FrameType::QueueJoin => Ok(Self::QueueJoin(serde_json::from_slice(payload)?)),
            FrameType::QueueLeave => Ok(Self::QueueLeave(serde_json::from_slice(payload)?)),
            FrameType::QueueStatus => Ok(Self::QueueStatus(serde_json::from_slice(payload)?)),
            FrameType::StatsRequest => Ok(Self::StatsRequest(serde_json::from_slice(payload)?)),

            // Chat commands
            FrameType::ChatSend => Ok(Self::ChatSend(serde_json::from_slice(payload)?)),
            FrameType::ChatLeave => Ok(Self::ChatLeave(serde_json::from_slice(payload)?)),

            // Server -> client events
            FrameType::QueueJoined => Ok(Self::QueueJoined(serde_json::from_slice(payload)?)),
            FrameType::QueueLeft => Ok(Self::QueueLeft(serde_json::from_slice(payload)?)),
            FrameType::QueueStatusInfo => {
                Ok(Self::QueueStatusInfo(serde_json::from_slice(payload)?))
            }
            FrameType::MatchFound => Ok(Self::MatchFound(serde_json::from_slice(payload)?)),
            FrameType::SessionMessage => {
                Ok(Self::SessionMessage(serde_json::from_slice(payload)?))
            }
            FrameType::ChatLeft => Ok(Self::ChatLeft(serde_json::from_slice(payload)?)),
            FrameType::PartnerLeft => Ok(Self::PartnerLeft(serde_json::from_slice(payload)?)),
            FrameType::StatsInfo => Ok(Self::StatsInfo(serde_json::from_slice(payload)?)),

            // Datagram
            FrameType::Typing => Ok(Self::Typing(serde_json::from_slice(payload)?)),
            FrameType::PartnerTyping => {
                Ok(Self::PartnerTyping(serde_json::from_slice(payload)?))
            }

            // Error
            FrameType::Error => Ok(Self::Error(serde_json::from_slice(payload)?)),
        }
    }

    /// Get the frame type of this message
    pub fn frame_type(&self) -> FrameType {
        match self {
            Self::Hello(_) => FrameType::Hello,
            Self::HelloAck(_) => FrameType::HelloAck,
            Self::Register(_) => FrameType::Register,
            Self::RegisterOk(_) => FrameType::RegisterOk,
            Self::RegisterFailed(_) => FrameType::RegisterFailed,
            Self::Ping(_) => FrameType::Ping,
            Self::Pong(_) => FrameType::Pong,
            Self::Logout(_) => FrameType::Logout,
            Self::LogoutOk(_) => FrameType::LogoutOk,
            Self::Goodbye(_) => FrameType::Goodbye,
            Self::QueueJoin(_) => FrameType::QueueJoin,
            Self::QueueLeave(_) => FrameType::QueueLeave,
            Self::QueueStatus(_) => FrameType::QueueStatus,
            Self::StatsRequest(_) => FrameType::StatsRequest,
            Self::ChatSend(_) => FrameType::ChatSend,
            Self::ChatLeave(_) => FrameType::ChatLeave,
            Self::QueueJoined(_) => FrameType::QueueJoined,
            Self::QueueLeft(_) => FrameType::QueueLeft,
            Self::QueueStatusInfo(_) => FrameType::QueueStatusInfo,
            Self::MatchFound(_) => FrameType::MatchFound,
            Self::SessionMessage(_) => FrameType::SessionMessage,
            Self::ChatLeft(_) => FrameType::ChatLeft,
            Self::PartnerLeft(_) => FrameType::PartnerLeft,
            Self::StatsInfo(_) => FrameType::StatsInfo,
            Self::Typing(_) => FrameType::Typing,
            Self::PartnerTyping(_) => FrameType::PartnerTyping,
            Self::Error(_) => FrameType::Error,
        }
    }

    /// Check if this is a control message
    pub fn is_control(&self) -> bool {
        self.frame_type().is_control()
    }

    /// Check if this is a queue command
    pub fn is_queue_command(&self) -> bool {
        self.frame_type().is_queue_command()
    }

    /// Check if this is a chat command
    pub fn is_chat_command(&self) -> bool {
        self.frame_type().is_chat_command()
    }

    /// Check if this is a datagram message
    pub fn is_datagram(&self) -> bool {
        self.frame_type().is_datagram()
    }
}

/// Encode a message directly to bytes (convenience function)
pub fn encode<T: Encodable>(msg: &T) -> io::Result<Bytes> {
    msg.encode_frame().map(|f| f.encode_to_bytes())
}

/// Decode a frame to a specific message type (convenience function)
pub fn decode<T: Decodable>(frame: &Frame) -> io::Result<T> {
    T::decode_frame(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let original = Register {
            device_id: "device-42".to_string(),
            nickname: "alice".to_string(),
            bio: Some("hello there".to_string()),
            gender: Gender::Female,
        };

        let frame = original.encode_frame().unwrap();
        assert_eq!(frame.frame_type, FrameType::Register);

        let decoded = Register::decode_frame(&frame).unwrap();
        assert_eq!(original.device_id, decoded.device_id);
        assert_eq!(original.nickname, decoded.nickname);
        assert_eq!(original.gender, decoded.gender);
    }

    #[test]
    fn test_decoded_message_enum() {
        let msg = Ping { timestamp: 12345 };
        let frame = msg.encode_frame().unwrap();

        let decoded = DecodedMessage::decode(&frame).unwrap();
        assert!(decoded.is_control());

        match decoded {
            DecodedMessage::Ping(ping) => {
                assert_eq!(ping.timestamp, 12345);
            }
            _ => panic!("Expected Ping message"),
        }
    }

    #[test]
    fn test_wrong_frame_type() {
        let msg = Ping { timestamp: 12345 };
        let frame = msg.encode_frame().unwrap();

        // Try to decode as Pong (wrong type)
        let result = Pong::decode_frame(&frame);
        assert!(result.is_err());
    }

    #[test]
    fn test_encode_helper() {
        let msg = Hello::default();
        let bytes = encode(&msg).unwrap();
        assert!(!bytes.is_empty());
    }

    #[test]
    fn test_queue_join_dispatch() {
        let msg = QueueJoin {
            preference: Preference::Female,
        };
        let frame = msg.encode_frame().unwrap();

        let decoded = DecodedMessage::decode(&frame).unwrap();
        assert!(decoded.is_queue_command());

        match decoded {
            DecodedMessage::QueueJoin(join) => {
                assert_eq!(join.preference, Preference::Female);
            }
            _ => panic!("Expected QueueJoin message"),
        }
    }

    #[test]
    fn test_typing_datagram_encoding() {
        let msg = Typing::default();
        let frame = msg.encode_frame().unwrap();
        assert!(frame.frame_type.is_datagram());

        let decoded = DecodedMessage::decode(&frame).unwrap();
        assert!(decoded.is_datagram());
    }

    #[test]
    fn test_error_message_encoding() {
        let err = Error::new(1016, "No active session");
        let frame = err.encode_frame().unwrap();

        let decoded = Error::decode_frame(&frame).unwrap();
        assert_eq!(decoded.code, 1016);
        assert_eq!(decoded.message, "No active session");
    }
}
