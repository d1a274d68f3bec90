//! Binary frame protocol with length-prefixed messages
//!
//! Frame format:
//! ```text
//! +--------+--------+------------------+
//! | type   | length | payload          |
//! | (1 byte)| (4 bytes, BE) | (variable)  |
//! +--------+--------+------------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::{self, Cursor};

/// Frame header size: 1 byte type + 4 bytes length
pub const FRAME_HEADER_SIZE: usize = 5;

/// Maximum frame payload size (64 KB; payloads are small JSON control messages)
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Frame types for different message categories
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    // Control stream messages (0x00 - 0x0F)
    Hello = 0x00,
    HelloAck = 0x01,
    Register = 0x02,
    RegisterOk = 0x03,
    RegisterFailed = 0x04,
    Ping = 0x05,
    Pong = 0x06,
    Logout = 0x07,
    LogoutOk = 0x08,
    Goodbye = 0x09,

    // Queue commands (0x10 - 0x1F) - client -> server
    QueueJoin = 0x10,
    QueueLeave = 0x11,
    QueueStatus = 0x12,
    StatsRequest = 0x13,

    // Chat commands (0x20 - 0x2F) - client -> server
    ChatSend = 0x20,
    ChatLeave = 0x21,

    // Server -> client events (0x30 - 0x4F)
    QueueJoined = 0x30,
    QueueLeft = 0x31,
    QueueStatusInfo = 0x32,
    MatchFound = 0x33,
    SessionMessage = 0x34,
    ChatLeft = 0x35,
    PartnerLeft = 0x36,
    StatsInfo = 0x37,

    // Datagram messages (0x80 - 0x8F)
    Typing = 0x80,
    PartnerTyping = 0x81,

    // Error (0xFF)
    Error = 0xFF,
}

impl FrameType {
    /// Convert from u8, returns None for unknown types
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(FrameType::Hello),
            0x01 => Some(FrameType::HelloAck),
            0x02 => Some(FrameType::Register),
            0x03 => Some(FrameType::RegisterOk),
            0x04 => Some(FrameType::RegisterFailed),
            0x05 => Some(FrameType::Ping),
            0x06 => Some(FrameType::Pong),
            0x07 => Some(FrameType::Logout),
            0x08 => Some(FrameType::LogoutOk),
            0x09 => Some(FrameType::Goodbye),

            0x10 => Some(FrameType::QueueJoin),
            0x11 => Some(FrameType::QueueLeave),
            0x12 => Some(FrameType::QueueStatus),
            0x13 => Some(FrameType::StatsRequest),

            0x20 => Some(FrameType::ChatSend),
            0x21 => Some(FrameType::ChatLeave),

            0x30 => Some(FrameType::QueueJoined),
            0x31 => Some(FrameType::QueueLeft),
            0x32 => Some(FrameType::QueueStatusInfo),
            0x33 => Some(FrameType::MatchFound),
            0x34 => Some(FrameType::SessionMessage),
            0x35 => Some(FrameType::ChatLeft),
            0x36 => Some(FrameType::PartnerLeft),
            0x37 => Some(FrameType::StatsInfo),

            0x80 => Some(FrameType::Typing),
            0x81 => Some(FrameType::PartnerTyping),

            0xFF => Some(FrameType::Error),
            _ => None,
        }
    }

    /// Check if this frame type is valid for the control handshake
    pub fn is_control(&self) -> bool {
        (*self as u8) < 0x10
    }

    /// Check if this frame type is a queue command
    pub fn is_queue_command(&self) -> bool {
        let val = *self as u8;
        (0x10..0x20).contains(&val)
    }

    /// Check if this frame type is a chat command
    pub fn is_chat_command(&self) -> bool {
        let val = *self as u8;
        (0x20..0x30).contains(&val)
    }

    /// Check if this frame type is a server-originated event
    pub fn is_server_event(&self) -> bool {
        let val = *self as u8;
        (0x30..0x50).contains(&val)
    }

    /// Check if this frame type is a datagram message
    pub fn is_datagram(&self) -> bool {
        let val = *self as u8;
        (0x80..0x90).contains(&val)
    }
}

/// A single protocol frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame with the given type and payload
    pub fn new(frame_type: FrameType, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type,
            payload: payload.into(),
        }
    }

    /// Create an empty frame (no payload)
    pub fn empty(frame_type: FrameType) -> Self {
        Self {
            frame_type,
            payload: Bytes::new(),
        }
    }

    /// Get the total encoded size of this frame
    pub fn encoded_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }

    /// Encode this frame into a buffer
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_size());
        buf.put_u8(self.frame_type as u8);
        buf.put_u32(self.payload.len() as u32);
        buf.put_slice(&self.payload);
    }

    /// Encode this frame into a new Bytes
    pub fn encode_to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_size());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Try to decode a frame from a buffer
    /// Returns Ok(Some(frame)) if successful, Ok(None) if more data needed
    pub fn decode(buf: &mut BytesMut) -> io::Result<Option<Frame>> {
        // Check if we have enough data for the header
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        // Peek at the header without consuming
        let mut cursor = Cursor::new(&buf[..]);
        let frame_type_byte = cursor.get_u8();
        let payload_len = cursor.get_u32() as usize;

        // Validate frame type
        let frame_type = FrameType::from_u8(frame_type_byte).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unknown frame type: 0x{:02X}", frame_type_byte),
            )
        })?;

        // Validate payload size
        if payload_len > MAX_FRAME_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Frame payload too large: {} bytes (max: {})",
                    payload_len, MAX_FRAME_SIZE
                ),
            ));
        }

        // Check if we have the full frame
        let total_size = FRAME_HEADER_SIZE + payload_len;
        if buf.len() < total_size {
            return Ok(None);
        }

        // Consume the header
        buf.advance(FRAME_HEADER_SIZE);

        // Extract payload
        let payload = buf.split_to(payload_len).freeze();

        Ok(Some(Frame {
            frame_type,
            payload,
        }))
    }

    /// Decode a single frame from a complete buffer (no streaming)
    pub fn decode_complete(data: &[u8]) -> io::Result<Frame> {
        if data.len() < FRAME_HEADER_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Incomplete frame header",
            ));
        }

        let frame_type_byte = data[0];
        let payload_len = u32::from_be_bytes([data[1], data[2], data[3], data[4]]) as usize;

        let frame_type = FrameType::from_u8(frame_type_byte).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Unknown frame type: 0x{:02X}", frame_type_byte),
            )
        })?;

        if payload_len > MAX_FRAME_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "Frame payload too large: {} bytes (max: {})",
                    payload_len, MAX_FRAME_SIZE
                ),
            ));
        }

        let expected_len = FRAME_HEADER_SIZE + payload_len;
        if data.len() < expected_len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "Incomplete frame: expected {} bytes, got {}",
                    expected_len,
                    data.len()
                ),
            ));
        }

        let payload = Bytes::copy_from_slice(&data[FRAME_HEADER_SIZE..expected_len]);

        Ok(Frame {
            frame_type,
            payload,
        })
    }
}

/// Frame encoder/decoder for streaming use
#[derive(Debug, Default)]
pub struct FrameCodec {
    buffer: BytesMut,
}

impl FrameCodec {
    /// Create a new frame codec
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Feed data into the codec
    pub fn feed(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next frame
    pub fn decode_next(&mut self) -> io::Result<Option<Frame>> {
        Frame::decode(&mut self.buffer)
    }

    /// Get the current buffer length
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
