//! Protocol message types for the pairing chat system
//!
//! All message payloads that can be serialized/deserialized within frames.
//! Uses serde for JSON serialization.

use serde::{Deserialize, Serialize};

/// Unique identifier types
pub type ConnectionId = String;
pub type SessionId = String;
pub type MessageId = String;

/// Gender as self-asserted at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Unspecified,
}

impl Default for Gender {
    fn default() -> Self {
        Gender::Unspecified
    }
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gender::Male => write!(f, "male"),
            Gender::Female => write!(f, "female"),
            Gender::Unspecified => write!(f, "unspecified"),
        }
    }
}

/// The gender category a user wants to be matched with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Preference {
    Any,
    Male,
    Female,
}

impl std::fmt::Display for Preference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Preference::Any => write!(f, "any"),
            Preference::Male => write!(f, "male"),
            Preference::Female => write!(f, "female"),
        }
    }
}

// =============================================================================
// Control Messages (0x00 - 0x0F)
// =============================================================================

/// Initial handshake from client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hello {
    /// Protocol version
    pub version: u32,
    /// Client capabilities
    pub capabilities: Vec<String>,
}

impl Default for Hello {
    fn default() -> Self {
        Self {
            version: 1,
            capabilities: vec!["chat".to_string(), "typing".to_string()],
        }
    }
}

/// Server response to Hello
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloAck {
    /// Server protocol version
    pub version: u32,
    /// Connection ID assigned to this transport connection
    pub connection_id: ConnectionId,
}

/// Registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Register {
    /// Client-persisted device fingerprint, stable across reconnects
    pub device_id: String,
    /// Display name, 2-20 characters
    pub nickname: String,
    /// Optional bio, up to 100 characters
    #[serde(default)]
    pub bio: Option<String>,
    /// Self-asserted gender
    #[serde(default)]
    pub gender: Gender,
}

/// The registered user's own profile, echoed back on success
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileInfo {
    /// Display name
    pub nickname: String,
    /// Optional bio
    pub bio: Option<String>,
    /// Self-asserted gender
    pub gender: Gender,
    /// Registration timestamp (Unix ms)
    pub created_at: u64,
}

/// Successful registration response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterOk {
    /// The stored profile
    pub profile: ProfileInfo,
}

/// Registration failure response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterFailed {
    /// Error code
    pub code: u32,
    /// Human-readable error message
    pub message: String,
}

/// Ping message for keepalive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ping {
    /// Timestamp when ping was sent (for RTT measurement)
    pub timestamp: u64,
}

/// Pong response to Ping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pong {
    /// Echo back the timestamp from Ping
    pub timestamp: u64,
}

/// Explicit logout request; triggers full cleanup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Logout {}

/// Logout acknowledgment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogoutOk {}

/// Graceful disconnect
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goodbye {
    /// Reason for disconnect
    pub reason: String,
}

// =============================================================================
// Queue Commands (0x10 - 0x1F) - Client -> Server
// =============================================================================

/// Join a preference queue to wait for a match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJoin {
    /// The gender category to be matched with
    pub preference: Preference,
}

/// Leave the queue (idempotent)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueLeave {}

/// Ask for the current queue position
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStatus {}

/// Ask for platform-wide aggregate counts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatsRequest {}

// =============================================================================
// Chat Commands (0x20 - 0x2F) - Client -> Server
// =============================================================================

/// Send a message to the current session partner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSend {
    /// Message content
    pub content: String,
}

/// Leave the current session (idempotent)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatLeave {}

// =============================================================================
// Server -> Client Events (0x30 - 0x4F)
// =============================================================================

/// Queue join acknowledgment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJoined {
    /// Queue the user was placed in
    pub queue: Preference,
    /// 1-based position after insertion
    pub position: usize,
}

/// Queue leave acknowledgment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueLeft {}

/// Queue status response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatusInfo {
    /// Whether the user is currently waiting in a queue
    pub in_queue: bool,
    /// Queue the user is waiting in
    pub queue: Option<Preference>,
    /// 1-based position in that queue
    pub position: Option<usize>,
    /// Total number of entries in that queue
    pub total_in_queue: Option<usize>,
}

impl QueueStatusInfo {
    /// Status for a user who is not waiting
    pub fn not_queued() -> Self {
        Self {
            in_queue: false,
            queue: None,
            position: None,
            total_in_queue: None,
        }
    }
}

/// What each party learns about the other on a match: nickname and bio only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerInfo {
    /// Partner's display name
    pub nickname: String,
    /// Partner's bio
    pub bio: Option<String>,
}

/// A pairing was found; sent to both participants
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchFound {
    /// Session ID for the new conversation
    pub session_id: SessionId,
    /// The other party
    pub partner: PartnerInfo,
}

/// A chat message delivered to a session participant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionMessage {
    /// Message ID (identical for both deliveries)
    pub id: MessageId,
    /// Sender nickname, snapshotted at send time
    pub sender: String,
    /// Message content
    pub content: String,
    /// Timestamp (Unix ms)
    pub timestamp: u64,
    /// Whether the recipient is the sender (for client-side alignment)
    pub is_own: bool,
}

/// Chat leave acknowledgment, sent to the leaving party
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatLeft {}

/// The other participant is gone (left or disconnected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerLeft {
    /// Human-readable notice
    pub message: String,
}

/// Platform-wide aggregate counts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsInfo {
    /// Registered live connections
    pub online: usize,
    /// Users waiting across all queues
    pub in_queue: usize,
    /// Users currently in a chat session
    pub in_chat: usize,
}

// =============================================================================
// Datagram Messages (0x80 - 0x8F) - Unreliable
// =============================================================================

/// User is typing (client -> server)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Typing {}

/// The session partner is typing (server -> client)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerTyping {
    /// Typing user's nickname
    pub nickname: String,
}

// =============================================================================
// Error Message (0xFF)
// =============================================================================

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    /// Error code
    pub code: u32,
    /// Error message
    pub message: String,
}

impl Error {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&crate::error::DuetError> for Error {
    fn from(err: &crate::error::DuetError) -> Self {
        Self::new(err.code(), err.message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gender_wire_format() {
        assert_eq!(serde_json::to_string(&Gender::Male).unwrap(), "\"male\"");
        assert_eq!(
            serde_json::to_string(&Gender::Unspecified).unwrap(),
            "\"unspecified\""
        );

        let parsed: Gender = serde_json::from_str("\"female\"").unwrap();
        assert_eq!(parsed, Gender::Female);
    }

    #[test]
    fn test_preference_wire_format() {
        assert_eq!(serde_json::to_string(&Preference::Any).unwrap(), "\"any\"");

        let parsed: Preference = serde_json::from_str("\"male\"").unwrap();
        assert_eq!(parsed, Preference::Male);
    }

    #[test]
    fn test_register_defaults() {
        // Omitted bio and gender fall back to None/unspecified
        let msg: Register =
            serde_json::from_str(r#"{"device_id":"dev-1","nickname":"alice"}"#).unwrap();
        assert_eq!(msg.device_id, "dev-1");
        assert!(msg.bio.is_none());
        assert_eq!(msg.gender, Gender::Unspecified);
    }

    #[test]
    fn test_serialize_session_message() {
        let msg = SessionMessage {
            id: "m-1".to_string(),
            sender: "alice".to_string(),
            content: "hi".to_string(),
            timestamp: 1234567890,
            is_own: true,
        };

        let json = serde_json::to_string(&msg).unwrap();
        let decoded: SessionMessage = serde_json::from_str(&json).unwrap();

        assert_eq!(msg.id, decoded.id);
        assert_eq!(msg.content, decoded.content);
        assert!(decoded.is_own);
    }

    #[test]
    fn test_match_found_exposes_nickname_and_bio_only() {
        let msg = MatchFound {
            session_id: "s-1".to_string(),
            partner: PartnerInfo {
                nickname: "bob".to_string(),
                bio: Some("hey".to_string()),
            },
        };

        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("gender"));
        assert!(!json.contains("device_id"));
    }

    #[test]
    fn test_error_from_duet_error() {
        let err = crate::error::DuetError::not_in_session("no active session");
        let wire: Error = (&err).into();
        assert_eq!(wire.code, err.code());
        assert_eq!(wire.message, "no active session");
    }
}
