//! Error handling for the pairing chat server

use std::fmt;

/// Result type alias for pairing chat operations
pub type Result<T> = std::result::Result<T, DuetError>;

/// Pairing chat server error types
#[derive(Debug, Clone)]
pub enum DuetError {
    /// Network-related errors
    Network(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// Protocol errors
    Protocol(String),
    /// Connection errors
    Connection(String),
    /// Registration payload failed validation (missing device id, bad nickname length, ...)
    Validation(String),
    /// Nickname already held by another live connection
    NicknameTaken(String),
    /// Operation requires a registered profile
    NotRegistered(String),
    /// Operation requires an active chat session
    NotInSession(String),
    /// Server internal error
    Internal(String),
    /// Configuration error
    Config(String),
    /// Timeout error
    Timeout(String),
    /// Resource limit exceeded
    ResourceLimit(String),
}

impl DuetError {
    /// Get error code for this error type
    pub fn code(&self) -> u32 {
        match self {
            DuetError::Network(_) => 1000,
            DuetError::Serialization(_) => 1001,
            DuetError::Protocol(_) => 1003,
            DuetError::Connection(_) => 1004,
            DuetError::Validation(_) => 1005,
            DuetError::Internal(_) => 1009,
            DuetError::Config(_) => 1010,
            DuetError::Timeout(_) => 1011,
            DuetError::ResourceLimit(_) => 1012,
            DuetError::NicknameTaken(_) => 1014,
            DuetError::NotRegistered(_) => 1015,
            DuetError::NotInSession(_) => 1016,
        }
    }

    /// Get human-readable error message
    pub fn message(&self) -> &str {
        match self {
            DuetError::Network(msg) => msg,
            DuetError::Serialization(msg) => msg,
            DuetError::Protocol(msg) => msg,
            DuetError::Connection(msg) => msg,
            DuetError::Validation(msg) => msg,
            DuetError::NicknameTaken(msg) => msg,
            DuetError::NotRegistered(msg) => msg,
            DuetError::NotInSession(msg) => msg,
            DuetError::Internal(msg) => msg,
            DuetError::Config(msg) => msg,
            DuetError::Timeout(msg) => msg,
            DuetError::ResourceLimit(msg) => msg,
        }
    }

    /// Check whether this error leaves caller state untouched (all of them do,
    /// but only these are expected during normal operation)
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            DuetError::Validation(_)
                | DuetError::NicknameTaken(_)
                | DuetError::NotRegistered(_)
                | DuetError::NotInSession(_)
        )
    }

    /// Create a network error
    pub fn network<T: Into<String>>(msg: T) -> Self {
        DuetError::Network(msg.into())
    }

    /// Create a serialization error
    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        DuetError::Serialization(msg.into())
    }

    /// Create a protocol error
    pub fn protocol<T: Into<String>>(msg: T) -> Self {
        DuetError::Protocol(msg.into())
    }

    /// Create a connection error
    pub fn connection<T: Into<String>>(msg: T) -> Self {
        DuetError::Connection(msg.into())
    }

    /// Create a validation error
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        DuetError::Validation(msg.into())
    }

    /// Create a nickname conflict error
    pub fn nickname_taken<T: Into<String>>(msg: T) -> Self {
        DuetError::NicknameTaken(msg.into())
    }

    /// Create a not-registered error
    pub fn not_registered<T: Into<String>>(msg: T) -> Self {
        DuetError::NotRegistered(msg.into())
    }

    /// Create a not-in-session error
    pub fn not_in_session<T: Into<String>>(msg: T) -> Self {
        DuetError::NotInSession(msg.into())
    }

    /// Create an internal error
    pub fn internal<T: Into<String>>(msg: T) -> Self {
        DuetError::Internal(msg.into())
    }

    /// Create a configuration error
    pub fn config<T: Into<String>>(msg: T) -> Self {
        DuetError::Config(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<T: Into<String>>(msg: T) -> Self {
        DuetError::Timeout(msg.into())
    }

    /// Create a resource limit error
    pub fn resource_limit<T: Into<String>>(msg: T) -> Self {
        DuetError::ResourceLimit(msg.into())
    }
}

impl fmt::Display for DuetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuetError::Network(msg) => write!(f, "Network error: {}", msg),
            DuetError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            DuetError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            DuetError::Connection(msg) => write!(f, "Connection error: {}", msg),
            DuetError::Validation(msg) => write!(f, "Validation error: {}", msg),
            DuetError::NicknameTaken(msg) => write!(f, "Nickname taken: {}", msg),
            DuetError::NotRegistered(msg) => write!(f, "Not registered: {}", msg),
            DuetError::NotInSession(msg) => write!(f, "Not in session: {}", msg),
            DuetError::Internal(msg) => write!(f, "Internal error: {}", msg),
            DuetError::Config(msg) => write!(f, "Configuration error: {}", msg),
            DuetError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            DuetError::ResourceLimit(msg) => write!(f, "Resource limit exceeded: {}", msg),
        }
    }
}

impl std::error::Error for DuetError {}

impl From<std::io::Error> for DuetError {
    fn from(err: std::io::Error) -> Self {
        DuetError::Network(format!("IO error: {}", err))
    }
}

impl From<quinn::ConnectError> for DuetError {
    fn from(err: quinn::ConnectError) -> Self {
        DuetError::Connection(format!("QUIC connection error: {}", err))
    }
}

impl From<quinn::ConnectionError> for DuetError {
    fn from(err: quinn::ConnectionError) -> Self {
        DuetError::Connection(format!("QUIC connection error: {}", err))
    }
}

impl From<quinn::ReadError> for DuetError {
    fn from(err: quinn::ReadError) -> Self {
        DuetError::Network(format!("QUIC read error: {}", err))
    }
}

impl From<quinn::WriteError> for DuetError {
    fn from(err: quinn::WriteError) -> Self {
        DuetError::Network(format!("QUIC write error: {}", err))
    }
}

impl From<quinn::ClosedStream> for DuetError {
    fn from(err: quinn::ClosedStream) -> Self {
        DuetError::Connection(format!("Stream closed: {}", err))
    }
}

impl From<serde_json::Error> for DuetError {
    fn from(err: serde_json::Error) -> Self {
        DuetError::Serialization(format!("JSON error: {}", err))
    }
}

impl From<anyhow::Error> for DuetError {
    fn from(err: anyhow::Error) -> Self {
        DuetError::Internal(format!("Anyhow error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_distinct() {
        let errors = [
            DuetError::network("x"),
            DuetError::serialization("x"),
            DuetError::protocol("x"),
            DuetError::connection("x"),
            DuetError::validation("x"),
            DuetError::nickname_taken("x"),
            DuetError::not_registered("x"),
            DuetError::not_in_session("x"),
            DuetError::internal("x"),
            DuetError::config("x"),
            DuetError::timeout("x"),
            DuetError::resource_limit("x"),
        ];

        let codes: std::collections::HashSet<u32> = errors.iter().map(|e| e.code()).collect();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_client_fault_classification() {
        assert!(DuetError::not_in_session("no session").is_client_fault());
        assert!(DuetError::nickname_taken("alice").is_client_fault());
        assert!(!DuetError::network("socket").is_client_fault());
        assert!(!DuetError::internal("bug").is_client_fault());
    }

    #[test]
    fn test_display_includes_message() {
        let err = DuetError::validation("nickname must be 2-20 characters");
        assert!(err.to_string().contains("nickname must be 2-20 characters"));
    }
}
