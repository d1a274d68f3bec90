//! QUIC-based anonymous pairing chat server with JSON serialization
//!
//! This library provides a matchmaking chat server that pairs anonymous users
//! for ephemeral one-on-one conversations. Users register with a nickname and
//! gender, join a preference queue, and are matched against compatible
//! waiting users; matched pairs exchange messages and typing signals until
//! either side leaves or disconnects.

pub mod client;
pub mod error;
pub mod protocol;
pub mod server;

pub use client::{DuetClient, DuetClientConfig};
pub use error::{DuetError, Result};
pub use server::PairServer;

use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a unique message ID
pub fn generate_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Generate a unique session ID
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Get current timestamp in milliseconds since UNIX epoch
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ids_unique() {
        let a = generate_message_id();
        let b = generate_message_id();
        assert_ne!(a, b);
    }

    #[test]
    fn test_timestamp_monotonic_enough() {
        let t1 = current_timestamp();
        let t2 = current_timestamp();
        assert!(t2 >= t1);
        assert!(t1 > 0);
    }
}
