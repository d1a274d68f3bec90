//! Active chat session tracking
//!
//! A session binds exactly two connections. Sessions are ephemeral and are
//! destroyed the moment either participant leaves or disconnects.

use std::collections::HashMap;

use crate::current_timestamp;
use crate::generate_session_id;
use crate::protocol::messages::{ConnectionId, SessionId};

/// An active one-on-one chat session
#[derive(Debug, Clone)]
pub struct Session {
    /// Session ID
    pub session_id: SessionId,
    /// The two participants
    pub participants: [ConnectionId; 2],
    /// When the session started (Unix ms)
    pub started_at: u64,
}

impl Session {
    /// The other participant, if the given connection is in this session
    pub fn partner_of(&self, connection_id: &ConnectionId) -> Option<&ConnectionId> {
        if self.participants[0] == *connection_id {
            Some(&self.participants[1])
        } else if self.participants[1] == *connection_id {
            Some(&self.participants[0])
        } else {
            None
        }
    }
}

/// Tracks all active sessions and which session each connection is in
pub struct SessionManager {
    /// All sessions indexed by session ID
    sessions: HashMap<SessionId, Session>,
    /// Connection to session mapping
    by_participant: HashMap<ConnectionId, SessionId>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            by_participant: HashMap::new(),
        }
    }

    /// Create a session between two connections
    pub fn create(&mut self, a: &ConnectionId, b: &ConnectionId) -> Session {
        let session = Session {
            session_id: generate_session_id(),
            participants: [a.clone(), b.clone()],
            started_at: current_timestamp(),
        };

        self.by_participant
            .insert(a.clone(), session.session_id.clone());
        self.by_participant
            .insert(b.clone(), session.session_id.clone());
        self.sessions
            .insert(session.session_id.clone(), session.clone());

        session
    }

    /// Get the session a connection participates in
    pub fn find_by_participant(&self, connection_id: &ConnectionId) -> Option<&Session> {
        let session_id = self.by_participant.get(connection_id)?;
        self.sessions.get(session_id)
    }

    /// Get a connection's current partner
    pub fn partner_of(&self, connection_id: &ConnectionId) -> Option<ConnectionId> {
        self.find_by_participant(connection_id)?
            .partner_of(connection_id)
            .cloned()
    }

    /// Destroy the session a connection participates in, returning it.
    /// Idempotent: a second call for either participant returns `None`.
    pub fn destroy_for(&mut self, connection_id: &ConnectionId) -> Option<Session> {
        let session_id = self.by_participant.remove(connection_id)?;
        let session = self.sessions.remove(&session_id)?;
        for participant in &session.participants {
            self.by_participant.remove(participant);
        }
        Some(session)
    }

    /// Number of active sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of connections currently in a chat
    pub fn participant_count(&self) -> usize {
        self.by_participant.len()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
