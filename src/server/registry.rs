//! Identity registry for the pairing chat server
//!
//! Tracks the profile behind each live connection. Profiles are keyed by
//! connection ID and exist only for the lifetime of that connection; there
//! is no persistence and no account system.

use std::collections::HashMap;

use crate::current_timestamp;
use crate::error::{DuetError, Result};
use crate::protocol::messages::{ConnectionId, Gender, PartnerInfo, ProfileInfo};

/// A registered user profile, bound to one live connection
#[derive(Debug, Clone)]
pub struct Profile {
    /// Connection this profile belongs to
    pub connection_id: ConnectionId,
    /// Client-persisted device fingerprint
    pub device_id: String,
    /// Display name
    pub nickname: String,
    /// Optional bio
    pub bio: Option<String>,
    /// Self-asserted gender
    pub gender: Gender,
    /// Registration timestamp (Unix ms)
    pub created_at: u64,
}

impl Profile {
    pub fn to_profile_info(&self) -> ProfileInfo {
        ProfileInfo {
            nickname: self.nickname.clone(),
            bio: self.bio.clone(),
            gender: self.gender,
            created_at: self.created_at,
        }
    }

    /// What a match partner is allowed to see: nickname and bio only
    pub fn to_partner_info(&self) -> PartnerInfo {
        PartnerInfo {
            nickname: self.nickname.clone(),
            bio: self.bio.clone(),
        }
    }
}

/// Limits applied to registration payloads
#[derive(Debug, Clone)]
pub struct RegistrationLimits {
    pub min_nickname_len: usize,
    pub max_nickname_len: usize,
    pub max_bio_len: usize,
}

impl Default for RegistrationLimits {
    fn default() -> Self {
        Self {
            min_nickname_len: 2,
            max_nickname_len: 20,
            max_bio_len: 100,
        }
    }
}

/// Registry of live profiles, indexed by connection ID
pub struct IdentityRegistry {
    /// All profiles indexed by connection ID
    profiles: HashMap<ConnectionId, Profile>,
    /// Device ID to connection mapping (for re-registration detection)
    device_index: HashMap<String, ConnectionId>,
    /// Validation limits
    limits: RegistrationLimits,
}

impl IdentityRegistry {
    pub fn new(limits: RegistrationLimits) -> Self {
        Self {
            profiles: HashMap::new(),
            device_index: HashMap::new(),
            limits,
        }
    }

    /// Register a profile for a connection.
    ///
    /// Returns the connection ID of an evicted stale profile, if the same
    /// device was already registered on another connection. The caller is
    /// responsible for cleaning up the evicted connection's state.
    pub fn register(
        &mut self,
        connection_id: &ConnectionId,
        device_id: String,
        nickname: String,
        bio: Option<String>,
        gender: Gender,
    ) -> Result<Option<ConnectionId>> {
        let nickname = nickname.trim().to_string();

        if device_id.is_empty() {
            return Err(DuetError::validation("device_id must not be empty"));
        }
        if nickname.chars().count() < self.limits.min_nickname_len
            || nickname.chars().count() > self.limits.max_nickname_len
        {
            return Err(DuetError::validation(format!(
                "nickname must be {}-{} characters",
                self.limits.min_nickname_len, self.limits.max_nickname_len
            )));
        }
        if let Some(ref bio) = bio {
            if bio.chars().count() > self.limits.max_bio_len {
                return Err(DuetError::validation(format!(
                    "bio must be at most {} characters",
                    self.limits.max_bio_len
                )));
            }
        }

        // Nickname must be unique among other live connections. A profile
        // from the same device does not count, it is about to be evicted.
        let taken = self.profiles.values().any(|p| {
            p.connection_id != *connection_id
                && p.device_id != device_id
                && p.nickname.eq_ignore_ascii_case(&nickname)
        });
        if taken {
            return Err(DuetError::nickname_taken(format!(
                "nickname '{}' is already in use",
                nickname
            )));
        }

        // Same device on a different connection evicts the stale one
        let evicted = match self.device_index.get(&device_id) {
            Some(existing) if existing != connection_id => Some(existing.clone()),
            _ => None,
        };

        let profile = Profile {
            connection_id: connection_id.clone(),
            device_id: device_id.clone(),
            nickname,
            bio,
            gender,
            created_at: current_timestamp(),
        };

        // Re-registration on the same connection replaces the old profile
        if let Some(old) = self.profiles.insert(connection_id.clone(), profile) {
            if old.device_id != device_id {
                self.device_index.remove(&old.device_id);
            }
        }
        self.device_index.insert(device_id, connection_id.clone());

        Ok(evicted)
    }

    /// Get the profile for a connection
    pub fn get(&self, connection_id: &ConnectionId) -> Option<&Profile> {
        self.profiles.get(connection_id)
    }

    /// Whether a connection has registered
    pub fn is_registered(&self, connection_id: &ConnectionId) -> bool {
        self.profiles.contains_key(connection_id)
    }

    /// Remove the profile for a connection
    pub fn remove(&mut self, connection_id: &ConnectionId) -> Option<Profile> {
        let profile = self.profiles.remove(connection_id)?;
        // Only drop the device mapping if it still points at this connection
        if self.device_index.get(&profile.device_id) == Some(connection_id) {
            self.device_index.remove(&profile.device_id);
        }
        Some(profile)
    }

    /// Number of registered profiles
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for IdentityRegistry {
    fn default() -> Self {
        Self::new(RegistrationLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> IdentityRegistry {
        IdentityRegistry::default()
    }

    #[test]
    fn test_register_and_get() {
        let mut reg = registry();
        let conn = "c-1".to_string();

        let evicted = reg
            .register(&conn, "dev-1".into(), "alice".into(), None, Gender::Female)
            .unwrap();
        assert!(evicted.is_none());

        let profile = reg.get(&conn).unwrap();
        assert_eq!(profile.nickname, "alice");
        assert_eq!(profile.gender, Gender::Female);
        assert!(profile.created_at > 0);
    }

    #[test]
    fn test_nickname_validation() {
        let mut reg = registry();
        let conn = "c-1".to_string();

        // Too short
        let err = reg
            .register(&conn, "dev-1".into(), "a".into(), None, Gender::Male)
            .unwrap_err();
        assert_eq!(err.code(), 1005);

        // Too long
        let err = reg
            .register(
                &conn,
                "dev-1".into(),
                "a".repeat(21),
                None,
                Gender::Male,
            )
            .unwrap_err();
        assert_eq!(err.code(), 1005);

        // Whitespace is trimmed before length check
        reg.register(&conn, "dev-1".into(), "  bo  ".into(), None, Gender::Male)
            .unwrap();
        assert_eq!(reg.get(&conn).unwrap().nickname, "bo");
    }

    #[test]
    fn test_bio_length_limit() {
        let mut reg = registry();
        let err = reg
            .register(
                &"c-1".to_string(),
                "dev-1".into(),
                "alice".into(),
                Some("x".repeat(101)),
                Gender::Female,
            )
            .unwrap_err();
        assert_eq!(err.code(), 1005);
    }

    #[test]
    fn test_empty_device_id_rejected() {
        let mut reg = registry();
        let err = reg
            .register(
                &"c-1".to_string(),
                String::new(),
                "alice".into(),
                None,
                Gender::Female,
            )
            .unwrap_err();
        assert_eq!(err.code(), 1005);
    }

    #[test]
    fn test_nickname_conflict() {
        let mut reg = registry();
        reg.register(
            &"c-1".to_string(),
            "dev-1".into(),
            "alice".into(),
            None,
            Gender::Female,
        )
        .unwrap();

        // Case-insensitive conflict from another connection
        let err = reg
            .register(
                &"c-2".to_string(),
                "dev-2".into(),
                "ALICE".into(),
                None,
                Gender::Male,
            )
            .unwrap_err();
        assert_eq!(err.code(), 1014);

        // Same connection may re-register with its own nickname
        reg.register(
            &"c-1".to_string(),
            "dev-1".into(),
            "alice".into(),
            Some("new bio".into()),
            Gender::Female,
        )
        .unwrap();
    }

    #[test]
    fn test_device_eviction() {
        let mut reg = registry();
        reg.register(
            &"c-1".to_string(),
            "dev-1".into(),
            "alice".into(),
            None,
            Gender::Female,
        )
        .unwrap();

        // Same device from a new connection evicts the stale one
        let evicted = reg
            .register(
                &"c-2".to_string(),
                "dev-1".into(),
                "alice2".into(),
                None,
                Gender::Female,
            )
            .unwrap();
        assert_eq!(evicted, Some("c-1".to_string()));
    }

    #[test]
    fn test_device_eviction_keeps_own_nickname() {
        let mut reg = registry();
        reg.register(
            &"c-1".to_string(),
            "dev-1".into(),
            "alice".into(),
            None,
            Gender::Female,
        )
        .unwrap();

        // The stale profile holds the nickname, but the same device may
        // reclaim it on reconnect
        let evicted = reg
            .register(
                &"c-2".to_string(),
                "dev-1".into(),
                "alice".into(),
                None,
                Gender::Female,
            )
            .unwrap();
        assert_eq!(evicted, Some("c-1".to_string()));
        assert_eq!(reg.get(&"c-2".to_string()).unwrap().nickname, "alice");
    }

    #[test]
    fn test_remove() {
        let mut reg = registry();
        let conn = "c-1".to_string();
        reg.register(&conn, "dev-1".into(), "alice".into(), None, Gender::Female)
            .unwrap();

        let profile = reg.remove(&conn).unwrap();
        assert_eq!(profile.nickname, "alice");
        assert!(reg.get(&conn).is_none());
        assert!(reg.is_empty());

        // Idempotent
        assert!(reg.remove(&conn).is_none());
    }

    #[test]
    fn test_partner_info_hides_gender() {
        let mut reg = registry();
        let conn = "c-1".to_string();
        reg.register(
            &conn,
            "dev-1".into(),
            "alice".into(),
            Some("hi".into()),
            Gender::Female,
        )
        .unwrap();

        let info = reg.get(&conn).unwrap().to_partner_info();
        assert_eq!(info.nickname, "alice");
        assert_eq!(info.bio.as_deref(), Some("hi"));
    }
}
