//! Central coordinator: registry, queues, matching, and sessions
//!
//! All state transitions run through this single struct so that queue
//! membership, session membership, and profile lifetime can never disagree.
//! The coordinator also writes every outbound frame itself, through the
//! per-connection command channels handed over in [`Coordinator::attach`],
//! which keeps acknowledgements ordered before the events they precede.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::current_timestamp;
use crate::error::{DuetError, Result};
use crate::generate_message_id;
use crate::protocol::frame::Frame;
use crate::protocol::messages::{
    self, ChatLeft, ConnectionId, Gender, Goodbye, LogoutOk, MatchFound, PartnerLeft,
    PartnerTyping, Preference, QueueJoined, QueueLeft, QueueStatusInfo, RegisterOk,
    SessionMessage, StatsInfo,
};
use crate::protocol::Encodable;

use super::matcher;
use super::queues::PreferenceQueues;
use super::registry::{IdentityRegistry, RegistrationLimits};
use super::sessions::SessionManager;

/// Commands sent to a connection's writer task
#[derive(Debug)]
pub enum ConnectionCommand {
    /// Write a frame to the control stream
    SendFrame(Frame),
    /// Send a frame as an unreliable datagram
    SendDatagram(Frame),
    /// Close the connection
    Close { reason: String },
}

/// Sender half of a connection's command channel
pub type CommandSender = mpsc::UnboundedSender<ConnectionCommand>;

/// Coordinator configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Maximum chat message length in characters
    pub max_message_len: usize,
    /// Registration validation limits
    pub limits: RegistrationLimits,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_message_len: 2000,
            limits: RegistrationLimits::default(),
        }
    }
}

/// The pairing coordinator
pub struct Coordinator {
    config: CoordinatorConfig,
    registry: IdentityRegistry,
    queues: PreferenceQueues,
    sessions: SessionManager,
    /// Command channels of attached connections
    senders: HashMap<ConnectionId, CommandSender>,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        let limits = config.limits.clone();
        Self {
            config,
            registry: IdentityRegistry::new(limits),
            queues: PreferenceQueues::new(),
            sessions: SessionManager::new(),
            senders: HashMap::new(),
        }
    }

    /// Attach a new connection's command channel
    pub fn attach(&mut self, connection_id: &ConnectionId, sender: CommandSender) {
        debug!("Connection attached: {}", connection_id);
        self.senders.insert(connection_id.clone(), sender);
    }

    /// Full teardown for a connection that is gone or leaving
    pub fn disconnect(&mut self, connection_id: &ConnectionId) {
        self.cleanup(connection_id);
        self.senders.remove(connection_id);
        debug!("Connection detached: {}", connection_id);
    }

    /// Register a profile for this connection
    pub fn register(
        &mut self,
        connection_id: &ConnectionId,
        msg: messages::Register,
    ) -> Result<()> {
        let result = self.registry.register(
            connection_id,
            msg.device_id,
            msg.nickname,
            msg.bio,
            msg.gender,
        );

        match result {
            Ok(evicted) => {
                if let Some(stale) = evicted {
                    self.evict(&stale);
                }

                // Registry just inserted the profile
                let profile = self
                    .registry
                    .get(connection_id)
                    .map(|p| p.to_profile_info())
                    .ok_or_else(|| DuetError::internal("profile missing after registration"))?;

                info!(
                    "Registered '{}' on connection {}",
                    profile.nickname, connection_id
                );
                self.send(connection_id, &RegisterOk { profile });
                Ok(())
            }
            Err(err) => {
                debug!("Registration rejected for {}: {}", connection_id, err);
                self.send(
                    connection_id,
                    &messages::RegisterFailed {
                        code: err.code(),
                        message: err.message().to_string(),
                    },
                );
                Err(err)
            }
        }
    }

    /// Join a preference queue, matching immediately when possible
    pub fn join_queue(&mut self, connection_id: &ConnectionId, preference: Preference) {
        let gender = match self.require_registered(connection_id) {
            Some(profile) => profile.gender,
            None => return,
        };

        if self.sessions.find_by_participant(connection_id).is_some() {
            self.send_error(
                connection_id,
                &DuetError::validation("already in a chat session"),
            );
            return;
        }

        let position = self.queues.enqueue(connection_id, preference);
        self.send(
            connection_id,
            &QueueJoined {
                queue: preference,
                position,
            },
        );

        if let Some(partner) =
            matcher::find_candidate(&self.queues, connection_id, gender, preference)
        {
            self.pair(connection_id, &partner);
        }
    }

    /// Leave the queue. Idempotent.
    pub fn leave_queue(&mut self, connection_id: &ConnectionId) {
        self.queues.remove(connection_id);
        self.send(connection_id, &QueueLeft {});
    }

    /// Report the caller's queue position
    pub fn queue_status(&mut self, connection_id: &ConnectionId) {
        let status = match self.queues.position_of(connection_id) {
            Some((queue, position, total)) => QueueStatusInfo {
                in_queue: true,
                queue: Some(queue),
                position: Some(position),
                total_in_queue: Some(total),
            },
            None => QueueStatusInfo::not_queued(),
        };
        self.send(connection_id, &status);
    }

    /// Relay a chat message to both session participants
    pub fn chat_send(&mut self, connection_id: &ConnectionId, content: String) {
        let sender_nickname = match self.require_registered(connection_id) {
            Some(profile) => profile.nickname.clone(),
            None => return,
        };

        let content = content.trim().to_string();
        if content.is_empty() {
            self.send_error(
                connection_id,
                &DuetError::validation("message must not be empty"),
            );
            return;
        }
        if content.chars().count() > self.config.max_message_len {
            self.send_error(
                connection_id,
                &DuetError::validation(format!(
                    "message must be at most {} characters",
                    self.config.max_message_len
                )),
            );
            return;
        }

        let partner = match self.sessions.partner_of(connection_id) {
            Some(partner) => partner,
            None => {
                self.send_error(
                    connection_id,
                    &DuetError::not_in_session("no active chat session"),
                );
                return;
            }
        };

        // One id and one timestamp shared by both deliveries
        let id = generate_message_id();
        let timestamp = current_timestamp();

        self.send(
            &partner,
            &SessionMessage {
                id: id.clone(),
                sender: sender_nickname.clone(),
                content: content.clone(),
                timestamp,
                is_own: false,
            },
        );
        self.send(
            connection_id,
            &SessionMessage {
                id,
                sender: sender_nickname,
                content,
                timestamp,
                is_own: true,
            },
        );
    }

    /// Forward a typing signal to the partner, if any. Silently dropped
    /// outside a session, as befits an unreliable signal.
    pub fn relay_typing(&mut self, connection_id: &ConnectionId) {
        let nickname = match self.registry.get(connection_id) {
            Some(profile) => profile.nickname.clone(),
            None => return,
        };
        if let Some(partner) = self.sessions.partner_of(connection_id) {
            self.send_datagram(&partner, &PartnerTyping { nickname });
        }
    }

    /// Leave the current chat session. Idempotent.
    pub fn chat_leave(&mut self, connection_id: &ConnectionId) {
        if let Some(session) = self.sessions.destroy_for(connection_id) {
            if let Some(partner) = session.partner_of(connection_id) {
                self.notify_partner_left(partner, connection_id);
            }
        }
        self.send(connection_id, &ChatLeft {});
    }

    /// Explicit logout: full cleanup, but the connection stays open
    pub fn logout(&mut self, connection_id: &ConnectionId) {
        self.cleanup(connection_id);
        self.send(connection_id, &LogoutOk {});
    }

    /// Platform-wide aggregate counts
    pub fn stats(&mut self, connection_id: &ConnectionId) {
        let stats = StatsInfo {
            online: self.registry.len(),
            in_queue: self.queues.count_all(),
            in_chat: self.sessions.participant_count(),
        };
        self.send(connection_id, &stats);
    }

    /// Number of attached connections
    pub fn connection_count(&self) -> usize {
        self.senders.len()
    }

    /// Number of registered profiles
    pub fn registered_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of users waiting in queues
    pub fn waiting_count(&self) -> usize {
        self.queues.count_all()
    }

    /// Number of active chat sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Ask every attached connection to close, for shutdown
    pub fn close_all(&mut self, reason: &str) {
        for sender in self.senders.values() {
            let _ = sender.send(ConnectionCommand::Close {
                reason: reason.to_string(),
            });
        }
    }

    // -------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------

    /// Pair two connections into a new session and notify both
    fn pair(&mut self, a: &ConnectionId, b: &ConnectionId) {
        self.queues.remove(a);
        self.queues.remove(b);

        let session = self.sessions.create(a, b);
        info!(
            "Matched {} with {} in session {}",
            a, b, session.session_id
        );

        let info_a = self.registry.get(a).map(|p| p.to_partner_info());
        let info_b = self.registry.get(b).map(|p| p.to_partner_info());

        if let (Some(info_a), Some(info_b)) = (info_a, info_b) {
            self.send(
                a,
                &MatchFound {
                    session_id: session.session_id.clone(),
                    partner: info_b,
                },
            );
            self.send(
                b,
                &MatchFound {
                    session_id: session.session_id,
                    partner: info_a,
                },
            );
        } else {
            // A participant lost its profile between matching and notify;
            // roll the session back
            warn!("Pairing aborted, participant unregistered mid-match");
            self.sessions.destroy_for(a);
        }
    }

    /// Remove a connection from queue, session, and registry, notifying
    /// an abandoned partner
    fn cleanup(&mut self, connection_id: &ConnectionId) {
        self.queues.remove(connection_id);
        if let Some(session) = self.sessions.destroy_for(connection_id) {
            if let Some(partner) = session.partner_of(connection_id) {
                self.notify_partner_left(partner, connection_id);
            }
        }
        self.registry.remove(connection_id);
    }

    /// Tear down a stale connection whose device re-registered elsewhere
    fn evict(&mut self, stale: &ConnectionId) {
        info!("Evicting stale connection {}", stale);
        self.cleanup(stale);
        self.send(
            stale,
            &Goodbye {
                reason: "signed in from another device".to_string(),
            },
        );
        if let Some(sender) = self.senders.remove(stale) {
            let _ = sender.send(ConnectionCommand::Close {
                reason: "replaced by newer registration".to_string(),
            });
        }
    }

    fn notify_partner_left(&mut self, partner: &ConnectionId, gone: &ConnectionId) {
        let nickname = self
            .registry
            .get(gone)
            .map(|p| p.nickname.clone())
            .unwrap_or_else(|| "Your partner".to_string());
        self.send(
            partner,
            &PartnerLeft {
                message: format!("{} has left the chat", nickname),
            },
        );
    }

    /// Fetch the caller's profile or answer with a not-registered error
    fn require_registered(&mut self, connection_id: &ConnectionId) -> Option<ProfileSnapshot> {
        match self.registry.get(connection_id) {
            Some(profile) => Some(ProfileSnapshot {
                nickname: profile.nickname.clone(),
                gender: profile.gender,
            }),
            None => {
                self.send_error(
                    connection_id,
                    &DuetError::not_registered("register before using this command"),
                );
                None
            }
        }
    }

    fn send<T: Encodable>(&self, connection_id: &ConnectionId, msg: &T) {
        self.dispatch(connection_id, msg, false);
    }

    fn send_datagram<T: Encodable>(&self, connection_id: &ConnectionId, msg: &T) {
        self.dispatch(connection_id, msg, true);
    }

    fn dispatch<T: Encodable>(&self, connection_id: &ConnectionId, msg: &T, datagram: bool) {
        let frame = match msg.encode_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode frame for {}: {}", connection_id, e);
                return;
            }
        };
        if let Some(sender) = self.senders.get(connection_id) {
            let command = if datagram {
                ConnectionCommand::SendDatagram(frame)
            } else {
                ConnectionCommand::SendFrame(frame)
            };
            // Receiver gone means the connection is already closing
            let _ = sender.send(command);
        }
    }

    fn send_error(&self, connection_id: &ConnectionId, err: &DuetError) {
        self.send(connection_id, &messages::Error::from(err));
    }
}

/// Cloned profile fields needed while `&mut self` is still in use
struct ProfileSnapshot {
    nickname: String,
    gender: Gender,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::messages::Register;
    use crate::protocol::{DecodedMessage, FrameType};
    use tokio::sync::mpsc::UnboundedReceiver;

    struct TestConn {
        id: ConnectionId,
        rx: UnboundedReceiver<ConnectionCommand>,
    }

    impl TestConn {
        fn attach(coordinator: &mut Coordinator, id: &str) -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            let id = id.to_string();
            coordinator.attach(&id, tx);
            Self { id, rx }
        }

        /// Next outbound message, panicking if none is pending
        fn next(&mut self) -> DecodedMessage {
            match self.rx.try_recv().expect("expected a pending command") {
                ConnectionCommand::SendFrame(frame)
                | ConnectionCommand::SendDatagram(frame) => {
                    DecodedMessage::decode(&frame).expect("frame should decode")
                }
                ConnectionCommand::Close { reason } => {
                    panic!("unexpected close: {}", reason)
                }
            }
        }

        fn next_raw(&mut self) -> ConnectionCommand {
            self.rx.try_recv().expect("expected a pending command")
        }

        fn assert_idle(&mut self) {
            assert!(self.rx.try_recv().is_err(), "expected no pending commands");
        }
    }

    fn register(
        coordinator: &mut Coordinator,
        conn: &mut TestConn,
        device: &str,
        nickname: &str,
        gender: Gender,
    ) {
        coordinator
            .register(
                &conn.id,
                Register {
                    device_id: device.to_string(),
                    nickname: nickname.to_string(),
                    bio: None,
                    gender,
                },
            )
            .unwrap();
        match conn.next() {
            DecodedMessage::RegisterOk(ok) => assert_eq!(ok.profile.nickname, nickname),
            other => panic!("expected RegisterOk, got {:?}", other.frame_type()),
        }
    }

    fn coordinator() -> Coordinator {
        Coordinator::new(CoordinatorConfig::default())
    }

    #[test]
    fn test_register_ok_and_duplicate_nickname() {
        let mut coord = coordinator();
        let mut alice = TestConn::attach(&mut coord, "c-alice");
        let mut bob = TestConn::attach(&mut coord, "c-bob");

        register(&mut coord, &mut alice, "dev-a", "alice", Gender::Female);

        let err = coord
            .register(
                &bob.id,
                Register {
                    device_id: "dev-b".to_string(),
                    nickname: "alice".to_string(),
                    bio: None,
                    gender: Gender::Male,
                },
            )
            .unwrap_err();
        assert_eq!(err.code(), 1014);

        match bob.next() {
            DecodedMessage::RegisterFailed(failed) => assert_eq!(failed.code, 1014),
            other => panic!("expected RegisterFailed, got {:?}", other.frame_type()),
        }
    }

    #[test]
    fn test_queue_join_requires_registration() {
        let mut coord = coordinator();
        let mut conn = TestConn::attach(&mut coord, "c-1");

        coord.join_queue(&conn.id, Preference::Any);
        match conn.next() {
            DecodedMessage::Error(err) => assert_eq!(err.code, 1015),
            other => panic!("expected Error, got {:?}", other.frame_type()),
        }
    }

    #[test]
    fn test_queue_joined_ack_precedes_match_found() {
        let mut coord = coordinator();
        let mut alice = TestConn::attach(&mut coord, "c-alice");
        let mut bob = TestConn::attach(&mut coord, "c-bob");

        register(&mut coord, &mut alice, "dev-a", "alice", Gender::Female);
        register(&mut coord, &mut bob, "dev-b", "bob", Gender::Male);

        coord.join_queue(&alice.id, Preference::Any);
        match alice.next() {
            DecodedMessage::QueueJoined(joined) => {
                assert_eq!(joined.queue, Preference::Any);
                assert_eq!(joined.position, 1);
            }
            other => panic!("expected QueueJoined, got {:?}", other.frame_type()),
        }
        alice.assert_idle();

        coord.join_queue(&bob.id, Preference::Any);

        // Bob's ack arrives before his MatchFound
        match bob.next() {
            DecodedMessage::QueueJoined(_) => {}
            other => panic!("expected QueueJoined first, got {:?}", other.frame_type()),
        }
        let bob_match = match bob.next() {
            DecodedMessage::MatchFound(m) => m,
            other => panic!("expected MatchFound, got {:?}", other.frame_type()),
        };
        let alice_match = match alice.next() {
            DecodedMessage::MatchFound(m) => m,
            other => panic!("expected MatchFound, got {:?}", other.frame_type()),
        };

        assert_eq!(bob_match.session_id, alice_match.session_id);
        assert_eq!(bob_match.partner.nickname, "alice");
        assert_eq!(alice_match.partner.nickname, "bob");

        // Both entries left the queues when the session was created
        assert_eq!(coord.waiting_count(), 0);
        assert_eq!(coord.session_count(), 1);
    }

    #[test]
    fn test_no_match_leaves_joiner_waiting() {
        let mut coord = coordinator();
        let mut alice = TestConn::attach(&mut coord, "c-alice");
        register(&mut coord, &mut alice, "dev-a", "alice", Gender::Female);

        coord.join_queue(&alice.id, Preference::Any);
        match alice.next() {
            DecodedMessage::QueueJoined(_) => {}
            other => panic!("expected QueueJoined, got {:?}", other.frame_type()),
        }
        alice.assert_idle();

        coord.queue_status(&alice.id);
        match alice.next() {
            DecodedMessage::QueueStatusInfo(status) => {
                assert!(status.in_queue);
                assert_eq!(status.position, Some(1));
                assert_eq!(status.total_in_queue, Some(1));
            }
            other => panic!("expected QueueStatusInfo, got {:?}", other.frame_type()),
        }
    }

    #[test]
    fn test_join_queue_while_in_session_rejected() {
        let mut coord = coordinator();
        let mut alice = TestConn::attach(&mut coord, "c-alice");
        let mut bob = TestConn::attach(&mut coord, "c-bob");
        register(&mut coord, &mut alice, "dev-a", "alice", Gender::Female);
        register(&mut coord, &mut bob, "dev-b", "bob", Gender::Male);

        coord.join_queue(&alice.id, Preference::Any);
        coord.join_queue(&bob.id, Preference::Any);
        alice.next(); // QueueJoined
        alice.next(); // MatchFound
        bob.next();
        bob.next();

        coord.join_queue(&alice.id, Preference::Any);
        match alice.next() {
            DecodedMessage::Error(err) => assert_eq!(err.code, 1005),
            other => panic!("expected Error, got {:?}", other.frame_type()),
        }
    }

    #[test]
    fn test_chat_send_delivers_to_both_with_shared_id() {
        let mut coord = coordinator();
        let mut alice = TestConn::attach(&mut coord, "c-alice");
        let mut bob = TestConn::attach(&mut coord, "c-bob");
        register(&mut coord, &mut alice, "dev-a", "alice", Gender::Female);
        register(&mut coord, &mut bob, "dev-b", "bob", Gender::Male);

        coord.join_queue(&alice.id, Preference::Any);
        coord.join_queue(&bob.id, Preference::Any);
        alice.next();
        alice.next();
        bob.next();
        bob.next();

        coord.chat_send(&alice.id, "hello there".to_string());

        let to_bob = match bob.next() {
            DecodedMessage::SessionMessage(m) => m,
            other => panic!("expected SessionMessage, got {:?}", other.frame_type()),
        };
        let echo = match alice.next() {
            DecodedMessage::SessionMessage(m) => m,
            other => panic!("expected SessionMessage, got {:?}", other.frame_type()),
        };

        assert_eq!(to_bob.id, echo.id);
        assert_eq!(to_bob.timestamp, echo.timestamp);
        assert_eq!(to_bob.sender, "alice");
        assert!(!to_bob.is_own);
        assert!(echo.is_own);
        assert_eq!(to_bob.content, "hello there");
    }

    #[test]
    fn test_chat_send_without_session_fails() {
        let mut coord = coordinator();
        let mut alice = TestConn::attach(&mut coord, "c-alice");
        register(&mut coord, &mut alice, "dev-a", "alice", Gender::Female);

        coord.chat_send(&alice.id, "anyone there?".to_string());
        match alice.next() {
            DecodedMessage::Error(err) => assert_eq!(err.code, 1016),
            other => panic!("expected Error, got {:?}", other.frame_type()),
        }
    }

    #[test]
    fn test_chat_send_validation() {
        let mut coord = coordinator();
        let mut alice = TestConn::attach(&mut coord, "c-alice");
        register(&mut coord, &mut alice, "dev-a", "alice", Gender::Female);

        coord.chat_send(&alice.id, "   ".to_string());
        match alice.next() {
            DecodedMessage::Error(err) => assert_eq!(err.code, 1005),
            other => panic!("expected Error, got {:?}", other.frame_type()),
        }

        coord.chat_send(&alice.id, "x".repeat(2001));
        match alice.next() {
            DecodedMessage::Error(err) => assert_eq!(err.code, 1005),
            other => panic!("expected Error, got {:?}", other.frame_type()),
        }
    }

    #[test]
    fn test_chat_leave_notifies_partner_and_is_idempotent() {
        let mut coord = coordinator();
        let mut alice = TestConn::attach(&mut coord, "c-alice");
        let mut bob = TestConn::attach(&mut coord, "c-bob");
        register(&mut coord, &mut alice, "dev-a", "alice", Gender::Female);
        register(&mut coord, &mut bob, "dev-b", "bob", Gender::Male);

        coord.join_queue(&alice.id, Preference::Any);
        coord.join_queue(&bob.id, Preference::Any);
        alice.next();
        alice.next();
        bob.next();
        bob.next();

        coord.chat_leave(&alice.id);
        match alice.next() {
            DecodedMessage::ChatLeft(_) => {}
            other => panic!("expected ChatLeft, got {:?}", other.frame_type()),
        }
        match bob.next() {
            DecodedMessage::PartnerLeft(left) => {
                assert!(left.message.contains("alice"));
            }
            other => panic!("expected PartnerLeft, got {:?}", other.frame_type()),
        }

        // Leaving again only acks, the partner hears nothing new
        coord.chat_leave(&alice.id);
        match alice.next() {
            DecodedMessage::ChatLeft(_) => {}
            other => panic!("expected ChatLeft, got {:?}", other.frame_type()),
        }
        bob.assert_idle();

        // Session is gone for both sides
        coord.chat_send(&bob.id, "still there?".to_string());
        match bob.next() {
            DecodedMessage::Error(err) => assert_eq!(err.code, 1016),
            other => panic!("expected Error, got {:?}", other.frame_type()),
        }
    }

    #[test]
    fn test_disconnect_mid_session_notifies_partner() {
        let mut coord = coordinator();
        let mut alice = TestConn::attach(&mut coord, "c-alice");
        let mut bob = TestConn::attach(&mut coord, "c-bob");
        register(&mut coord, &mut alice, "dev-a", "alice", Gender::Female);
        register(&mut coord, &mut bob, "dev-b", "bob", Gender::Male);

        coord.join_queue(&alice.id, Preference::Any);
        coord.join_queue(&bob.id, Preference::Any);
        alice.next();
        alice.next();
        bob.next();
        bob.next();

        coord.disconnect(&alice.id);
        match bob.next() {
            DecodedMessage::PartnerLeft(_) => {}
            other => panic!("expected PartnerLeft, got {:?}", other.frame_type()),
        }

        coord.stats(&bob.id);
        match bob.next() {
            DecodedMessage::StatsInfo(stats) => {
                assert_eq!(stats.online, 1);
                assert_eq!(stats.in_chat, 0);
            }
            other => panic!("expected StatsInfo, got {:?}", other.frame_type()),
        }
    }

    #[test]
    fn test_disconnect_while_queued_removes_entry() {
        let mut coord = coordinator();
        let mut alice = TestConn::attach(&mut coord, "c-alice");
        let mut bob = TestConn::attach(&mut coord, "c-bob");
        register(&mut coord, &mut alice, "dev-a", "alice", Gender::Female);
        register(&mut coord, &mut bob, "dev-b", "bob", Gender::Male);

        coord.join_queue(&alice.id, Preference::Any);
        alice.next();
        coord.disconnect(&alice.id);

        // Bob joins and must not be matched against the gone connection
        coord.join_queue(&bob.id, Preference::Any);
        match bob.next() {
            DecodedMessage::QueueJoined(joined) => assert_eq!(joined.position, 1),
            other => panic!("expected QueueJoined, got {:?}", other.frame_type()),
        }
        bob.assert_idle();
    }

    #[test]
    fn test_device_eviction_cascades() {
        let mut coord = coordinator();
        let mut old = TestConn::attach(&mut coord, "c-old");
        let mut partner = TestConn::attach(&mut coord, "c-partner");
        register(&mut coord, &mut old, "dev-1", "alice", Gender::Female);
        register(&mut coord, &mut partner, "dev-2", "bob", Gender::Male);

        coord.join_queue(&old.id, Preference::Any);
        coord.join_queue(&partner.id, Preference::Any);
        old.next();
        old.next();
        partner.next();
        partner.next();

        // Same device registers from a fresh connection
        let mut fresh = TestConn::attach(&mut coord, "c-fresh");
        register(&mut coord, &mut fresh, "dev-1", "alice", Gender::Female);

        // Abandoned partner is told
        match partner.next() {
            DecodedMessage::PartnerLeft(_) => {}
            other => panic!("expected PartnerLeft, got {:?}", other.frame_type()),
        }

        // Stale connection gets a goodbye, then a close
        match old.next() {
            DecodedMessage::Goodbye(bye) => assert!(bye.reason.contains("another device")),
            other => panic!("expected Goodbye, got {:?}", other.frame_type()),
        }
        match old.next_raw() {
            ConnectionCommand::Close { .. } => {}
            other => panic!("expected Close, got {:?}", other),
        }

        // Nickname freed by the eviction was reusable by the fresh connection
        coord.stats(&fresh.id);
        match fresh.next() {
            DecodedMessage::StatsInfo(stats) => {
                assert_eq!(stats.online, 2);
                assert_eq!(stats.in_queue, 0);
                assert_eq!(stats.in_chat, 0);
            }
            other => panic!("expected StatsInfo, got {:?}", other.frame_type()),
        }
    }

    #[test]
    fn test_typing_relayed_only_in_session() {
        let mut coord = coordinator();
        let mut alice = TestConn::attach(&mut coord, "c-alice");
        let mut bob = TestConn::attach(&mut coord, "c-bob");
        register(&mut coord, &mut alice, "dev-a", "alice", Gender::Female);
        register(&mut coord, &mut bob, "dev-b", "bob", Gender::Male);

        // Outside a session the signal is dropped without an error
        coord.relay_typing(&alice.id);
        alice.assert_idle();
        bob.assert_idle();

        coord.join_queue(&alice.id, Preference::Any);
        coord.join_queue(&bob.id, Preference::Any);
        alice.next();
        alice.next();
        bob.next();
        bob.next();

        coord.relay_typing(&alice.id);
        match bob.next_raw() {
            ConnectionCommand::SendDatagram(frame) => {
                assert_eq!(frame.frame_type, FrameType::PartnerTyping);
                match DecodedMessage::decode(&frame).unwrap() {
                    DecodedMessage::PartnerTyping(typing) => {
                        assert_eq!(typing.nickname, "alice")
                    }
                    other => panic!("expected PartnerTyping, got {:?}", other.frame_type()),
                }
            }
            other => panic!("expected SendDatagram, got {:?}", other),
        }
    }

    #[test]
    fn test_logout_cleans_up_but_keeps_connection() {
        let mut coord = coordinator();
        let mut alice = TestConn::attach(&mut coord, "c-alice");
        register(&mut coord, &mut alice, "dev-a", "alice", Gender::Female);

        coord.join_queue(&alice.id, Preference::Any);
        alice.next();

        coord.logout(&alice.id);
        match alice.next() {
            DecodedMessage::LogoutOk(_) => {}
            other => panic!("expected LogoutOk, got {:?}", other.frame_type()),
        }

        // Still attached, but no longer registered
        assert_eq!(coord.connection_count(), 1);
        coord.join_queue(&alice.id, Preference::Any);
        match alice.next() {
            DecodedMessage::Error(err) => assert_eq!(err.code, 1015),
            other => panic!("expected Error, got {:?}", other.frame_type()),
        }
    }

    #[test]
    fn test_leave_queue_idempotent() {
        let mut coord = coordinator();
        let mut alice = TestConn::attach(&mut coord, "c-alice");
        register(&mut coord, &mut alice, "dev-a", "alice", Gender::Female);

        coord.leave_queue(&alice.id);
        match alice.next() {
            DecodedMessage::QueueLeft(_) => {}
            other => panic!("expected QueueLeft, got {:?}", other.frame_type()),
        }

        coord.join_queue(&alice.id, Preference::Female);
        alice.next();
        coord.leave_queue(&alice.id);
        match alice.next() {
            DecodedMessage::QueueLeft(_) => {}
            other => panic!("expected QueueLeft, got {:?}", other.frame_type()),
        }

        coord.queue_status(&alice.id);
        match alice.next() {
            DecodedMessage::QueueStatusInfo(status) => assert!(!status.in_queue),
            other => panic!("expected QueueStatusInfo, got {:?}", other.frame_type()),
        }
    }

    #[test]
    fn test_one_sided_matching_through_join() {
        let mut coord = coordinator();
        let mut waiting = TestConn::attach(&mut coord, "c-waiting");
        let mut male = TestConn::attach(&mut coord, "c-male");
        let mut female = TestConn::attach(&mut coord, "c-female");
        register(&mut coord, &mut waiting, "dev-w", "wanda", Gender::Female);
        register(&mut coord, &mut male, "dev-m", "mark", Gender::Male);
        register(&mut coord, &mut female, "dev-f", "fay", Gender::Female);

        // Wanda waits for a female partner
        coord.join_queue(&waiting.id, Preference::Female);
        waiting.next();

        // Mark asks for a female; Wanda's queue is not named after his
        // gender, so he waits too
        coord.join_queue(&male.id, Preference::Female);
        male.next();
        male.assert_idle();
        waiting.assert_idle();

        // Fay is female, so the female queue is in her pool
        coord.join_queue(&female.id, Preference::Male);
        female.next(); // QueueJoined
        match female.next() {
            DecodedMessage::MatchFound(m) => assert_eq!(m.partner.nickname, "wanda"),
            other => panic!("expected MatchFound, got {:?}", other.frame_type()),
        }
        match waiting.next() {
            DecodedMessage::MatchFound(m) => assert_eq!(m.partner.nickname, "fay"),
            other => panic!("expected MatchFound, got {:?}", other.frame_type()),
        }
    }
}
