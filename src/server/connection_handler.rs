//! Per-connection handler for the pairing server
//!
//! Owns one QUIC connection: runs the Hello handshake, reads commands off
//! the control stream and datagrams, and forwards them as events to the
//! server loop. Outbound traffic arrives as [`ConnectionCommand`]s from the
//! coordinator and is written here.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use quinn::{Connection, RecvStream, SendStream};
use tokio::sync::{mpsc, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::current_timestamp;
use crate::error::{DuetError, Result};
use crate::protocol::codec::{Decodable, Encodable};
use crate::protocol::frame::{Frame, FrameCodec, FrameType};
use crate::protocol::messages::*;

use super::coordinator::ConnectionCommand;

/// Events emitted by connection handlers to the server loop
#[derive(Debug)]
pub enum ServerEvent {
    /// Client completed the Hello handshake
    Connected { connection_id: ConnectionId },

    /// Client wants to register a profile
    Register {
        connection_id: ConnectionId,
        register: Register,
    },

    /// Client wants to join a preference queue
    QueueJoin {
        connection_id: ConnectionId,
        preference: Preference,
    },

    /// Client wants to leave the queue
    QueueLeave { connection_id: ConnectionId },

    /// Client asked for its queue position
    QueueStatus { connection_id: ConnectionId },

    /// Client sent a chat message
    ChatSend {
        connection_id: ConnectionId,
        content: String,
    },

    /// Client wants to leave the current chat
    ChatLeave { connection_id: ConnectionId },

    /// Client wants to log out
    Logout { connection_id: ConnectionId },

    /// Client asked for platform stats
    StatsRequest { connection_id: ConnectionId },

    /// Client is typing (datagram)
    Typing { connection_id: ConnectionId },

    /// Client disconnected
    Disconnected {
        connection_id: ConnectionId,
        reason: String,
    },
}

/// State of the connection handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HandshakeState {
    /// Waiting for Hello from client
    AwaitingHello,
    /// Hello acknowledged, commands accepted
    Ready,
}

/// Per-connection handler that manages the control stream and datagrams
pub struct ConnectionHandler {
    /// Underlying QUIC connection
    connection: Connection,

    /// Server-assigned connection ID
    connection_id: ConnectionId,

    /// Handshake state
    handshake_state: RwLock<HandshakeState>,

    /// Channel for sending events to the server
    event_tx: mpsc::UnboundedSender<ServerEvent>,

    /// Channel for receiving commands from the coordinator
    command_rx: RwLock<Option<mpsc::UnboundedReceiver<ConnectionCommand>>>,

    /// Control stream sender
    control_send: RwLock<Option<SendStream>>,

    /// Connection creation time
    created_at: Instant,

    /// Last activity timestamp
    last_activity: RwLock<Instant>,
}

impl ConnectionHandler {
    pub fn new(
        connection: Connection,
        connection_id: ConnectionId,
        event_tx: mpsc::UnboundedSender<ServerEvent>,
        command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    ) -> Self {
        Self {
            connection,
            connection_id,
            handshake_state: RwLock::new(HandshakeState::AwaitingHello),
            event_tx,
            command_rx: RwLock::new(Some(command_rx)),
            control_send: RwLock::new(None),
            created_at: Instant::now(),
            last_activity: RwLock::new(Instant::now()),
        }
    }

    /// Get the remote address
    pub fn remote_address(&self) -> std::net::SocketAddr {
        self.connection.remote_address()
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// Whether the handshake completed
    pub async fn is_ready(&self) -> bool {
        *self.handshake_state.read().await == HandshakeState::Ready
    }

    /// Get connection uptime
    pub fn uptime(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Update last activity
    async fn touch(&self) {
        *self.last_activity.write().await = Instant::now();
    }

    /// Run the connection handler
    /// This is the main entry point that should be spawned as a task
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let addr = self.remote_address();
        info!("New connection {} from {}", self.connection_id, addr);

        let result = self.accept_and_run_arc(Arc::clone(&self)).await;

        let reason = match &result {
            Ok(()) => "normal".to_string(),
            Err(e) => e.to_string(),
        };
        let _ = self.event_tx.send(ServerEvent::Disconnected {
            connection_id: self.connection_id.clone(),
            reason,
        });

        info!("Connection {} from {} closed", self.connection_id, addr);
        result
    }

    /// Accept the control stream and run all per-connection tasks
    async fn accept_and_run_arc(self: &Arc<Self>, handler: Arc<Self>) -> Result<()> {
        // Accept the control bidirectional stream from the client
        let (send, recv) = self
            .connection
            .accept_bi()
            .await
            .map_err(|e| DuetError::connection(format!("Failed to accept control stream: {}", e)))?;

        {
            let mut control = self.control_send.write().await;
            *control = Some(send);
        }

        debug!("Control stream accepted from {}", self.remote_address());

        // Spawn control stream receiver
        let recv_handle = {
            let h = Arc::clone(&handler);
            tokio::spawn(async move {
                if let Err(e) = h.handle_control_stream_arc(recv).await {
                    error!("Control stream error: {}", e);
                }
            })
        };

        // Spawn command handler
        let cmd_handle = {
            let h = Arc::clone(&handler);
            tokio::spawn(async move {
                h.handle_commands_arc().await;
            })
        };

        // Spawn datagram receiver
        let dgram_handle = {
            let h = Arc::clone(&handler);
            tokio::spawn(async move {
                h.handle_datagrams_arc().await;
            })
        };

        // Spawn ping task
        let ping_handle = {
            let h = Arc::clone(&handler);
            tokio::spawn(async move {
                h.ping_loop_arc().await;
            })
        };

        // Wait for any task to complete (usually means disconnect)
        tokio::select! {
            _ = recv_handle => {},
            _ = cmd_handle => {},
            _ = dgram_handle => {},
            _ = ping_handle => {},
        }

        Ok(())
    }

    /// Handle incoming frames on the control stream
    async fn handle_control_stream_arc(self: &Arc<Self>, mut recv: RecvStream) -> Result<()> {
        let mut codec = FrameCodec::new();
        let mut buf = vec![0u8; 4096];

        loop {
            match recv.read(&mut buf).await {
                Ok(Some(n)) => {
                    self.touch().await;
                    codec.feed(&buf[..n]);

                    // Process all available frames
                    loop {
                        match codec.decode_next() {
                            Ok(Some(frame)) => {
                                if let Err(e) = self.handle_control_frame(frame).await {
                                    warn!("Error handling control frame: {}", e);
                                    self.send_error(e).await?;
                                }
                            }
                            Ok(None) => break,
                            Err(e) => {
                                return Err(DuetError::protocol(format!(
                                    "Frame decode error: {}",
                                    e
                                )));
                            }
                        }
                    }
                }
                Ok(None) => {
                    debug!("Control stream finished");
                    break;
                }
                Err(e) => {
                    return Err(DuetError::network(format!(
                        "Control stream read error: {}",
                        e
                    )));
                }
            }
        }

        Ok(())
    }

    /// Handle a single control frame
    async fn handle_control_frame(&self, frame: Frame) -> Result<()> {
        let state = *self.handshake_state.read().await;

        match (state, frame.frame_type) {
            // Handshake: Hello
            (HandshakeState::AwaitingHello, FrameType::Hello) => {
                let hello = Hello::decode_frame(&frame)
                    .map_err(|e| DuetError::protocol(format!("Invalid Hello: {}", e)))?;

                debug!(
                    "Received Hello v{} with caps: {:?}",
                    hello.version, hello.capabilities
                );

                let hello_ack = HelloAck {
                    version: 1,
                    connection_id: self.connection_id.clone(),
                };
                self.send_control_frame(&hello_ack).await?;

                *self.handshake_state.write().await = HandshakeState::Ready;

                let _ = self.event_tx.send(ServerEvent::Connected {
                    connection_id: self.connection_id.clone(),
                });
            }

            (HandshakeState::Ready, FrameType::Register) => {
                let register = Register::decode_frame(&frame)
                    .map_err(|e| DuetError::protocol(format!("Invalid Register: {}", e)))?;

                let _ = self.event_tx.send(ServerEvent::Register {
                    connection_id: self.connection_id.clone(),
                    register,
                });
            }

            (HandshakeState::Ready, FrameType::QueueJoin) => {
                let join = QueueJoin::decode_frame(&frame)
                    .map_err(|e| DuetError::protocol(format!("Invalid QueueJoin: {}", e)))?;

                let _ = self.event_tx.send(ServerEvent::QueueJoin {
                    connection_id: self.connection_id.clone(),
                    preference: join.preference,
                });
            }

            (HandshakeState::Ready, FrameType::QueueLeave) => {
                let _ = self.event_tx.send(ServerEvent::QueueLeave {
                    connection_id: self.connection_id.clone(),
                });
            }

            (HandshakeState::Ready, FrameType::QueueStatus) => {
                let _ = self.event_tx.send(ServerEvent::QueueStatus {
                    connection_id: self.connection_id.clone(),
                });
            }

            (HandshakeState::Ready, FrameType::ChatSend) => {
                let send = ChatSend::decode_frame(&frame)
                    .map_err(|e| DuetError::protocol(format!("Invalid ChatSend: {}", e)))?;

                let _ = self.event_tx.send(ServerEvent::ChatSend {
                    connection_id: self.connection_id.clone(),
                    content: send.content,
                });
            }

            (HandshakeState::Ready, FrameType::ChatLeave) => {
                let _ = self.event_tx.send(ServerEvent::ChatLeave {
                    connection_id: self.connection_id.clone(),
                });
            }

            (HandshakeState::Ready, FrameType::Logout) => {
                let _ = self.event_tx.send(ServerEvent::Logout {
                    connection_id: self.connection_id.clone(),
                });
            }

            (HandshakeState::Ready, FrameType::StatsRequest) => {
                let _ = self.event_tx.send(ServerEvent::StatsRequest {
                    connection_id: self.connection_id.clone(),
                });
            }

            // Ping/Pong
            (HandshakeState::Ready, FrameType::Ping) => {
                let ping = Ping::decode_frame(&frame)
                    .map_err(|e| DuetError::protocol(format!("Invalid Ping: {}", e)))?;

                let pong = Pong {
                    timestamp: ping.timestamp,
                };
                self.send_control_frame(&pong).await?;
            }

            (HandshakeState::Ready, FrameType::Pong) => {
                let _pong = Pong::decode_frame(&frame)
                    .map_err(|e| DuetError::protocol(format!("Invalid Pong: {}", e)))?;
            }

            // Goodbye
            (_, FrameType::Goodbye) => {
                let goodbye = Goodbye::decode_frame(&frame)
                    .map_err(|e| DuetError::protocol(format!("Invalid Goodbye: {}", e)))?;

                info!("Client sent Goodbye: {}", goodbye.reason);
                self.connection.close(0u32.into(), goodbye.reason.as_bytes());
            }

            // Invalid state/frame combination
            (state, frame_type) => {
                warn!("Unexpected frame {:?} in state {:?}", frame_type, state);
                return Err(DuetError::protocol(format!(
                    "Unexpected frame {:?} in state {:?}",
                    frame_type, state
                )));
            }
        }

        Ok(())
    }

    /// Handle incoming datagrams (typing signals)
    async fn handle_datagrams_arc(self: &Arc<Self>) {
        loop {
            match self.connection.read_datagram().await {
                Ok(data) => {
                    self.touch().await;

                    if let Err(e) = self.handle_datagram(data).await {
                        warn!("Datagram handling error: {}", e);
                    }
                }
                Err(e) => {
                    debug!("Datagram receive ended: {}", e);
                    break;
                }
            }
        }
    }

    /// Handle a single datagram
    async fn handle_datagram(&self, data: Bytes) -> Result<()> {
        if !self.is_ready().await {
            return Ok(()); // Silently ignore datagrams before the handshake
        }

        let frame = Frame::decode_complete(&data)
            .map_err(|e| DuetError::protocol(format!("Invalid datagram frame: {}", e)))?;

        match frame.frame_type {
            FrameType::Typing => {
                let _typing = Typing::decode_frame(&frame)
                    .map_err(|e| DuetError::protocol(format!("Invalid Typing: {}", e)))?;

                let _ = self.event_tx.send(ServerEvent::Typing {
                    connection_id: self.connection_id.clone(),
                });
            }

            _ => {
                warn!("Unexpected datagram frame type: {:?}", frame.frame_type);
            }
        }

        Ok(())
    }

    /// Handle commands from the coordinator
    async fn handle_commands_arc(self: &Arc<Self>) {
        let rx = self.command_rx.write().await.take();
        let mut rx = match rx {
            Some(rx) => rx,
            None => return,
        };

        while let Some(cmd) = rx.recv().await {
            if let Err(e) = self.handle_command(cmd).await {
                warn!("Command handling error: {}", e);
            }
        }
    }

    /// Handle a single command
    async fn handle_command(&self, cmd: ConnectionCommand) -> Result<()> {
        match cmd {
            ConnectionCommand::SendFrame(frame) => {
                self.write_control_frame(frame).await?;
            }
            ConnectionCommand::SendDatagram(frame) => {
                let data = frame.encode_to_bytes();
                self.connection
                    .send_datagram(data)
                    .map_err(|e| DuetError::network(format!("Failed to send datagram: {}", e)))?;
            }
            ConnectionCommand::Close { reason } => {
                self.connection.close(0u32.into(), reason.as_bytes());
            }
        }

        Ok(())
    }

    /// Send a typed message on the control stream
    async fn send_control_frame<T: Encodable>(&self, msg: &T) -> Result<()> {
        let frame = msg
            .encode_frame()
            .map_err(|e| DuetError::serialization(format!("Failed to encode frame: {}", e)))?;
        self.write_control_frame(frame).await
    }

    /// Write an already-encoded frame on the control stream
    async fn write_control_frame(&self, frame: Frame) -> Result<()> {
        let mut control = self.control_send.write().await;
        if let Some(send) = control.as_mut() {
            let data = frame.encode_to_bytes();
            send.write_all(&data).await.map_err(|e| {
                DuetError::network(format!("Failed to write to control stream: {}", e))
            })?;
        } else {
            return Err(DuetError::connection("Control stream not open"));
        }

        Ok(())
    }

    /// Send an error frame
    async fn send_error(&self, error: DuetError) -> Result<()> {
        let err = Error::new(error.code(), error.message().to_string());
        self.send_control_frame(&err).await
    }

    /// Ping loop for keepalive
    async fn ping_loop_arc(self: &Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_secs(30));

        loop {
            interval.tick().await;

            if !self.is_ready().await {
                continue;
            }

            let ping = Ping {
                timestamp: current_timestamp(),
            };

            if let Err(e) = self.send_control_frame(&ping).await {
                warn!("Failed to send ping: {}", e);
                break;
            }
        }
    }
}
