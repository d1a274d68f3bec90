//! QUIC pairing chat client
//!
//! Connects to the pairing server, drives the Hello handshake, and exposes
//! the protocol as typed commands and a stream of [`ClientEvent`]s.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quinn::{ClientConfig as QuinnClientConfig, Connection, Endpoint, RecvStream, SendStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::error::{DuetError, Result};
use crate::protocol::codec::{Decodable, DecodedMessage, Encodable};
use crate::protocol::frame::{Frame, FrameCodec};
use crate::protocol::messages::*;

/// Pairing client configuration
#[derive(Clone, Debug)]
pub struct DuetClientConfig {
    /// Server address to connect to
    pub server_addr: SocketAddr,
    /// Client bind address (use 0.0.0.0:0 for auto)
    pub bind_addr: SocketAddr,
    /// Connection timeout in seconds
    pub connect_timeout_secs: u64,
}

impl Default for DuetClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:4433".parse().expect("valid default address"),
            bind_addr: "0.0.0.0:0".parse().expect("valid default address"),
            connect_timeout_secs: 10,
        }
    }
}

/// Events that the client can receive
#[derive(Debug, Clone)]
pub enum ClientEvent {
    /// Handshake completed, the server assigned this connection ID
    Connected { connection_id: ConnectionId },
    /// Disconnected from server
    Disconnected(String),
    /// Registration accepted
    Registered(ProfileInfo),
    /// Registration rejected
    RegistrationFailed { code: u32, message: String },
    /// Placed in a queue
    QueueJoined(QueueJoined),
    /// Left the queue
    QueueLeft,
    /// Queue position report
    QueueStatus(QueueStatusInfo),
    /// A partner was found
    MatchFound(MatchFound),
    /// A chat message arrived (own messages echo back too)
    MessageReceived(SessionMessage),
    /// Left the chat
    ChatLeft,
    /// The partner is gone
    PartnerLeft(PartnerLeft),
    /// The partner is typing
    PartnerTyping(PartnerTyping),
    /// Platform-wide counts
    Stats(StatsInfo),
    /// Logout acknowledged
    LoggedOut,
    /// Error from the server
    ServerError { code: u32, message: String },
}

/// QUIC pairing chat client
pub struct DuetClient {
    config: DuetClientConfig,
    connection: Option<Connection>,
    endpoint: Option<Endpoint>,
    control_send: Option<Arc<Mutex<SendStream>>>,
    connection_id: Option<ConnectionId>,
}

impl DuetClient {
    /// Create a new client with the given configuration
    pub fn new(config: DuetClientConfig) -> Self {
        Self {
            config,
            connection: None,
            endpoint: None,
            control_send: None,
            connection_id: None,
        }
    }

    /// Connect to the pairing server and complete the Hello handshake
    pub async fn connect(&mut self) -> Result<mpsc::UnboundedReceiver<ClientEvent>> {
        info!("Connecting to pairing server at {}", self.config.server_addr);

        let client_config = self.configure_client()?;

        let mut endpoint = Endpoint::client(self.config.bind_addr)
            .map_err(|e| DuetError::network(format!("Failed to create endpoint: {}", e)))?;
        endpoint.set_default_client_config(client_config);
        self.endpoint = Some(endpoint.clone());

        let connecting = endpoint
            .connect(self.config.server_addr, "localhost")
            .map_err(|e| DuetError::connection(format!("Failed to initiate connection: {}", e)))?;

        let connection = tokio::time::timeout(
            Duration::from_secs(self.config.connect_timeout_secs),
            connecting,
        )
        .await
        .map_err(|_| DuetError::timeout("Connection timeout"))?
        .map_err(|e| DuetError::connection(format!("Failed to connect: {}", e)))?;

        self.connection = Some(connection.clone());

        // Open the control stream and say hello
        let (mut send, mut recv) = connection.open_bi().await?;
        let hello = Hello::default();
        write_frame(&mut send, &hello).await?;

        // Wait for HelloAck before accepting commands
        let mut codec = FrameCodec::new();
        let ack = read_hello_ack(&mut recv, &mut codec).await?;
        info!("Handshake complete, connection id {}", ack.connection_id);
        self.connection_id = Some(ack.connection_id.clone());

        let control_send = Arc::new(Mutex::new(send));
        self.control_send = Some(Arc::clone(&control_send));

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let _ = event_tx.send(ClientEvent::Connected {
            connection_id: ack.connection_id,
        });

        self.start_control_receiver(recv, codec, Arc::clone(&control_send), event_tx.clone());
        self.start_datagram_receiver(connection, event_tx);

        Ok(event_rx)
    }

    /// Configure the QUIC client
    fn configure_client(&self) -> Result<QuinnClientConfig> {
        // Accepts the server's self-signed certificate. Development only.
        let mut crypto = rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCertificate))
            .with_no_client_auth();

        crypto.alpn_protocols = vec![b"duet".to_vec()];

        Ok(QuinnClientConfig::new(Arc::new(
            quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
                .map_err(|e| DuetError::config(format!("Failed to create QUIC config: {}", e)))?,
        )))
    }

    /// Spawn the control stream receiver task
    fn start_control_receiver(
        &self,
        mut recv: RecvStream,
        mut codec: FrameCodec,
        control_send: Arc<Mutex<SendStream>>,
        event_tx: mpsc::UnboundedSender<ClientEvent>,
    ) {
        tokio::spawn(async move {
            let mut buf = vec![0u8; 4096];
            loop {
                match recv.read(&mut buf).await {
                    Ok(Some(n)) => {
                        codec.feed(&buf[..n]);
                        loop {
                            match codec.decode_next() {
                                Ok(Some(frame)) => {
                                    handle_server_frame(frame, &control_send, &event_tx).await;
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    error!("Frame decode error: {}", e);
                                    let _ = event_tx.send(ClientEvent::Disconnected(format!(
                                        "Protocol error: {}",
                                        e
                                    )));
                                    return;
                                }
                            }
                        }
                    }
                    Ok(None) => {
                        let _ = event_tx
                            .send(ClientEvent::Disconnected("Server closed stream".to_string()));
                        break;
                    }
                    Err(e) => {
                        let _ = event_tx
                            .send(ClientEvent::Disconnected(format!("Connection lost: {}", e)));
                        break;
                    }
                }
            }
        });
    }

    /// Spawn the datagram receiver task (typing signals)
    fn start_datagram_receiver(
        &self,
        connection: Connection,
        event_tx: mpsc::UnboundedSender<ClientEvent>,
    ) {
        tokio::spawn(async move {
            loop {
                match connection.read_datagram().await {
                    Ok(data) => match Frame::decode_complete(&data) {
                        Ok(frame) => match PartnerTyping::decode_frame(&frame) {
                            Ok(typing) => {
                                let _ = event_tx.send(ClientEvent::PartnerTyping(typing));
                            }
                            Err(e) => debug!("Ignoring unexpected datagram: {}", e),
                        },
                        Err(e) => debug!("Invalid datagram frame: {}", e),
                    },
                    Err(e) => {
                        debug!("Datagram receive ended: {}", e);
                        break;
                    }
                }
            }
        });
    }

    /// Register a profile with the server
    pub async fn register(
        &self,
        device_id: impl Into<String>,
        nickname: impl Into<String>,
        bio: Option<String>,
        gender: Gender,
    ) -> Result<()> {
        self.send(&Register {
            device_id: device_id.into(),
            nickname: nickname.into(),
            bio,
            gender,
        })
        .await
    }

    /// Join a preference queue
    pub async fn join_queue(&self, preference: Preference) -> Result<()> {
        self.send(&QueueJoin { preference }).await
    }

    /// Leave the queue
    pub async fn leave_queue(&self) -> Result<()> {
        self.send(&QueueLeave {}).await
    }

    /// Ask for the current queue position
    pub async fn queue_status(&self) -> Result<()> {
        self.send(&QueueStatus {}).await
    }

    /// Send a chat message to the current partner
    pub async fn send_message(&self, content: impl Into<String>) -> Result<()> {
        self.send(&ChatSend {
            content: content.into(),
        })
        .await
    }

    /// Signal that the user is typing (unreliable, best effort)
    pub fn send_typing(&self) -> Result<()> {
        let connection = self
            .connection
            .as_ref()
            .ok_or_else(|| DuetError::connection("Not connected to server"))?;

        let frame = Typing::default()
            .encode_frame()
            .map_err(|e| DuetError::serialization(format!("Failed to encode frame: {}", e)))?;
        connection
            .send_datagram(frame.encode_to_bytes())
            .map_err(|e| DuetError::network(format!("Failed to send datagram: {}", e)))?;
        Ok(())
    }

    /// Leave the current chat session
    pub async fn leave_chat(&self) -> Result<()> {
        self.send(&ChatLeave {}).await
    }

    /// Log out, releasing the nickname and profile
    pub async fn logout(&self) -> Result<()> {
        self.send(&Logout {}).await
    }

    /// Request platform-wide counts
    pub async fn request_stats(&self) -> Result<()> {
        self.send(&StatsRequest {}).await
    }

    /// Disconnect from the server
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(send) = self.control_send.take() {
            let mut send = send.lock().await;
            let _ = write_frame(
                &mut send,
                &Goodbye {
                    reason: "client disconnect".to_string(),
                },
            )
            .await;
        }

        if let Some(connection) = self.connection.take() {
            connection.close(0u32.into(), b"Client disconnect");
            info!("Disconnected from pairing server");
        }

        if let Some(endpoint) = self.endpoint.take() {
            endpoint.close(0u32.into(), b"Client shutdown");
        }

        self.connection_id = None;
        Ok(())
    }

    /// The server-assigned connection ID, once connected
    pub fn connection_id(&self) -> Option<&ConnectionId> {
        self.connection_id.as_ref()
    }

    /// Check if connected to server
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Send a typed message on the control stream
    async fn send<T: Encodable>(&self, msg: &T) -> Result<()> {
        let send = self
            .control_send
            .as_ref()
            .ok_or_else(|| DuetError::connection("Not connected to server"))?;

        let mut send = send.lock().await;
        write_frame(&mut send, msg).await
    }
}

/// Translate one server frame into a client event, answering pings inline
async fn handle_server_frame(
    frame: Frame,
    control_send: &Arc<Mutex<SendStream>>,
    event_tx: &mpsc::UnboundedSender<ClientEvent>,
) {
    let decoded = match DecodedMessage::decode(&frame) {
        Ok(decoded) => decoded,
        Err(e) => {
            warn!("Failed to decode server frame: {}", e);
            return;
        }
    };

    let event = match decoded {
        DecodedMessage::RegisterOk(ok) => ClientEvent::Registered(ok.profile),
        DecodedMessage::RegisterFailed(failed) => ClientEvent::RegistrationFailed {
            code: failed.code,
            message: failed.message,
        },
        DecodedMessage::QueueJoined(joined) => ClientEvent::QueueJoined(joined),
        DecodedMessage::QueueLeft(_) => ClientEvent::QueueLeft,
        DecodedMessage::QueueStatusInfo(status) => ClientEvent::QueueStatus(status),
        DecodedMessage::MatchFound(found) => ClientEvent::MatchFound(found),
        DecodedMessage::SessionMessage(msg) => ClientEvent::MessageReceived(msg),
        DecodedMessage::ChatLeft(_) => ClientEvent::ChatLeft,
        DecodedMessage::PartnerLeft(left) => ClientEvent::PartnerLeft(left),
        DecodedMessage::PartnerTyping(typing) => ClientEvent::PartnerTyping(typing),
        DecodedMessage::StatsInfo(stats) => ClientEvent::Stats(stats),
        DecodedMessage::LogoutOk(_) => ClientEvent::LoggedOut,
        DecodedMessage::Error(err) => ClientEvent::ServerError {
            code: err.code,
            message: err.message,
        },
        DecodedMessage::Goodbye(bye) => ClientEvent::Disconnected(bye.reason),
        DecodedMessage::Ping(ping) => {
            // Answer keepalives without surfacing them
            let mut send = control_send.lock().await;
            if let Err(e) = write_frame(
                &mut send,
                &Pong {
                    timestamp: ping.timestamp,
                },
            )
            .await
            {
                warn!("Failed to answer ping: {}", e);
            }
            return;
        }
        DecodedMessage::Pong(_) => return,
        other => {
            warn!("Unexpected frame from server: {:?}", other.frame_type());
            return;
        }
    };

    let _ = event_tx.send(event);
}

/// Encode and write one frame to a stream
async fn write_frame<T: Encodable>(send: &mut SendStream, msg: &T) -> Result<()> {
    let frame = msg
        .encode_frame()
        .map_err(|e| DuetError::serialization(format!("Failed to encode frame: {}", e)))?;
    send.write_all(&frame.encode_to_bytes()).await?;
    Ok(())
}

/// Read from the stream until a HelloAck frame arrives
async fn read_hello_ack(recv: &mut RecvStream, codec: &mut FrameCodec) -> Result<HelloAck> {
    let mut buf = vec![0u8; 4096];
    loop {
        if let Some(frame) = codec
            .decode_next()
            .map_err(|e| DuetError::protocol(format!("Frame decode error: {}", e)))?
        {
            return HelloAck::decode_frame(&frame)
                .map_err(|e| DuetError::protocol(format!("Expected HelloAck: {}", e)));
        }

        match recv.read(&mut buf).await {
            Ok(Some(n)) => codec.feed(&buf[..n]),
            Ok(None) => {
                return Err(DuetError::connection("Server closed stream during handshake"))
            }
            Err(e) => return Err(DuetError::network(format!("Handshake read error: {}", e))),
        }
    }
}

/// Custom certificate verifier that accepts any certificate (INSECURE - for development only)
#[derive(Debug)]
struct AcceptAnyCertificate;

impl rustls::client::danger::ServerCertVerifier for AcceptAnyCertificate {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA1,
            rustls::SignatureScheme::ECDSA_SHA1_Legacy,
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::ED448,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_default() {
        let config = DuetClientConfig::default();
        assert_eq!(config.server_addr.port(), 4433);
        assert_eq!(config.bind_addr.port(), 0);
        assert_eq!(config.connect_timeout_secs, 10);
    }

    #[test]
    fn test_client_creation() {
        let config = DuetClientConfig::default();
        let client = DuetClient::new(config.clone());

        assert_eq!(client.config.server_addr, config.server_addr);
        assert!(client.connection.is_none());
        assert!(client.connection_id().is_none());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn test_client_disconnect() {
        let config = DuetClientConfig::default();
        let mut client = DuetClient::new(config);

        // Disconnect when not connected is a no-op
        assert!(client.disconnect().await.is_ok());
        assert!(!client.is_connected());
    }
}
