//! QUIC pairing chat server
//!
//! Accepts connections, runs a [`ConnectionHandler`] per client, and drives
//! every event through the shared [`Coordinator`].

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use quinn::Endpoint;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::error::{DuetError, Result};
use crate::protocol::messages::ConnectionId;
use crate::server::connection_handler::{ConnectionHandler, ServerEvent};
use crate::server::coordinator::{Coordinator, CoordinatorConfig};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,
    /// Maximum concurrent connections
    pub max_connections: usize,
    /// Connection idle timeout
    pub idle_timeout: Duration,
    /// Coordinator limits
    pub coordinator: CoordinatorConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4433".parse().expect("valid default address"),
            max_connections: 10000,
            idle_timeout: Duration::from_secs(300),
            coordinator: CoordinatorConfig::default(),
        }
    }
}

/// QUIC pairing chat server
pub struct PairServer {
    /// Server configuration
    config: ServerConfig,
    /// QUIC endpoint
    endpoint: Option<Endpoint>,
    /// Shared coordinator state
    coordinator: Arc<Mutex<Coordinator>>,
}

impl PairServer {
    pub fn new(config: ServerConfig) -> Self {
        let coordinator = Coordinator::new(config.coordinator.clone());
        Self {
            config,
            endpoint: None,
            coordinator: Arc::new(Mutex::new(coordinator)),
        }
    }

    /// Create with default configuration
    pub fn with_defaults() -> Self {
        Self::new(ServerConfig::default())
    }

    /// Start the server
    pub async fn start(&mut self) -> Result<()> {
        info!("Starting pairing server on {}", self.config.bind_addr);

        // Generate self-signed certificate for development
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".into()])
            .map_err(|e| DuetError::config(format!("Failed to generate certificate: {}", e)))?;

        let cert_der = CertificateDer::from(
            cert.serialize_der()
                .map_err(|e| DuetError::config(format!("Failed to serialize cert: {}", e)))?,
        );
        let key_der =
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(cert.serialize_private_key_der()));

        // Configure rustls
        let mut server_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der)
            .map_err(|e| DuetError::config(format!("Failed to configure TLS: {}", e)))?;

        server_config.alpn_protocols = vec![b"duet".to_vec()];
        server_config.max_early_data_size = 0;

        // Configure QUIC
        let mut transport_config = quinn::TransportConfig::default();
        transport_config.max_concurrent_bidi_streams(8u32.into());
        transport_config.max_idle_timeout(Some(
            self.config
                .idle_timeout
                .try_into()
                .map_err(|_| DuetError::config("idle timeout out of range"))?,
        ));
        transport_config.datagram_receive_buffer_size(Some(65536));

        let mut quic_server_config = quinn::ServerConfig::with_crypto(Arc::new(
            quinn::crypto::rustls::QuicServerConfig::try_from(server_config)
                .map_err(|e| DuetError::config(format!("Failed to create QUIC config: {}", e)))?,
        ));
        quic_server_config.transport_config(Arc::new(transport_config));

        // Create endpoint
        let endpoint = Endpoint::server(quic_server_config, self.config.bind_addr)
            .map_err(|e| DuetError::network(format!("Failed to create endpoint: {}", e)))?;

        info!("Server listening on {}", endpoint.local_addr()?);

        self.endpoint = Some(endpoint.clone());

        // Accept connections
        self.accept_connections(endpoint).await
    }

    /// Accept incoming connections
    async fn accept_connections(&self, endpoint: Endpoint) -> Result<()> {
        loop {
            match endpoint.accept().await {
                Some(incoming) => {
                    // Check connection limit
                    {
                        let coordinator = self.coordinator.lock().await;
                        if coordinator.connection_count() >= self.config.max_connections {
                            warn!("Connection limit reached, rejecting connection");
                            incoming.refuse();
                            continue;
                        }
                    }

                    // Spawn connection handler
                    let server = self.clone_ref();
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_incoming(incoming).await {
                            error!("Connection handling failed: {}", e);
                        }
                    });
                }
                None => {
                    warn!("Endpoint stopped accepting connections");
                    break;
                }
            }
        }
        Ok(())
    }

    /// Handle an incoming connection
    async fn handle_incoming(&self, incoming: quinn::Incoming) -> Result<()> {
        let connection = incoming.await?;
        let remote_addr = connection.remote_address();
        let conn_id: ConnectionId = uuid::Uuid::new_v4().to_string();

        debug!("New connection {} from {}", conn_id, remote_addr);

        // Create channels for this connection
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        // Attach to the coordinator so it can reach this connection
        {
            let mut coordinator = self.coordinator.lock().await;
            coordinator.attach(&conn_id, command_tx);
        }

        // Create connection handler
        let handler = Arc::new(ConnectionHandler::new(
            connection,
            conn_id.clone(),
            event_tx,
            command_rx,
        ));

        // Spawn handler task
        let handler_clone = Arc::clone(&handler);
        let handler_task = tokio::spawn(async move { handler_clone.run().await });

        // Spawn event processor task
        let server = self.clone_ref();
        let event_task = tokio::spawn(async move {
            server.process_events(event_rx).await;
        });

        // Wait for either task to complete
        tokio::select! {
            result = handler_task => {
                if let Err(e) = result {
                    error!("Handler task error: {}", e);
                }
            }
            _ = event_task => {}
        }

        // Clean up connection
        {
            let mut coordinator = self.coordinator.lock().await;
            coordinator.disconnect(&conn_id);
        }
        debug!("Cleaned up connection {}", conn_id);

        Ok(())
    }

    /// Process events from a connection
    async fn process_events(&self, mut event_rx: mpsc::UnboundedReceiver<ServerEvent>) {
        while let Some(event) = event_rx.recv().await {
            self.handle_event(event).await;
        }
    }

    /// Handle a single event from a connection
    async fn handle_event(&self, event: ServerEvent) {
        let mut coordinator = self.coordinator.lock().await;

        match event {
            ServerEvent::Connected { connection_id } => {
                debug!("Handshake complete for {}", connection_id);
            }

            ServerEvent::Register {
                connection_id,
                register,
            } => {
                // The coordinator already answered the client either way
                if let Err(e) = coordinator.register(&connection_id, register) {
                    debug!("Registration failed for {}: {}", connection_id, e);
                }
            }

            ServerEvent::QueueJoin {
                connection_id,
                preference,
            } => {
                coordinator.join_queue(&connection_id, preference);
            }

            ServerEvent::QueueLeave { connection_id } => {
                coordinator.leave_queue(&connection_id);
            }

            ServerEvent::QueueStatus { connection_id } => {
                coordinator.queue_status(&connection_id);
            }

            ServerEvent::ChatSend {
                connection_id,
                content,
            } => {
                coordinator.chat_send(&connection_id, content);
            }

            ServerEvent::ChatLeave { connection_id } => {
                coordinator.chat_leave(&connection_id);
            }

            ServerEvent::Logout { connection_id } => {
                coordinator.logout(&connection_id);
            }

            ServerEvent::StatsRequest { connection_id } => {
                coordinator.stats(&connection_id);
            }

            ServerEvent::Typing { connection_id } => {
                coordinator.relay_typing(&connection_id);
            }

            ServerEvent::Disconnected {
                connection_id,
                reason,
            } => {
                debug!("Connection {} disconnected: {}", connection_id, reason);
                coordinator.disconnect(&connection_id);
            }
        }
    }

    /// Get server statistics
    pub async fn get_stats(&self) -> ServerStats {
        let coordinator = self.coordinator.lock().await;
        ServerStats {
            total_connections: coordinator.connection_count(),
            registered_users: coordinator.registered_count(),
            waiting_users: coordinator.waiting_count(),
            active_sessions: coordinator.session_count(),
            bind_address: self.config.bind_addr,
        }
    }

    /// Shutdown the server
    pub async fn shutdown(&mut self) -> Result<()> {
        if let Some(endpoint) = self.endpoint.take() {
            {
                let mut coordinator = self.coordinator.lock().await;
                coordinator.close_all("Server shutdown");
            }

            endpoint.close(0u32.into(), b"Server shutdown");
            info!("Server shutdown complete");
        }
        Ok(())
    }

    /// Clone reference for spawning tasks
    fn clone_ref(&self) -> Arc<Self> {
        Arc::new(Self {
            config: self.config.clone(),
            endpoint: self.endpoint.clone(),
            coordinator: Arc::clone(&self.coordinator),
        })
    }
}

/// Server statistics
#[derive(Debug, Clone)]
pub struct ServerStats {
    pub total_connections: usize,
    pub registered_users: usize,
    pub waiting_users: usize,
    pub active_sessions: usize,
    pub bind_address: SocketAddr,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 4433);
        assert_eq!(config.max_connections, 10000);
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = PairServer::with_defaults();
        assert!(server.endpoint.is_none());
    }

    #[tokio::test]
    async fn test_server_stats() {
        let server = PairServer::with_defaults();
        let stats = server.get_stats().await;
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.registered_users, 0);
        assert_eq!(stats.active_sessions, 0);
    }
}
