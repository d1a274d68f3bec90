//! Server-side modules for the pairing chat system

pub mod connection_handler;
pub mod coordinator;
pub mod matcher;
pub mod pair_server;
pub mod queues;
pub mod registry;
pub mod sessions;

pub use connection_handler::{ConnectionHandler, ServerEvent};
pub use coordinator::{ConnectionCommand, Coordinator, CoordinatorConfig};
pub use pair_server::{PairServer, ServerConfig, ServerStats};
