//! tagfs-gateway library: Exposes the relay components for testing.
//!
//! The gateway bridges any number of WebSocket clients to one backend
//! process speaking newline-delimited JSON on stdin/stdout. Every backend
//! line is broadcast to every client.

pub mod backend;
pub mod config;
pub mod connection;
pub mod gateway;
pub mod server;

// Re-export key types for convenience
pub use backend::{Backend, BackendEvent};
pub use config::{
    BackendCommand, DEFAULT_CLIENT_QUEUE, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_LISTEN, GatewayConfig,
    GatewayError,
};
pub use connection::{ClientConnection, ConnectionEvent};
pub use gateway::{Gateway, GatewayStats};
pub use server::{BroadcastReport, ServerEvent, WebSocketServer};
