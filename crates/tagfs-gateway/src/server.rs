//! WebSocket server for accepting client connections.
//!
//! Manages the connection registry and fan-out. Clients are anonymous: each
//! is known only by its connection ID, and every client receives every
//! broadcast.

use crate::config::GatewayError;
use crate::connection::{ClientConnection, ConnectionEvent};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::timeout;
use tokio_tungstenite::{WebSocketStream, accept_async};
use tracing::{debug, error, info, warn};

/// A peer whose WebSocket upgrade has completed.
type Upgraded = (WebSocketStream<TcpStream>, SocketAddr);

/// Event emitted by the server.
#[derive(Debug, PartialEq, Eq)]
pub enum ServerEvent {
    /// A client finished its handshake and was registered
    Connected { conn_id: String },
    /// A message from a connected client
    Message { conn_id: String, text: String },
    /// A client disconnected
    Disconnected { conn_id: String },
}

/// Outcome of a broadcast.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub skipped: usize,
}

/// WebSocket server managing client connections.
pub struct WebSocketServer {
    /// Connected clients indexed by connection ID
    clients: HashMap<String, ClientConnection>,
    /// Counter for generating connection IDs
    next_conn_id: u64,
    /// Outbound queue capacity for new connections
    queue_capacity: usize,
    /// Upgrade deadline for new peers
    handshake_timeout: Duration,
    /// Handshake tasks hand finished upgrades back through this channel
    upgraded_tx: mpsc::UnboundedSender<Upgraded>,
    upgraded_rx: mpsc::UnboundedReceiver<Upgraded>,
    /// Channel sender for connection events (messages, closes)
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    /// Channel receiver for connection events
    event_rx: mpsc::UnboundedReceiver<ConnectionEvent>,
}

impl WebSocketServer {
    /// Create a new WebSocket server.
    pub fn new(queue_capacity: usize, handshake_timeout: Duration) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (upgraded_tx, upgraded_rx) = mpsc::unbounded_channel();

        Self {
            clients: HashMap::new(),
            next_conn_id: 1,
            queue_capacity,
            handshake_timeout,
            upgraded_tx,
            upgraded_rx,
            event_tx,
            event_rx,
        }
    }

    /// Bind to an address and return the TCP listener.
    pub async fn bind(listen_addr: &str) -> Result<TcpListener, GatewayError> {
        let listener = TcpListener::bind(listen_addr)
            .await
            .map_err(|source| GatewayError::Bind {
                addr: listen_addr.to_string(),
                source,
            })?;
        info!("WebSocket server listening on {}", listen_addr);
        Ok(listener)
    }

    /// Handle a new incoming TCP connection.
    ///
    /// The WebSocket upgrade runs in its own task; once it completes the
    /// client is registered by `poll_event`, which reports `Connected`.
    /// Peers that fail or exceed the handshake timeout are dropped.
    pub fn accept_connection(&self, stream: TcpStream, addr: SocketAddr) {
        let upgraded_tx = self.upgraded_tx.clone();
        let deadline = self.handshake_timeout;

        tokio::spawn(async move {
            match timeout(deadline, accept_async(stream)).await {
                Ok(Ok(ws)) => {
                    let _ = upgraded_tx.send((ws, addr));
                }
                Ok(Err(e)) => {
                    // Health checks (like `nc -z`) connect and immediately close without
                    // completing the WebSocket handshake. Log these as debug, not error.
                    let err_str = e.to_string();
                    if err_str.contains("Handshake not finished")
                        || err_str.contains("Connection reset")
                        || err_str.contains("unexpected EOF")
                    {
                        debug!("Connection closed before handshake from {}", addr);
                    } else {
                        error!("WebSocket upgrade failed for {}: {}", addr, e);
                    }
                }
                Err(_) => {
                    warn!("Handshake from {} timed out after {:?}", addr, deadline);
                }
            }
        });
    }

    fn register(&mut self, ws_stream: WebSocketStream<TcpStream>, addr: SocketAddr) -> String {
        let conn_id = format!("conn-{}", self.next_conn_id);
        self.next_conn_id += 1;

        info!("New connection from {} (conn_id: {})", addr, conn_id);

        let conn = ClientConnection::new(
            conn_id.clone(),
            ws_stream,
            self.queue_capacity,
            self.event_tx.clone(),
        );
        self.clients.insert(conn_id.clone(), conn);
        conn_id
    }

    /// Wait for the next server event.
    ///
    /// Closed connections are removed from the registry before the
    /// `Disconnected` event is returned.
    pub async fn poll_event(&mut self) -> Option<ServerEvent> {
        let event = tokio::select! {
            Some((ws, addr)) = self.upgraded_rx.recv() => {
                let conn_id = self.register(ws, addr);
                return Some(ServerEvent::Connected { conn_id });
            }
            event = self.event_rx.recv() => event?,
        };

        match event {
            ConnectionEvent::Message { conn_id, text } => Some(ServerEvent::Message { conn_id, text }),
            ConnectionEvent::Closed { conn_id } => {
                if self.clients.remove(&conn_id).is_some() {
                    info!("Client disconnected: {} ({} remaining)", conn_id, self.clients.len());
                }
                Some(ServerEvent::Disconnected { conn_id })
            }
        }
    }

    /// Broadcast a message to all connected clients without waiting.
    ///
    /// Clients whose outbox is full or closed are skipped.
    pub fn broadcast(&self, text: &str) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for (conn_id, conn) in &self.clients {
            match conn.try_send(text.to_string()) {
                Ok(()) => report.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!("Outbox full for {}, skipping message", conn_id);
                    report.skipped += 1;
                }
                Err(TrySendError::Closed(_)) => {
                    warn!("Connection {} is closing, skipping message", conn_id);
                    report.skipped += 1;
                }
            }
        }
        report
    }

    /// Get the number of connected clients.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Close every connection.
    pub fn close_all(&mut self) {
        for (_, conn) in self.clients.drain() {
            conn.close();
        }
    }
}
