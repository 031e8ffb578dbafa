//! The relay loop tying clients to the backend.

use crate::backend::{Backend, BackendEvent};
use crate::config::GatewayConfig;
use crate::server::{ServerEvent, WebSocketServer};
use std::future::Future;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Counters reported when the gateway stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GatewayStats {
    pub requests: u64,
    pub responses: u64,
    pub skipped: u64,
}

/// Byte-transparent relay between WebSocket clients and one backend.
pub struct Gateway {
    server: WebSocketServer,
    backend: Backend,
    /// False once backend output has ended
    backend_alive: bool,
    stats: GatewayStats,
}

impl Gateway {
    pub fn new(config: &GatewayConfig, backend: Backend) -> Self {
        Self {
            server: WebSocketServer::new(config.client_queue, config.handshake_timeout),
            backend,
            backend_alive: true,
            stats: GatewayStats::default(),
        }
    }

    /// Serve until `shutdown` resolves.
    ///
    /// Backend exit is logged and the gateway keeps accepting clients; their
    /// requests are still written toward the dead backend and simply go
    /// unanswered.
    pub async fn run<F>(mut self, listener: TcpListener, shutdown: F) -> GatewayStats
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            self.server.accept_connection(stream, addr);
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }

                Some(event) = self.server.poll_event() => {
                    match event {
                        ServerEvent::Connected { conn_id } => {
                            debug!("Registered {} ({} connected)", conn_id, self.server.client_count());
                        }
                        ServerEvent::Message { conn_id, text } => {
                            debug!("Relaying {} bytes from {}", text.len(), conn_id);
                            self.stats.requests += 1;
                            self.backend.send(text);
                        }
                        ServerEvent::Disconnected { conn_id } => {
                            debug!("Removed {}", conn_id);
                        }
                    }
                }

                event = self.backend.recv(), if self.backend_alive => {
                    match event {
                        Some(BackendEvent::Line(line)) => {
                            self.stats.responses += 1;
                            let report = self.server.broadcast(&line);
                            self.stats.skipped += report.skipped as u64;
                            debug!("Broadcast to {} client(s), skipped {}", report.delivered, report.skipped);
                        }
                        Some(BackendEvent::Exited(code)) => {
                            match code {
                                Some(code) => error!("Backend exited with status {}", code),
                                None => error!("Backend exited"),
                            }
                            warn!("No further responses will be delivered");
                            self.backend_alive = false;
                        }
                        None => {
                            self.backend_alive = false;
                        }
                    }
                }

                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        info!(
            "Closing {} connection(s); relayed {} request(s), {} response(s)",
            self.server.client_count(),
            self.stats.requests,
            self.stats.responses
        );
        self.server.close_all();
        self.stats
    }
}
