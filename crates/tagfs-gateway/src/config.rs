//! Gateway configuration.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default WebSocket listen address.
pub const DEFAULT_LISTEN: &str = "127.0.0.1:3001";

/// Per-client outbound queue capacity, in messages.
pub const DEFAULT_CLIENT_QUEUE: usize = 256;

/// Time a new TCP peer has to complete the WebSocket upgrade.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Fatal gateway conditions.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Backend unavailable: failed to start '{program}': {source}")]
    BackendUnavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Backend '{0}' did not expose piped stdio")]
    BackendStdio(String),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// The backend program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl BackendCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

impl fmt::Display for BackendCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Address to accept WebSocket connections on
    pub listen: String,
    /// Backend to spawn once at startup
    pub backend: BackendCommand,
    /// Messages buffered per client before broadcasts to it are skipped
    pub client_queue: usize,
    /// Peers that have not upgraded within this window are dropped
    pub handshake_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(backend: BackendCommand) -> Self {
        Self {
            listen: DEFAULT_LISTEN.to_string(),
            backend,
            client_queue: DEFAULT_CLIENT_QUEUE,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::new(BackendCommand::new("tagfs-store"));
        assert_eq!(config.listen, "127.0.0.1:3001");
        assert_eq!(config.client_queue, 256);
        assert_eq!(config.handshake_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_backend_display() {
        let cmd = BackendCommand::new("python3").arg("engine.py").arg("--quiet");
        assert_eq!(cmd.to_string(), "python3 engine.py --quiet");
    }
}
