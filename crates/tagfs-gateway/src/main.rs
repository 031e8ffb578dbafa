//! tagfs-gateway: WebSocket relay in front of a line-oriented record store.
//!
//! Spawns the backend once, then fans its output out to every connected
//! client.

use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tagfs_gateway::{
    Backend, BackendCommand, DEFAULT_CLIENT_QUEUE, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_LISTEN,
    Gateway, GatewayConfig, WebSocketServer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tagfs-gateway")]
#[command(about = "WebSocket gateway for a tagged record store")]
struct Args {
    /// Address to listen on for client connections
    #[arg(short, long, env = "TAGFS_LISTEN", default_value = DEFAULT_LISTEN)]
    listen: String,

    /// Backend program to spawn
    #[arg(short, long, env = "TAGFS_BACKEND")]
    backend: String,

    /// Arguments passed to the backend program
    #[arg(last = true)]
    backend_args: Vec<String>,

    /// Messages buffered per client before broadcasts to it are skipped
    #[arg(long, env = "TAGFS_CLIENT_QUEUE", default_value_t = DEFAULT_CLIENT_QUEUE)]
    client_queue: usize,

    /// Seconds a new connection has to complete the WebSocket handshake
    #[arg(long, env = "TAGFS_HANDSHAKE_TIMEOUT", default_value_t = DEFAULT_HANDSHAKE_TIMEOUT.as_secs())]
    handshake_timeout: u64,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> GatewayConfig {
        GatewayConfig {
            listen: self.listen,
            backend: BackendCommand {
                program: self.backend,
                args: self.backend_args,
            },
            client_queue: self.client_queue,
            handshake_timeout: Duration::from_secs(self.handshake_timeout),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,tagfs_gateway=debug"
    } else {
        "info,tagfs_gateway=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = args.into_config();
    info!("Starting tagfs-gateway");
    info!("Backend: {}", config.backend);

    // Backend first: no client is accepted unless it started
    let backend = Backend::spawn(&config.backend)?;
    let listener = WebSocketServer::bind(&config.listen).await?;

    info!("Gateway running. Press Ctrl+C to stop.");
    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    let stats = Gateway::new(&config, backend).run(listener, shutdown).await;

    info!("Shutting down ({} broadcast(s) skipped)", stats.skipped);
    Ok(())
}
