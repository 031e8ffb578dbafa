//! tagfs-store: Reference Record Store speaking the line protocol on stdio.
//!
//! Stdout carries protocol responses only; all logging goes to stderr.

use anyhow::Result;
use clap::Parser;
use tagfs_store::{RecordStore, serve};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tagfs-store")]
#[command(about = "In-memory tagged record store (stdin/stdout)")]
struct Args {
    /// Enable verbose logging
    #[arg(long, env = "TAGFS_VERBOSE")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,tagfs_store=debug"
    } else {
        "info,tagfs_store=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("Starting tagfs-store");

    let mut store = RecordStore::new();
    let stdin = BufReader::new(tokio::io::stdin());
    serve(&mut store, stdin, tokio::io::stdout()).await?;

    info!("Shutting down");
    Ok(())
}
