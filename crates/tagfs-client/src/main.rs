//! tagfs-client: Interactive console for a tagfs gateway.

use anyhow::Result;
use clap::Parser;
use std::time::Duration;
use tagfs_client::commands::HELP;
use tagfs_client::{
    ClientConfig, ClientSession, ConsoleCommand, DEFAULT_URL, ParseError, SessionEvent, render,
    transfer,
};
use tagfs_core::reconciler::{Intent, ReconcilerConfig, Update};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tagfs-client")]
#[command(about = "Console client for a tagged record store")]
struct Args {
    /// Gateway WebSocket URL
    #[arg(short, long, env = "TAGFS_URL", default_value = DEFAULT_URL)]
    url: String,

    /// Seconds of silence after a command before the backend is reported as unresponsive
    #[arg(long, env = "TAGFS_RESPONSE_TIMEOUT", default_value_t = 10)]
    response_timeout: u64,

    /// Do not attach correlation ids to requests
    #[arg(long)]
    no_correlation: bool,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,
}

/// Run one console command. Returns false when the console should exit.
async fn execute(session: &mut ClientSession, command: ConsoleCommand) -> Result<bool> {
    match command {
        ConsoleCommand::Refresh => session.apply(|r| r.refresh()).await?,
        ConsoleCommand::Tree => print!("{}", render::tree(&session.reconciler().tree())),
        ConsoleCommand::Read(path) => session.apply(|r| r.read(path)).await?,
        ConsoleCommand::Write { path, data } => session.apply(|r| r.write(path, data)).await?,
        ConsoleCommand::Delete(path) => session.apply(|r| r.delete(path)).await?,
        ConsoleCommand::DeleteFolder(path) => {
            let count = session.apply(|r| r.delete_folder(&path)).await?;
            println!("Deleting {count} record(s) under {path}");
        }
        ConsoleCommand::Tag { path, key } => session.apply(|r| r.tag(path, key)).await?,
        ConsoleCommand::Search(key) => session.apply(|r| r.search(key)).await?,
        ConsoleCommand::ClearSearch => session.apply(|r| r.clear_search()).await?,
        ConsoleCommand::Suggest(prefix) => session.apply(|r| r.suggest(prefix)).await?,
        ConsoleCommand::Upload(path) => {
            let files = transfer::collect_upload(&path)?;
            let count = session.apply(|r| r.upload(files)).await?;
            println!("Uploading {count} file(s)");
        }
        ConsoleCommand::Download(dir) => match session.reconciler().preview() {
            Some(preview) => {
                let target = transfer::save_preview(preview, &dir)?;
                println!("Saved {}", target.display());
            }
            None => println!("Nothing previewed; use 'read <path>' first"),
        },
        ConsoleCommand::Log => print!("{}", render::log(session.reconciler().log())),
        ConsoleCommand::Tags => {
            let tags: Vec<&str> = session.reconciler().catalog().iter().collect();
            println!("{}", tags.join(", "));
        }
        ConsoleCommand::Help => println!("{HELP}"),
        ConsoleCommand::Quit => return Ok(false),
    }
    Ok(true)
}

/// Print what an event changed.
fn show(session: &ClientSession, event: SessionEvent) {
    let reconciler = session.reconciler();
    match event {
        SessionEvent::Response(Update::Listing(Intent::Search)) => {
            println!("{} match(es)", reconciler.search_results().len());
            print!("{}", render::tree(&reconciler.tree()));
        }
        SessionEvent::Response(Update::Preview) => {
            if let Some(preview) = reconciler.preview() {
                println!("{}", render::preview(preview));
            }
        }
        SessionEvent::Response(Update::Suggestions) => {
            println!("Suggestions: {}", reconciler.suggestions().join(", "));
        }
        SessionEvent::Response(Update::Listing(Intent::Refresh) | Update::StaleListing(_)) => {}
        SessionEvent::Response(Update::Ack | Update::Malformed) | SessionEvent::Silence => {
            if let Some(entry) = reconciler.log().latest() {
                println!("{entry}");
            }
        }
        SessionEvent::RefreshIssued | SessionEvent::Closed => {}
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging - respects RUST_LOG env var, defaults to info (or debug with --verbose)
    let default_filter = if args.verbose {
        "debug,tagfs_client=debug,tagfs_core=debug"
    } else {
        "info,tagfs_client=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = ClientConfig {
        url: args.url,
        reconciler: ReconcilerConfig {
            response_timeout: Duration::from_secs(args.response_timeout),
            correlate_requests: !args.no_correlation,
            ..ReconcilerConfig::default()
        },
        ..ClientConfig::default()
    };

    let mut session = ClientSession::connect(config).await?;
    println!("Connected. Type 'help' for commands.");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match ConsoleCommand::parse(&line) {
                    Ok(command) => match execute(&mut session, command).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => println!("Error: {e}"),
                    },
                    Err(ParseError::Empty) => {}
                    Err(e) => println!("{e}"),
                }
            }

            event = session.poll() => {
                let event = event?;
                show(&session, event);
                if event == SessionEvent::Closed {
                    error!("Gateway closed the connection");
                    break;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
        }
    }

    session.close().await;
    Ok(())
}
