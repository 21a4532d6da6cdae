//! In-memory token service that pairs with oauth_client.rs
//!
//! Usage:
//!   cargo run --example oauth_server                # listens on localhost:50051
//!   cargo run --example oauth_server -- --listen 127.0.0.1:7000 --pending-polls 0

use std::time::Duration;

use clap::Parser;
use oauth_rpc::{AuthorityConfig, MemoryAuthority, Result, Server, ServerConfig, DEFAULT_ADDR};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(short, long, default_value = DEFAULT_ADDR)]
    listen: String,

    /// Number of "Waiting for response..." messages before tokens are issued
    #[arg(long, default_value_t = 1)]
    pending_polls: u32,

    /// Delay between authentication progress messages
    #[arg(long, default_value_t = 5000)]
    poll_interval_ms: u64,

    /// Subject reported by userinfo
    #[arg(long, default_value = "admin")]
    subject: String,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = ServerConfig::new(args.listen).with_authority(
        AuthorityConfig::default()
            .with_pending_polls(args.pending_polls)
            .with_poll_interval(Duration::from_millis(args.poll_interval_ms))
            .with_subject(args.subject),
    );

    let handle = Server::new(MemoryAuthority::new(config.authority))
        .serve_tcp(&config.listen_addr)
        .await?;

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl-C");
    handle.stop().await
}
