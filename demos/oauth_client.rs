//! Run the full token lifecycle against a token service:
//! authenticate, introspect, fetch user info, revoke, introspect again.
//!
//! Usage:
//!   cargo run --example oauth_client                # $OAUTH_RPC_ADDR or localhost:50051
//!   cargo run --example oauth_client -- --addr 127.0.0.1:7000

use clap::Parser;
use oauth_rpc::{ClientConfig, LifecycleClient, Result, RpcChannel};
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address of the token service (overrides OAUTH_RPC_ADDR)
    #[arg(short, long)]
    addr: Option<String>,

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

    let mut config = ClientConfig::from_env();
    if let Some(addr) = args.addr {
        config = config.with_addr(addr);
    }

    let channel = RpcChannel::connect_tcp(config.addr).await?;
    let client = LifecycleClient::new(channel);
    let report = client.execute().await?;

    if let Err(e) = &report.user_info {
        warn!("User info was rejected: {}", e);
    }
    if let Err(e) = &report.revocation {
        warn!("Revocation was rejected: {}", e);
    }
    info!(
        "Lifecycle complete, revocation confirmed: {}",
        report.revocation_confirmed()
    );

    client.into_inner().close().await
}
