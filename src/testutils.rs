//! Test utilities for `oauth_rpc`.
//!
//! Helpers shared by the unit tests and the integration tests under `tests/`:
//! in-memory duplex pipes, a channel wired to an in-process server, and
//! canned authentication streams. External test crates reach them through
//! `use oauth_rpc::testutils::*`.

use std::time::Duration;

use futures::{stream, StreamExt};
use tokio::io::{self, DuplexStream};

use crate::{
    authority::MemoryAuthority,
    client::RpcChannel,
    config::AuthorityConfig,
    error::Result,
    schema::AuthProgress,
    server::{Server, ServerHandle},
    service::{AuthStream, OAuthService},
};

/// Two ends of an in-memory pipe: the first for the server, the second for
/// the client.
pub fn make_duplex_pair() -> (DuplexStream, DuplexStream) {
    // 8 KiB is plenty for the small frames exchanged in tests
    let (server, client) = io::duplex(8 * 1024);
    (server, client)
}

/// Start `service` behind an in-memory server and return a channel
/// connected to it.
pub async fn connected_channel<S: OAuthService>(service: S) -> Result<(RpcChannel, ServerHandle)> {
    let (server_end, client_end) = make_duplex_pair();
    let handle = Server::new(service).serve_stream(server_end).await?;
    let channel = RpcChannel::connect_stream(client_end).await?;
    Ok((channel, handle))
}

/// An authority whose authentication stream completes without delays.
pub fn instant_authority(pending_polls: u32) -> MemoryAuthority {
    MemoryAuthority::new(
        AuthorityConfig::default()
            .with_pending_polls(pending_polls)
            .with_poll_interval(Duration::ZERO),
    )
}

/// A stream yielding `items` in order.
pub fn stream_of(items: Vec<Result<AuthProgress>>) -> AuthStream {
    stream::iter(items).boxed()
}

/// Close the channel first so the server sees the disconnect, then stop the
/// server with a short timeout.
pub async fn shutdown(channel: RpcChannel, server: ServerHandle) {
    let _ = channel.close().await;
    let _ = tokio::time::timeout(Duration::from_millis(100), server.stop()).await;
}

/// Route tracing output through the test harness. Safe to call from every
/// test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
