//! # oauth-rpc
//!
//! Client (and a matching in-memory server) for a streaming OAuth token
//! lifecycle service spoken as newline-delimited JSON-RPC 2.0.
//!
//! ## Overview
//!
//! The service exposes four operations:
//!
//! - `oauth/authenticate`: a server-streaming call that reports progress and
//!   ends with an access/refresh token pair
//! - `oauth/introspect`: whether a token is currently active
//! - `oauth/userinfo`: the identity bound to a token
//! - `oauth/revoke`: invalidate a token
//!
//! [`LifecycleClient`] drives the full sequence against any
//! [`OAuthService`], typically an [`RpcChannel`] connected over TCP.
//!
//! ## Quick Example
//!
//! ```rust,no_run
//! use oauth_rpc::{LifecycleClient, Result, RpcChannel};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let channel = RpcChannel::connect_tcp("localhost:50051").await?;
//!     let client = LifecycleClient::new(channel);
//!
//!     let session = client.authenticate().await?;
//!     let report = client.run(session).await?;
//!     assert!(report.revocation_confirmed());
//!     Ok(())
//! }
//! ```

mod authority;
mod client;
mod codec;
mod config;
mod consumer;
mod error;
mod lifecycle;
mod server;
mod service;
mod session;
mod transport;

pub mod schema;
pub mod testutils;

pub use authority::{MemoryAuthority, TokenState};
pub use client::RpcChannel;
pub use codec::JsonRpcCodec;
pub use config::{AuthorityConfig, ClientConfig, ServerConfig, ADDR_ENV, DEFAULT_ADDR};
pub use consumer::consume;
pub use error::{Call, Error, ErrorKind, Result};
pub use lifecycle::{LifecycleClient, LifecycleReport};
pub use server::{Server, ServerHandle};
pub use service::{AuthStream, OAuthService};
pub use session::TokenSession;
pub use transport::{StreamTransport, TcpClientTransport, Transport, TransportStream};
