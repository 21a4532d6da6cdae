//! End-to-end lifecycle runs over the JSON-RPC wire.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc,
};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use oauth_rpc::{
    schema::{
        methods, AuthProgress, IntrospectionResult, JSONRPCMessage, RevocationOutcome,
        StreamItem, UserInfo,
    },
    testutils::{
        connected_channel, init_tracing, instant_authority, make_duplex_pair, shutdown,
        stream_of,
    },
    AuthStream, Call, Error, ErrorKind, LifecycleClient, OAuthService, Result, RpcChannel,
    Server, StreamTransport, TokenSession, TokenState, Transport,
};

/// Serves a fixed authentication script and tracks revocation of "A1".
#[derive(Default)]
struct ScriptedAuthority {
    revoked: AtomicBool,
}

#[async_trait]
impl OAuthService for ScriptedAuthority {
    async fn authenticate(&self) -> Result<AuthStream> {
        Ok(stream_of(vec![
            Ok(AuthProgress::progress("verifying credentials")),
            Ok(AuthProgress::issued("issuing tokens", "A1", "R1")),
        ]))
    }

    async fn introspect(&self, token: &str) -> Result<IntrospectionResult> {
        Ok(IntrospectionResult {
            active: token == "A1" && !self.revoked.load(Ordering::SeqCst),
        })
    }

    async fn user_info(&self, token: &str) -> Result<UserInfo> {
        if token != "A1" || self.revoked.load(Ordering::SeqCst) {
            return Err(Error::invalid_token("token is not active"));
        }
        Ok(UserInfo {
            info: r#"{"sub":"alice"}"#.to_string(),
        })
    }

    async fn revoke(&self, _token: &str) -> Result<RevocationOutcome> {
        self.revoked.store(true, Ordering::SeqCst);
        Ok(RevocationOutcome::default())
    }
}

/// Counts lifecycle calls made after authentication.
struct Counting<S> {
    inner: S,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl<S: OAuthService> OAuthService for Counting<S> {
    async fn authenticate(&self) -> Result<AuthStream> {
        self.inner.authenticate().await
    }

    async fn introspect(&self, token: &str) -> Result<IntrospectionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.introspect(token).await
    }

    async fn user_info(&self, token: &str) -> Result<UserInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.user_info(token).await
    }

    async fn revoke(&self, token: &str) -> Result<RevocationOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.revoke(token).await
    }
}

#[tokio::test]
async fn test_successful_lifecycle() {
    init_tracing();
    let (channel, server) = connected_channel(ScriptedAuthority::default())
        .await
        .unwrap();
    let client = LifecycleClient::new(channel);

    let mut seen = Vec::new();
    let session = client
        .authenticate_with(|p| seen.push(p.message().to_string()))
        .await
        .unwrap();
    assert_eq!(seen, ["verifying credentials", "issuing tokens"]);
    assert_eq!(session, TokenSession::new("A1", "R1"));

    let report = client.run(session).await.unwrap();
    assert!(report.before_revoke.active);
    assert_eq!(report.user_info.as_ref().unwrap().info, r#"{"sub":"alice"}"#);
    assert!(report.revocation.is_ok());
    assert!(!report.after_revoke.active);
    assert!(report.revocation_confirmed());

    shutdown(client.into_inner(), server).await;
}

#[tokio::test]
async fn test_rejected_user_info_continues_to_introspect() {
    let authority = Arc::new(instant_authority(0));
    let (token, refresh) = authority.issue().await;
    authority.revoke(&token).await.unwrap();

    let (channel, server) = connected_channel(authority.clone()).await.unwrap();
    let client = LifecycleClient::new(channel);

    let report = client
        .run(TokenSession::new(token.clone(), refresh))
        .await
        .unwrap();

    assert!(!report.before_revoke.active);
    let err = report.user_info.as_ref().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidToken);
    assert!(matches!(err, Error::Call { call: Call::UserInfo, .. }));
    assert!(report.revocation.is_ok());
    assert!(!report.after_revoke.active);
    assert_eq!(authority.state(&token).await, Some(TokenState::Revoked));

    shutdown(client.into_inner(), server).await;
}

#[tokio::test]
async fn test_memory_authority_round_trip() {
    let authority = Arc::new(instant_authority(2));
    let (channel, server) = connected_channel(authority.clone()).await.unwrap();
    let client = LifecycleClient::new(channel);

    let mut seen = Vec::new();
    let session = client
        .authenticate_with(|p| seen.push(p.clone()))
        .await
        .unwrap();
    assert_eq!(seen.len(), 4);
    assert!(seen[3].is_terminal());
    assert!(!session.refresh_token().is_empty());

    let token = session.access_token().to_string();
    assert_eq!(authority.state(&token).await, Some(TokenState::Active));

    let report = client.run(session).await.unwrap();
    assert!(report.revocation_confirmed());
    assert!(report.user_info.unwrap().info.contains("admin"));
    assert_eq!(authority.state(&token).await, Some(TokenState::Revoked));

    shutdown(client.into_inner(), server).await;
}

#[tokio::test]
async fn test_introspect_twice_is_stable() {
    let authority = Arc::new(instant_authority(0));
    let (token, _) = authority.issue().await;
    let (channel, server) = connected_channel(authority).await.unwrap();
    let client = LifecycleClient::new(channel);

    let first = client.introspect(&token).await.unwrap();
    let second = client.introspect(&token).await.unwrap();
    assert!(first.active);
    assert_eq!(first, second);

    shutdown(client.into_inner(), server).await;
}

#[tokio::test]
async fn test_stream_dropped_midway_aborts_before_lifecycle() {
    let (server_end, client_end) = make_duplex_pair();
    let mut peer = Box::new(StreamTransport::new(server_end)).framed().unwrap();

    let peer_task = tokio::spawn(async move {
        let request = match peer.next().await {
            Some(Ok(JSONRPCMessage::Request(request))) => request,
            other => panic!("Expected request, got {other:?}"),
        };
        assert_eq!(request.request.method, methods::AUTHENTICATE);

        let item = StreamItem {
            request_id: request.id,
            item: serde_json::to_value(AuthProgress::progress("verifying credentials")).unwrap(),
        };
        peer.send(JSONRPCMessage::notification(
            methods::STREAM_ITEM,
            Some(serde_json::to_value(item).unwrap()),
        ))
        .await
        .unwrap();
        // Drop before the second message is sent
    });

    let calls = Arc::new(AtomicUsize::new(0));
    let channel = RpcChannel::connect_stream(client_end).await.unwrap();
    let client = LifecycleClient::new(Counting {
        inner: channel,
        calls: calls.clone(),
    });

    let mut seen = Vec::new();
    let err = client
        .authenticate_with(|p| seen.push(p.message().to_string()))
        .await
        .unwrap_err();
    assert!(err.is_transport(), "unexpected error: {err}");
    assert!(matches!(err, Error::Call { call: Call::Authenticate, token: None, .. }));
    assert_eq!(seen, ["verifying credentials"]);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    peer_task.await.unwrap();
}

#[tokio::test]
async fn test_execute_over_tcp() {
    let handle = Server::new(instant_authority(1))
        .serve_tcp("127.0.0.1:0")
        .await
        .unwrap();
    let addr = handle.local_addr().unwrap();

    let channel = RpcChannel::connect_tcp(addr.to_string()).await.unwrap();
    let client = LifecycleClient::new(channel);
    let report = client.execute().await.unwrap();
    assert!(report.before_revoke.active);
    assert!(report.revocation_confirmed());

    client.into_inner().close().await.unwrap();
    handle.stop().await.unwrap();
}
