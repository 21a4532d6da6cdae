use std::collections::HashMap;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use async_trait::async_trait;
use futures::{
    channel::mpsc as stream_mpsc,
    stream::{SplitSink, SplitStream},
    SinkExt, StreamExt,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{oneshot, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    error::{Error, Result},
    schema::{
        methods, AuthProgress, IntrospectionResult, JSONRPCMessage, RequestId, RevocationOutcome,
        StreamItem, TokenParams, UserInfo,
    },
    service::{AuthStream, OAuthService},
    transport::{StreamTransport, TcpClientTransport, Transport, TransportStream},
};

type FrameSink = SplitSink<Box<dyn TransportStream>, JSONRPCMessage>;

/// Where the reply to an outstanding request goes.
enum Pending {
    Unary(oneshot::Sender<Result<Value>>),
    Stream(stream_mpsc::UnboundedSender<Result<Value>>),
}

/// Why the reader stopped. Every later call fails with the matching error.
#[derive(Debug, Clone)]
enum Closed {
    Eof,
    Transport(String),
    Malformed(String),
}

impl Closed {
    fn to_error(&self) -> Error {
        match self {
            Closed::Eof => Error::ConnectionClosed,
            Closed::Transport(reason) => Error::Transport(reason.clone()),
            Closed::Malformed(reason) => Error::ProtocolViolation(reason.clone()),
        }
    }
}

#[derive(Default)]
struct Inflight {
    requests: HashMap<RequestId, Pending>,
    closed: Option<Closed>,
}

type PendingMap = Arc<Mutex<Inflight>>;

impl Inflight {
    /// Latch the connection as closed and fail every outstanding request.
    /// The first recorded reason wins.
    fn shut_down(&mut self, reason: Closed) {
        let closed = self.closed.get_or_insert(reason).clone();
        if !self.requests.is_empty() {
            debug!("Failing {} outstanding requests", self.requests.len());
        }
        for (_, entry) in self.requests.drain() {
            match entry {
                Pending::Unary(tx) => {
                    let _ = tx.send(Err(closed.to_error()));
                }
                Pending::Stream(tx) => {
                    let _ = tx.unbounded_send(Err(closed.to_error()));
                }
            }
        }
    }
}

/// Client side of the token service wire protocol.
///
/// Requests are correlated with their replies by id. A background task reads
/// incoming frames and routes them; once the connection is gone every
/// outstanding and future call fails with a transport error.
pub struct RpcChannel {
    sink: Mutex<FrameSink>,
    pending: PendingMap,
    next_request_id: AtomicU64,
    reader: JoinHandle<()>,
}

impl RpcChannel {
    /// Connect using the provided transport
    pub async fn connect(mut transport: Box<dyn Transport>) -> Result<Self> {
        transport.connect().await?;
        let stream = transport.framed()?;
        let (sink, stream) = stream.split();

        let pending: PendingMap = Arc::default();
        let reader = tokio::spawn(read_loop(stream, pending.clone()));

        info!("RPC channel connected");
        Ok(Self {
            sink: Mutex::new(sink),
            pending,
            next_request_id: AtomicU64::new(1),
            reader,
        })
    }

    pub async fn connect_tcp(addr: impl Into<String>) -> Result<Self> {
        Self::connect(Box::new(TcpClientTransport::new(addr))).await
    }

    /// Connect over an already established byte stream.
    pub async fn connect_stream<S>(stream: S) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + Sync + Unpin + 'static,
    {
        Self::connect(Box::new(StreamTransport::new(stream))).await
    }

    /// Flush and close the outgoing half, then stop the reader. Calls still
    /// in flight, including open authentication streams, fail with
    /// [`Error::ConnectionClosed`].
    pub async fn close(self) -> Result<()> {
        let result = self.sink.lock().await.close().await;
        self.reader.abort();
        self.pending.lock().await.shut_down(Closed::Eof);
        result
    }

    fn next_request_id(&self) -> RequestId {
        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        RequestId::String(format!("req-{id}"))
    }

    async fn send_request(
        &self,
        id: RequestId,
        method: &str,
        params: Option<Value>,
        pending: Pending,
    ) -> Result<()> {
        {
            let mut inflight = self.pending.lock().await;
            if let Some(closed) = &inflight.closed {
                return Err(closed.to_error());
            }
            inflight.requests.insert(id.clone(), pending);
        }

        let message = JSONRPCMessage::request(id.clone(), method, params);
        if let Err(e) = self.sink.lock().await.send(message).await {
            self.pending.lock().await.requests.remove(&id);
            return Err(e);
        }
        Ok(())
    }

    /// Send a request and wait for its response
    async fn request<P, R>(&self, method: &str, params: &P) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_request_id();
        let (tx, rx) = oneshot::channel();
        let params = serde_json::to_value(params)?;

        debug!("Sending {} request {}", method, id);
        self.send_request(id, method, Some(params), Pending::Unary(tx))
            .await?;

        let value = rx.await.map_err(|_| Error::ConnectionClosed)??;
        decode_payload(method, value)
    }
}

#[async_trait]
impl OAuthService for RpcChannel {
    async fn authenticate(&self) -> Result<AuthStream> {
        let id = self.next_request_id();
        let (tx, rx) = stream_mpsc::unbounded();

        debug!("Opening authentication stream {}", id);
        self.send_request(id, methods::AUTHENTICATE, None, Pending::Stream(tx))
            .await?;

        let stream = rx.map(|item| {
            item.and_then(|value| decode_payload::<AuthProgress>(methods::AUTHENTICATE, value))
        });
        Ok(stream.boxed())
    }

    async fn introspect(&self, token: &str) -> Result<IntrospectionResult> {
        self.request(methods::INTROSPECT, &token_params(token)).await
    }

    async fn user_info(&self, token: &str) -> Result<UserInfo> {
        self.request(methods::USER_INFO, &token_params(token)).await
    }

    async fn revoke(&self, token: &str) -> Result<RevocationOutcome> {
        self.request(methods::REVOKE, &token_params(token)).await
    }
}

impl Drop for RpcChannel {
    fn drop(&mut self) {
        self.reader.abort();
        match self.pending.try_lock() {
            Ok(mut inflight) => inflight.shut_down(Closed::Eof),
            // The reader still holds the lock; finish the teardown once it lets go
            Err(_) => {
                if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                    let pending = self.pending.clone();
                    runtime.spawn(async move {
                        pending.lock().await.shut_down(Closed::Eof);
                    });
                }
            }
        }
    }
}

fn token_params(token: &str) -> TokenParams {
    TokenParams {
        token: token.to_string(),
    }
}

fn decode_payload<T: DeserializeOwned>(method: &str, value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| {
        Error::ProtocolViolation(format!("malformed {method} payload: {e}"))
    })
}

/// Route incoming frames to whoever is waiting for them.
async fn read_loop(mut stream: SplitStream<Box<dyn TransportStream>>, pending: PendingMap) {
    let closed = loop {
        match stream.next().await {
            Some(Ok(message)) => dispatch(message, &pending).await,
            Some(Err(e)) if e.is_transport() => {
                error!("Error reading frame: {}", e);
                break Closed::Transport(e.to_string());
            }
            Some(Err(e)) => {
                // The codec cannot resynchronise after a bad frame
                error!("Unreadable frame from server: {}", e);
                break Closed::Malformed(e.to_string());
            }
            None => {
                info!("Server closed the connection");
                break Closed::Eof;
            }
        }
    };

    pending.lock().await.shut_down(closed);
}


async fn dispatch(message: JSONRPCMessage, pending: &PendingMap) {
    match message {
        JSONRPCMessage::Response(response) => {
            match pending.lock().await.requests.remove(&response.id) {
                Some(Pending::Unary(tx)) => {
                    let _ = tx.send(Ok(response.result));
                }
                // Dropping the sender ends the stream
                Some(Pending::Stream(_)) => debug!("Stream {} completed", response.id),
                None => warn!("Response for unknown request {}", response.id),
            }
        }
        JSONRPCMessage::Error(error) => {
            let err = Error::from_error_object(error.error);
            match pending.lock().await.requests.remove(&error.id) {
                Some(Pending::Unary(tx)) => {
                    let _ = tx.send(Err(err));
                }
                Some(Pending::Stream(tx)) => {
                    let _ = tx.unbounded_send(Err(err));
                }
                None => warn!("Error for unknown request {}: {}", error.id, err),
            }
        }
        JSONRPCMessage::Notification(notification)
            if notification.notification.method == methods::STREAM_ITEM =>
        {
            let item = notification
                .notification
                .params
                .map(serde_json::from_value::<StreamItem>);
            match item {
                Some(Ok(item)) => match pending.lock().await.requests.get(&item.request_id) {
                    Some(Pending::Stream(tx)) => {
                        let _ = tx.unbounded_send(Ok(item.item));
                    }
                    _ => warn!("Stream item for unknown stream {}", item.request_id),
                },
                _ => warn!("Malformed stream item notification"),
            }
        }
        JSONRPCMessage::Notification(notification) => {
            debug!(
                "Ignoring notification: {}",
                notification.notification.method
            );
        }
        JSONRPCMessage::Request(request) => {
            warn!(
                "Client received unexpected request: {}",
                request.request.method
            );
        }
    }
}
