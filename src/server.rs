use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
    sync::{mpsc, oneshot},
    task::{JoinHandle, JoinSet},
};
use tracing::{debug, error, info, warn};

use crate::{
    error::{Error, Result},
    schema::{methods, JSONRPCMessage, JSONRPCRequest, RequestId, StreamItem, TokenParams},
    service::OAuthService,
    transport::{StreamTransport, Transport, TransportStream},
};

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Serves an [`OAuthService`] over the JSON-RPC wire protocol.
pub struct Server<S> {
    service: Arc<S>,
}

/// Handle to a running server. The server shuts down on
/// [`stop`](ServerHandle::stop) or when the handle is dropped.
pub struct ServerHandle {
    pub handle: JoinHandle<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    local_addr: Option<SocketAddr>,
}

impl<S: OAuthService> Server<S> {
    pub fn new(service: S) -> Self {
        Self::from_arc(Arc::new(service))
    }

    pub fn from_arc(service: Arc<S>) -> Self {
        Self { service }
    }

    /// Bind `addr` and serve every accepted connection until stopped.
    pub async fn serve_tcp(self, addr: &str) -> Result<ServerHandle> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Transport(format!("failed to bind {addr}: {e}")))?;
        let local_addr = listener.local_addr()?;
        info!("Starting server on {}", local_addr);

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let service = self.service;

        let handle = tokio::spawn(async move {
            let mut connections = JoinSet::new();
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, peer)) => {
                            info!("Accepted connection from {}", peer);
                            let _ = stream.set_nodelay(true);
                            let transport = Box::new(StreamTransport::new(stream));
                            connections.spawn(serve_transport(service.clone(), transport));
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            // Back off so a persistent error (e.g. EMFILE) does not spin
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                    },
                    // Reap finished connections so the set does not grow
                    Some(_) = connections.join_next(), if !connections.is_empty() => {}
                    _ = &mut shutdown_rx => {
                        info!("Shutting down...");
                        break;
                    }
                }
            }
            connections.shutdown().await;
            info!("Server stopped");
        });

        Ok(ServerHandle {
            handle,
            shutdown_tx: Some(shutdown_tx),
            local_addr: Some(local_addr),
        })
    }

    /// Serve a single already-established connection.
    pub async fn serve_stream<T>(self, stream: T) -> Result<ServerHandle>
    where
        T: AsyncRead + AsyncWrite + Send + Sync + Unpin + 'static,
    {
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let service = self.service;
        let transport = Box::new(StreamTransport::new(stream));

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = serve_transport(service, transport) => {}
                _ = shutdown_rx => info!("Shutting down..."),
            }
        });

        Ok(ServerHandle {
            handle,
            shutdown_tx: Some(shutdown_tx),
            local_addr: None,
        })
    }
}

impl ServerHandle {
    /// Address the TCP listener is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Stop accepting work, abort in-flight connections and wait for the
    /// server task to finish.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        match self.handle.await {
            Ok(()) => Ok(()),
            Err(e) if e.is_cancelled() => Ok(()),
            Err(e) => Err(Error::InternalError(format!("server task failed: {e}"))),
        }
    }
}

async fn serve_transport<S: OAuthService>(service: Arc<S>, mut transport: Box<dyn Transport>) {
    if let Err(e) = transport.connect().await {
        error!("Failed to set up connection: {}", e);
        return;
    }
    match transport.framed() {
        Ok(stream) => serve_connection(service, stream).await,
        Err(e) => error!("Failed to frame connection: {}", e),
    }
}

/// Read requests off one connection, handling each in its own task. All
/// outgoing frames go through a single writer so stream items and the final
/// response stay in order.
async fn serve_connection<S: OAuthService>(service: Arc<S>, stream: Box<dyn TransportStream>) {
    let (mut sink, mut frames) = stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<JSONRPCMessage>();

    let writer = tokio::spawn(async move {
        while let Some(message) = out_rx.recv().await {
            if let Err(e) = sink.send(message).await {
                error!("Error sending frame to client: {}", e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    let mut requests = JoinSet::new();
    while let Some(frame) = frames.next().await {
        match frame {
            Ok(JSONRPCMessage::Request(request)) => {
                requests.spawn(handle_request(service.clone(), request, out_tx.clone()));
            }
            Ok(JSONRPCMessage::Notification(notification)) => {
                debug!(
                    "Received notification: {}",
                    notification.notification.method
                );
            }
            Ok(other) => warn!("Server received unexpected message: {:?}", other),
            Err(e) => {
                error!("Error reading frame: {}", e);
                break;
            }
        }
    }
    info!("Client disconnected");

    // Requests already read still get their reply. Stopping the server drops
    // this future, which aborts them instead.
    while requests.join_next().await.is_some() {}
    drop(out_tx);
    let _ = writer.await;
}

async fn handle_request<S: OAuthService>(
    service: Arc<S>,
    request: JSONRPCRequest,
    out: mpsc::UnboundedSender<JSONRPCMessage>,
) {
    let id = request.id;
    let method = request.request.method;
    let params = request.request.params;
    debug!("Handling {} request {}", method, id);

    let reply = match method.as_str() {
        methods::AUTHENTICATE => to_reply(
            id.clone(),
            forward_stream(service.as_ref(), &id, &out)
                .await
                .map(|()| json!({})),
        ),
        methods::INTROSPECT => match token_param(params) {
            Ok(token) => to_reply(id, service.introspect(&token).await),
            Err(e) => to_reply::<()>(id, Err(e)),
        },
        methods::USER_INFO => match token_param(params) {
            Ok(token) => to_reply(id, service.user_info(&token).await),
            Err(e) => to_reply::<()>(id, Err(e)),
        },
        methods::REVOKE => match token_param(params) {
            Ok(token) => to_reply(id, service.revoke(&token).await),
            Err(e) => to_reply::<()>(id, Err(e)),
        },
        _ => to_reply::<()>(id, Err(Error::MethodNotFound(method.clone()))),
    };

    if out.send(reply).is_err() {
        debug!("Connection closed before {} reply was sent", method);
    }
}

/// Push every item of the authentication stream to the client as a
/// `stream/item` notification.
async fn forward_stream<S: OAuthService>(
    service: &S,
    id: &RequestId,
    out: &mpsc::UnboundedSender<JSONRPCMessage>,
) -> Result<()> {
    let mut stream = service.authenticate().await?;
    while let Some(item) = stream.next().await {
        let params = StreamItem {
            request_id: id.clone(),
            item: serde_json::to_value(item?)?,
        };
        let notification =
            JSONRPCMessage::notification(methods::STREAM_ITEM, Some(serde_json::to_value(params)?));
        out.send(notification).map_err(|_| Error::ConnectionClosed)?;
    }
    Ok(())
}

fn token_param(params: Option<Value>) -> Result<String> {
    let params = params.ok_or_else(|| Error::InvalidParams("missing token".to_string()))?;
    let params: TokenParams =
        serde_json::from_value(params).map_err(|e| Error::InvalidParams(e.to_string()))?;
    Ok(params.token)
}

fn to_reply<T: Serialize>(id: RequestId, result: Result<T>) -> JSONRPCMessage {
    let value = result.and_then(|value| serde_json::to_value(value).map_err(Error::from));
    match value {
        Ok(value) => JSONRPCMessage::response(id, value),
        Err(e) => {
            debug!("Request {} failed: {}", id, e);
            JSONRPCMessage::Error(e.to_jsonrpc_error(id))
        }
    }
}
