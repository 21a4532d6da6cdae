use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{
    error::Result,
    schema::{AuthProgress, IntrospectionResult, RevocationOutcome, UserInfo},
};

/// A finite stream of authentication events ending with
/// [`AuthProgress::Issued`].
pub type AuthStream = BoxStream<'static, Result<AuthProgress>>;

/// The four operations of the token service.
///
/// The client talks to a remote implementation through
/// [`RpcChannel`](crate::RpcChannel); the [`Server`](crate::Server) exposes a
/// local implementation over the wire.
#[async_trait]
pub trait OAuthService: Send + Sync + 'static {
    /// Open the server-push authentication stream.
    async fn authenticate(&self) -> Result<AuthStream>;

    /// Report whether `token` is currently active. An inactive token is a
    /// result, not an error.
    async fn introspect(&self, token: &str) -> Result<IntrospectionResult>;

    /// Fetch the identity bound to an active `token`.
    async fn user_info(&self, token: &str) -> Result<UserInfo>;

    /// Revoke `token`. Revoking an already revoked token is acknowledged.
    async fn revoke(&self, token: &str) -> Result<RevocationOutcome>;
}

#[async_trait]
impl<S> OAuthService for std::sync::Arc<S>
where
    S: OAuthService + ?Sized,
{
    async fn authenticate(&self) -> Result<AuthStream> {
        (**self).authenticate().await
    }

    async fn introspect(&self, token: &str) -> Result<IntrospectionResult> {
        (**self).introspect(token).await
    }

    async fn user_info(&self, token: &str) -> Result<UserInfo> {
        (**self).user_info(token).await
    }

    async fn revoke(&self, token: &str) -> Result<RevocationOutcome> {
        (**self).revoke(token).await
    }
}
