use tracing::{info, warn};

use crate::{
    consumer::consume,
    error::{Call, Error, ErrorKind, Result},
    schema::{AuthProgress, IntrospectionResult, RevocationOutcome, UserInfo},
    service::OAuthService,
    session::TokenSession,
};

/// Everything one lifecycle run observed.
#[derive(Debug)]
pub struct LifecycleReport {
    pub session: TokenSession,
    /// Introspection right after issuance.
    pub before_revoke: IntrospectionResult,
    /// A rejected token is reported here instead of aborting the run.
    pub user_info: Result<UserInfo>,
    pub revocation: Result<RevocationOutcome>,
    /// Introspection after the revocation completed.
    pub after_revoke: IntrospectionResult,
}

impl LifecycleReport {
    /// The token was active after issuance and inactive after revocation.
    pub fn revocation_confirmed(&self) -> bool {
        self.before_revoke.active && !self.after_revoke.active
    }
}

/// Drives authenticate → introspect → userinfo → revoke → introspect against
/// an [`OAuthService`].
pub struct LifecycleClient<S> {
    service: S,
}

impl<S: OAuthService> LifecycleClient<S> {
    pub fn new(service: S) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn into_inner(self) -> S {
        self.service
    }

    /// Open the authentication stream and drain it, logging each message.
    pub async fn authenticate(&self) -> Result<TokenSession> {
        self.authenticate_with(|progress| info!("{}", progress.message()))
            .await
    }

    /// Like [`authenticate`](Self::authenticate) with a caller-supplied
    /// progress sink.
    pub async fn authenticate_with<F>(&self, on_progress: F) -> Result<TokenSession>
    where
        F: FnMut(&AuthProgress),
    {
        let stream = self
            .service
            .authenticate()
            .await
            .map_err(|e| e.during(Call::Authenticate))?;
        consume(stream, on_progress)
            .await
            .map_err(|e| e.during(Call::Authenticate))
    }

    pub async fn introspect(&self, token: &str) -> Result<IntrospectionResult> {
        require_token(Call::Introspect, token)?;
        self.service
            .introspect(token)
            .await
            .map_err(|e| e.in_call(Call::Introspect, token))
    }

    pub async fn fetch_user_info(&self, token: &str) -> Result<UserInfo> {
        require_token(Call::UserInfo, token)?;
        self.service
            .user_info(token)
            .await
            .map_err(|e| e.in_call(Call::UserInfo, token))
    }

    pub async fn revoke(&self, token: &str) -> Result<RevocationOutcome> {
        require_token(Call::Revoke, token)?;
        self.service
            .revoke(token)
            .await
            .map_err(|e| e.in_call(Call::Revoke, token))
    }

    /// Run the four lifecycle calls in order against `session`.
    ///
    /// Token rejections from userinfo and revoke are recorded in the report
    /// and the run continues; any other failure aborts it.
    pub async fn run(&self, session: TokenSession) -> Result<LifecycleReport> {
        let token = session.access_token();

        let before_revoke = self.introspect(token).await?;
        info!(
            "Introspect successful. Token {} is {}",
            token,
            before_revoke.status()
        );

        let user_info = continue_on_rejection(self.fetch_user_info(token).await)?;
        if let Ok(info) = &user_info {
            info!("Received User Info: {}", info.info);
        }

        let revocation = continue_on_rejection(self.revoke(token).await)?;

        let after_revoke = self.introspect(token).await?;
        info!(
            "Token {} was revoked. Introspect says token is {}",
            token,
            after_revoke.status()
        );

        Ok(LifecycleReport {
            session,
            before_revoke,
            user_info,
            revocation,
            after_revoke,
        })
    }

    /// Authenticate, then run the lifecycle on the issued session.
    pub async fn execute(&self) -> Result<LifecycleReport> {
        let session = self.authenticate().await?;
        self.run(session).await
    }
}

fn require_token(call: Call, token: &str) -> Result<()> {
    if token.is_empty() {
        let err = Error::InvalidParams("token must not be empty".to_string());
        return Err(err.in_call(call, token));
    }
    Ok(())
}

/// Keep a token rejection as a reportable outcome; propagate anything else.
fn continue_on_rejection<T>(result: Result<T>) -> Result<Result<T>> {
    match result {
        Err(e) if e.kind() == ErrorKind::InvalidToken => {
            warn!("{}", e);
            Ok(Err(e))
        }
        Err(e) => Err(e),
        Ok(value) => Ok(Ok(value)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use futures::{stream, StreamExt};

    use super::*;
    use crate::service::AuthStream;

    /// Records the order of calls and answers from a fixed script.
    #[derive(Default)]
    struct ScriptedService {
        calls: Mutex<Vec<String>>,
        revoked: Mutex<bool>,
        fail_user_info_with_transport: bool,
    }

    impl ScriptedService {
        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl OAuthService for ScriptedService {
        async fn authenticate(&self) -> Result<AuthStream> {
            self.record("authenticate");
            Ok(stream::iter(vec![
                Ok(AuthProgress::progress("verifying credentials")),
                Ok(AuthProgress::issued("issuing tokens", "A1", "R1")),
            ])
            .boxed())
        }

        async fn introspect(&self, token: &str) -> Result<IntrospectionResult> {
            self.record(&format!("introspect:{token}"));
            Ok(IntrospectionResult {
                active: !*self.revoked.lock().unwrap(),
            })
        }

        async fn user_info(&self, token: &str) -> Result<UserInfo> {
            self.record(&format!("userinfo:{token}"));
            if self.fail_user_info_with_transport {
                return Err(Error::ConnectionClosed);
            }
            if *self.revoked.lock().unwrap() {
                return Err(Error::invalid_token("token is not active"));
            }
            Ok(UserInfo {
                info: r#"{"sub":"alice"}"#.to_string(),
            })
        }

        async fn revoke(&self, token: &str) -> Result<RevocationOutcome> {
            self.record(&format!("revoke:{token}"));
            *self.revoked.lock().unwrap() = true;
            Ok(RevocationOutcome::default())
        }
    }

    #[tokio::test]
    async fn test_execute_runs_calls_in_order() {
        let client = LifecycleClient::new(ScriptedService::default());
        let report = client.execute().await.unwrap();

        assert_eq!(report.session, TokenSession::new("A1", "R1"));
        assert!(report.before_revoke.active);
        assert!(report.user_info.is_ok());
        assert!(report.revocation.is_ok());
        assert!(!report.after_revoke.active);
        assert!(report.revocation_confirmed());
        assert_eq!(
            client.service().calls(),
            [
                "authenticate",
                "introspect:A1",
                "userinfo:A1",
                "revoke:A1",
                "introspect:A1"
            ]
        );
    }

    #[tokio::test]
    async fn test_rejected_user_info_does_not_abort() {
        let service = ScriptedService::default();
        *service.revoked.lock().unwrap() = true;
        let client = LifecycleClient::new(service);

        let report = client.run(TokenSession::new("A1", "R1")).await.unwrap();
        let err = report.user_info.as_ref().unwrap_err();
        assert!(err.is_invalid_token());
        assert!(matches!(
            err,
            Error::Call {
                call: Call::UserInfo,
                token: Some(token),
                ..
            } if token == "A1"
        ));
        assert!(!report.after_revoke.active);
        assert!(!report.revocation_confirmed());
        assert_eq!(client.service().calls().len(), 4);
    }

    #[tokio::test]
    async fn test_transport_failure_aborts_run() {
        let client = LifecycleClient::new(ScriptedService {
            fail_user_info_with_transport: true,
            ..Default::default()
        });

        let err = client.run(TokenSession::new("A1", "R1")).await.unwrap_err();
        assert!(err.is_transport());
        assert_eq!(client.service().calls(), ["introspect:A1", "userinfo:A1"]);
    }

    #[tokio::test]
    async fn test_empty_token_is_rejected_locally() {
        let client = LifecycleClient::new(ScriptedService::default());
        let err = client.introspect("").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Server);
        assert!(client.service().calls().is_empty());
    }

    #[tokio::test]
    async fn test_introspect_is_stable_without_revoke() {
        let client = LifecycleClient::new(ScriptedService::default());
        let first = client.introspect("A1").await.unwrap();
        let second = client.introspect("A1").await.unwrap();
        assert_eq!(first, second);
    }
}
