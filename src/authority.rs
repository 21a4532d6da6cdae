//! An in-memory token authority.
//!
//! Issues opaque tokens through a simulated device-authorization stream and
//! keeps their state for introspection, userinfo and revocation. Tokens live
//! only as long as the authority.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    config::AuthorityConfig,
    error::{Error, Result},
    schema::{AuthProgress, IntrospectionResult, RevocationOutcome, UserInfo},
    service::{AuthStream, OAuthService},
};

/// Server-side state of an access token. There is no way back from
/// `Revoked`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Active,
    Revoked,
}

#[derive(Debug)]
struct IssuedToken {
    state: TokenState,
    subject: String,
}

type TokenTable = Arc<Mutex<HashMap<String, IssuedToken>>>;

pub struct MemoryAuthority {
    config: AuthorityConfig,
    tokens: TokenTable,
}

impl MemoryAuthority {
    pub fn new(config: AuthorityConfig) -> Self {
        Self {
            config,
            tokens: Arc::default(),
        }
    }

    /// Mint an active access/refresh token pair without running the stream.
    pub async fn issue(&self) -> (String, String) {
        mint(&self.tokens, &self.config.subject).await
    }

    pub async fn state(&self, token: &str) -> Option<TokenState> {
        self.tokens.lock().await.get(token).map(|t| t.state)
    }
}

impl Default for MemoryAuthority {
    fn default() -> Self {
        Self::new(AuthorityConfig::default())
    }
}

async fn mint(tokens: &TokenTable, subject: &str) -> (String, String) {
    let access_token = Uuid::new_v4().simple().to_string();
    let refresh_token = Uuid::new_v4().simple().to_string();
    tokens.lock().await.insert(
        access_token.clone(),
        IssuedToken {
            state: TokenState::Active,
            subject: subject.to_string(),
        },
    );
    info!("Issued access token {}", access_token);
    (access_token, refresh_token)
}

fn user_code() -> String {
    let code = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{}-{}", &code[..4], &code[4..8])
}

#[async_trait]
impl OAuthService for MemoryAuthority {
    async fn authenticate(&self) -> Result<AuthStream> {
        let tokens = self.tokens.clone();
        let config = self.config.clone();
        let code = user_code();

        let stream = async_stream::stream! {
            yield Ok::<_, Error>(AuthProgress::progress(format!(
                "Go to {}?user_code={} to complete login",
                config.verification_uri, code
            )));

            for _ in 0..config.pending_polls {
                tokio::time::sleep(config.poll_interval).await;
                yield Ok(AuthProgress::progress("Waiting for response..."));
            }
            tokio::time::sleep(config.poll_interval).await;

            let (access_token, refresh_token) = mint(&tokens, &config.subject).await;
            yield Ok(AuthProgress::issued("Success", access_token, refresh_token));
        };
        Ok(stream.boxed())
    }

    async fn introspect(&self, token: &str) -> Result<IntrospectionResult> {
        let active = matches!(self.state(token).await, Some(TokenState::Active));
        debug!("Introspected token {}: active={}", token, active);
        Ok(IntrospectionResult { active })
    }

    async fn user_info(&self, token: &str) -> Result<UserInfo> {
        let tokens = self.tokens.lock().await;
        match tokens.get(token) {
            Some(IssuedToken {
                state: TokenState::Active,
                subject,
            }) => {
                let info = serde_json::json!({
                    "sub": subject,
                    "username": subject,
                });
                Ok(UserInfo {
                    info: info.to_string(),
                })
            }
            Some(_) => Err(Error::invalid_token("token has been revoked")),
            None => Err(Error::invalid_token("token is unknown")),
        }
    }

    async fn revoke(&self, token: &str) -> Result<RevocationOutcome> {
        match self.tokens.lock().await.get_mut(token) {
            Some(issued) => {
                if issued.state == TokenState::Revoked {
                    debug!("Token {} already revoked", token);
                }
                issued.state = TokenState::Revoked;
            }
            // Unknown tokens are acknowledged as well
            None => debug!("Revoke requested for unknown token {}", token),
        }
        Ok(RevocationOutcome::default())
    }
}
