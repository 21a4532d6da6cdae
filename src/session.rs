/// Tokens obtained from the terminal message of the authentication stream.
///
/// A session is never mutated after creation and is not `Clone`:
/// [`LifecycleClient::run`](crate::LifecycleClient::run) takes it by value, so
/// no lifecycle call can be issued before the stream has been drained.
#[derive(Debug, PartialEq, Eq)]
pub struct TokenSession {
    access_token: String,
    refresh_token: String,
}

impl TokenSession {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// The correlation key of every later call.
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Captured alongside the access token, otherwise unused.
    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }
}
