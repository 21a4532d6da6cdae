use std::time::Duration;

/// Address used when nothing else is configured.
pub const DEFAULT_ADDR: &str = "localhost:50051";

/// Environment variable consulted for the service address.
pub const ADDR_ENV: &str = "OAUTH_RPC_ADDR";

/// Configuration for the lifecycle client
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// Address of the token service
    pub addr: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
        }
    }
}

impl ClientConfig {
    /// Defaults, with the address taken from `OAUTH_RPC_ADDR` when set.
    pub fn from_env() -> Self {
        match std::env::var(ADDR_ENV) {
            Ok(addr) if !addr.is_empty() => Self { addr },
            _ => Self::default(),
        }
    }

    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }
}

/// Behaviour of the in-memory token authority.
///
/// The authentication stream mimics a device-authorization flow: one message
/// pointing at the verification URI, `pending_polls` waiting messages spaced
/// by `poll_interval`, then the issued tokens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorityConfig {
    pub verification_uri: String,
    pub pending_polls: u32,
    pub poll_interval: Duration,
    /// Subject reported by userinfo for every issued token
    pub subject: String,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            verification_uri: "https://localhost:9443/oauth2/device".to_string(),
            pending_polls: 1,
            poll_interval: Duration::from_secs(5),
            subject: "admin".to_string(),
        }
    }
}

impl AuthorityConfig {
    pub fn with_verification_uri(mut self, uri: impl Into<String>) -> Self {
        self.verification_uri = uri.into();
        self
    }

    pub fn with_pending_polls(mut self, polls: u32) -> Self {
        self.pending_polls = polls;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }
}

/// Configuration for a token server
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub authority: AuthorityConfig,
}

impl ServerConfig {
    pub fn new(listen_addr: impl Into<String>) -> Self {
        Self {
            listen_addr: listen_addr.into(),
            authority: AuthorityConfig::default(),
        }
    }

    pub fn with_authority(mut self, authority: AuthorityConfig) -> Self {
        self.authority = authority;
        self
    }
}
