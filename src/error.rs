use std::fmt;

use thiserror::Error;

use crate::schema::{
    ErrorObject, JSONRPCError, RequestId, INTERNAL_ERROR, INVALID_PARAMS, INVALID_REQUEST,
    INVALID_TOKEN, JSONRPC_VERSION, METHOD_NOT_FOUND, PARSE_ERROR, PROTOCOL_VIOLATION,
};

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Invalid message format: {message}")]
    InvalidMessageFormat { message: String },

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Invalid token: {message}")]
    InvalidToken { message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error(
        "{call} failed{}: {source}",
        .token.as_deref().map(|t| format!(" for token {t}")).unwrap_or_default()
    )]
    Call {
        call: Call,
        token: Option<String>,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification that drives how the lifecycle client reacts to a
/// failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The channel or stream broke. Never retried here.
    Transport,
    /// The peer sent something that breaks the message contract.
    ProtocolViolation,
    /// The server rejected the token. Reported, not fatal.
    InvalidToken,
    /// Any other failure reported by the server.
    Server,
}

/// The remote operation an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Authenticate,
    Introspect,
    UserInfo,
    Revoke,
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Call::Authenticate => "authenticate",
            Call::Introspect => "introspect",
            Call::UserInfo => "userinfo",
            Call::Revoke => "revoke",
        };
        f.write_str(name)
    }
}

impl Error {
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Error::InvalidToken {
            message: message.into(),
        }
    }

    /// Attach the failing call and the token it was issued with.
    pub fn in_call(self, call: Call, token: impl Into<String>) -> Self {
        Error::Call {
            call,
            token: Some(token.into()),
            source: Box::new(self),
        }
    }

    /// Attach the failing call when no token is involved yet.
    pub fn during(self, call: Call) -> Self {
        Error::Call {
            call,
            token: None,
            source: Box::new(self),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) | Error::Transport(_) | Error::ConnectionClosed => ErrorKind::Transport,
            Error::Json(_) | Error::InvalidMessageFormat { .. } | Error::ProtocolViolation(_) => {
                ErrorKind::ProtocolViolation
            }
            Error::InvalidToken { .. } => ErrorKind::InvalidToken,
            Error::InvalidRequest(_)
            | Error::MethodNotFound(_)
            | Error::InvalidParams(_)
            | Error::InternalError(_) => ErrorKind::Server,
            Error::Call { source, .. } => source.kind(),
        }
    }

    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    pub fn is_protocol_violation(&self) -> bool {
        self.kind() == ErrorKind::ProtocolViolation
    }

    pub fn is_invalid_token(&self) -> bool {
        self.kind() == ErrorKind::InvalidToken
    }

    /// Rebuild an error from a JSON-RPC error object received off the wire.
    pub fn from_error_object(error: ErrorObject) -> Self {
        match error.code {
            INVALID_TOKEN => Error::InvalidToken {
                message: error.message,
            },
            PROTOCOL_VIOLATION => Error::ProtocolViolation(error.message),
            METHOD_NOT_FOUND => Error::MethodNotFound(error.message),
            INVALID_PARAMS => Error::InvalidParams(error.message),
            INVALID_REQUEST => Error::InvalidRequest(error.message),
            PARSE_ERROR => Error::InvalidMessageFormat {
                message: error.message,
            },
            _ => Error::InternalError(error.message),
        }
    }

    pub fn error_code(&self) -> i32 {
        match self {
            Error::InvalidToken { .. } => INVALID_TOKEN,
            Error::ProtocolViolation(_) => PROTOCOL_VIOLATION,
            Error::MethodNotFound(_) => METHOD_NOT_FOUND,
            Error::InvalidParams(_) => INVALID_PARAMS,
            Error::InvalidRequest(_) => INVALID_REQUEST,
            Error::Json(_) | Error::InvalidMessageFormat { .. } => PARSE_ERROR,
            Error::Call { source, .. } => source.error_code(),
            _ => INTERNAL_ERROR,
        }
    }

    /// The wire message carries the bare reason; the code carries the kind.
    fn wire_message(&self) -> String {
        match self {
            Error::InvalidToken { message } | Error::InvalidMessageFormat { message } => {
                message.clone()
            }
            Error::ProtocolViolation(message)
            | Error::MethodNotFound(message)
            | Error::InvalidParams(message)
            | Error::InvalidRequest(message)
            | Error::InternalError(message) => message.clone(),
            Error::Call { source, .. } => source.wire_message(),
            other => other.to_string(),
        }
    }

    pub fn to_jsonrpc_error(&self, id: RequestId) -> JSONRPCError {
        JSONRPCError {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error: ErrorObject {
                code: self.error_code(),
                message: self.wire_message(),
                data: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_sees_through_call_context() {
        let err = Error::invalid_token("token is not active").in_call(Call::UserInfo, "A1");
        assert_eq!(err.kind(), ErrorKind::InvalidToken);
        assert_eq!(
            err.to_string(),
            "userinfo failed for token A1: Invalid token: token is not active"
        );

        let err = Error::ConnectionClosed.in_call(Call::Revoke, "A1");
        assert!(err.is_transport());

        let err = Error::ProtocolViolation("empty stream".into()).during(Call::Authenticate);
        assert!(err.is_protocol_violation());
        assert_eq!(
            err.to_string(),
            "authenticate failed: Protocol violation: empty stream"
        );
    }

    #[test]
    fn test_error_object_mapping() {
        let errors = [
            Error::invalid_token("revoked"),
            Error::ProtocolViolation("empty stream".into()),
            Error::MethodNotFound("oauth/unknown".into()),
            Error::InvalidParams("missing token".into()),
        ];

        for err in errors {
            let wire = err.to_jsonrpc_error(RequestId::Number(7));
            let back = Error::from_error_object(wire.error);
            assert_eq!(back.kind(), err.kind());
            assert_eq!(back.to_string(), err.to_string());
        }
    }

    #[test]
    fn test_unknown_code_is_server_error() {
        let err = Error::from_error_object(ErrorObject {
            code: -1,
            message: "boom".into(),
            data: None,
        });
        assert_eq!(err.kind(), ErrorKind::Server);
    }
}
