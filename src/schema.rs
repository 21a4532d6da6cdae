//! Wire types: the JSON-RPC 2.0 envelope and the token-service payloads that
//! travel inside it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

// Standard JSON-RPC error codes
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

// Server-defined error codes
pub const INVALID_TOKEN: i32 = -32001;
pub const PROTOCOL_VIOLATION: i32 = -32002;

/// Method names of the token service.
pub mod methods {
    pub const AUTHENTICATE: &str = "oauth/authenticate";
    pub const INTROSPECT: &str = "oauth/introspect";
    pub const USER_INFO: &str = "oauth/userinfo";
    pub const REVOKE: &str = "oauth/revoke";

    /// Notification carrying one item of a server-streaming call.
    pub const STREAM_ITEM: &str = "stream/item";
}

/// Any JSON-RPC object that can be decoded off the wire or encoded to be sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JSONRPCMessage {
    Request(JSONRPCRequest),
    Notification(JSONRPCNotification),
    Response(JSONRPCResponse),
    Error(JSONRPCError),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestId::String(s) => s.fmt(f),
            RequestId::Number(n) => n.fmt(f),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JSONRPCRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(flatten)]
    pub request: Request,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JSONRPCNotification {
    pub jsonrpc: String,
    #[serde(flatten)]
    pub notification: Request,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JSONRPCResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    pub result: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JSONRPCError {
    pub jsonrpc: String,
    pub id: RequestId,
    pub error: ErrorObject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JSONRPCMessage {
    pub fn request(id: RequestId, method: &str, params: Option<Value>) -> Self {
        JSONRPCMessage::Request(JSONRPCRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            request: Request {
                method: method.to_string(),
                params,
            },
        })
    }

    pub fn notification(method: &str, params: Option<Value>) -> Self {
        JSONRPCMessage::Notification(JSONRPCNotification {
            jsonrpc: JSONRPC_VERSION.to_string(),
            notification: Request {
                method: method.to_string(),
                params,
            },
        })
    }

    pub fn response(id: RequestId, result: Value) -> Self {
        JSONRPCMessage::Response(JSONRPCResponse {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result,
        })
    }
}

/// Params of a `stream/item` notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamItem {
    pub request_id: RequestId,
    pub item: Value,
}

/// One event of the authentication stream.
///
/// The producer decides which variant it sends; `Issued` is the terminal
/// message and the only one that carries tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthProgress {
    Progress {
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Issued {
        message: String,
        access_token: String,
        refresh_token: String,
    },
}

impl AuthProgress {
    pub fn progress(message: impl Into<String>) -> Self {
        AuthProgress::Progress {
            message: message.into(),
        }
    }

    pub fn issued(
        message: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        AuthProgress::Issued {
            message: message.into(),
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }

    /// Human-readable status text, present on every message.
    pub fn message(&self) -> &str {
        match self {
            AuthProgress::Progress { message } | AuthProgress::Issued { message, .. } => message,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AuthProgress::Issued { .. })
    }
}

/// Params shared by introspect, userinfo and revoke.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenParams {
    pub token: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntrospectionResult {
    pub active: bool,
}

impl IntrospectionResult {
    pub fn status(&self) -> &'static str {
        if self.active {
            "active"
        } else {
            "inactive"
        }
    }
}

/// Identity payload bound to an access token. Opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub info: String,
}

/// Acknowledgement of a revocation. Encoded as `{}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevocationOutcome {}
