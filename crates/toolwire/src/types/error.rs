//! Error types and JSON-RPC error codes for both protocol roles.

use serde_json::Value;

use super::message::{JsonRpcError, JsonRpcErrorObject, RequestId, JSONRPC_VERSION};

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// MCP-specific error codes.
pub mod mcp_error_codes {
    pub const REQUEST_CANCELLED: i32 = -32800;
    pub const REQUEST_TIMEOUT: i32 = -32801;
    pub const TOOL_NOT_FOUND: i32 = -32803;
    pub const DUPLICATE_TOOL: i32 = -32804;

    /// A message arrived in a session phase that does not allow it.
    pub const PROTOCOL_VIOLATION: i32 = -32850;
    /// A request other than `initialize`/`ping` arrived before the handshake finished.
    pub const NOT_READY: i32 = -32851;
    pub const SESSION_CLOSED: i32 = -32852;
    pub const HANDSHAKE_REJECTED: i32 = -32853;
    pub const ALREADY_INITIALIZED: i32 = -32854;

    /// Transport-level failures that never reach the wire as-is.
    pub const TRANSPORT_ERROR: i32 = -32860;
}

/// All errors produced by the codec, transport, correlator, session and registry.
#[derive(thiserror::Error, Debug)]
pub enum McpError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Failed to spawn peer '{command}': {reason}")]
    SpawnFailure { command: String, reason: String },

    #[error("Channel closed")]
    ChannelClosed,

    #[error("Read timed out after {0:?}")]
    ReadTimeout(std::time::Duration),

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    #[error("Session already initialized")]
    AlreadyInitialized,

    #[error("Session not ready: {0}")]
    NotReady(String),

    #[error("Session closed")]
    SessionClosed,

    #[error("Call '{method}' timed out after {timeout:?}")]
    CallTimeout {
        method: String,
        timeout: std::time::Duration,
    },

    #[error("Remote error {code}: {message}")]
    RemoteError {
        code: i32,
        message: String,
        data: Option<Value>,
    },

    #[error("Tool not found: {0}")]
    UnknownTool(String),

    #[error("Tool already registered: {0}")]
    DuplicateTool(String),

    #[error("Invalid argument '{field}': {reason}")]
    SchemaValidationError { field: String, reason: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    pub fn code(&self) -> i32 {
        use error_codes::*;
        use mcp_error_codes::*;
        match self {
            McpError::MalformedMessage(_) | McpError::Json(_) => PARSE_ERROR,
            McpError::InvalidRequest(_) => INVALID_REQUEST,
            McpError::MethodNotFound(_) => METHOD_NOT_FOUND,
            McpError::InvalidParams(_) | McpError::SchemaValidationError { .. } => INVALID_PARAMS,
            McpError::InternalError(_) => INTERNAL_ERROR,
            McpError::CallTimeout { .. } => REQUEST_TIMEOUT,
            McpError::UnknownTool(_) => TOOL_NOT_FOUND,
            McpError::DuplicateTool(_) => DUPLICATE_TOOL,
            McpError::ProtocolViolation(_) => PROTOCOL_VIOLATION,
            McpError::NotReady(_) => NOT_READY,
            McpError::SessionClosed => SESSION_CLOSED,
            McpError::HandshakeRejected(_) => HANDSHAKE_REJECTED,
            McpError::AlreadyInitialized => ALREADY_INITIALIZED,
            McpError::RemoteError { code, .. } => *code,
            McpError::SpawnFailure { .. }
            | McpError::ChannelClosed
            | McpError::ReadTimeout(_)
            | McpError::Io(_) => TRANSPORT_ERROR,
        }
    }

    /// Structured `data` attached to the wire error, when the variant has any.
    fn data(&self) -> Option<Value> {
        match self {
            McpError::SchemaValidationError { field, reason } => Some(serde_json::json!({
                "field": field,
                "reason": reason,
            })),
            McpError::RemoteError { data, .. } => data.clone(),
            _ => None,
        }
    }

    pub fn to_json_rpc_error(&self, id: RequestId) -> JsonRpcError {
        let message = match self {
            // Forward the peer's message untouched when relaying.
            McpError::RemoteError { message, .. } => message.clone(),
            other => other.to_string(),
        };
        JsonRpcError {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            error: JsonRpcErrorObject {
                code: self.code(),
                message,
                data: self.data(),
            },
        }
    }

    /// True for failures that end the session: nothing further can be sent.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            McpError::ChannelClosed | McpError::SessionClosed | McpError::SpawnFailure { .. }
        )
    }
}

impl From<JsonRpcErrorObject> for McpError {
    fn from(e: JsonRpcErrorObject) -> Self {
        McpError::RemoteError {
            code: e.code,
            message: e.message,
            data: e.data,
        }
    }
}

pub type McpResult<T> = Result<T, McpError>;
