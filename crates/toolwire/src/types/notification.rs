//! MCP notification method names and payloads.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sent by the client once it has processed the `initialize` result.
pub const INITIALIZED: &str = "initialized";
/// Spelling used by newer MCP revisions; treated as [`INITIALIZED`].
pub const INITIALIZED_ALIAS: &str = "notifications/initialized";
pub const CANCELLED: &str = "notifications/cancelled";
pub const MESSAGE: &str = "notifications/message";

pub fn is_initialized(method: &str) -> bool {
    method == INITIALIZED || method == INITIALIZED_ALIAS
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogMessageParams {
    pub level: LogLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    pub data: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}
