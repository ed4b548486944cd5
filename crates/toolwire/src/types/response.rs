//! MCP response types for tools.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

/// Outcome of one tool invocation: a success payload or a structured error, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<ToolContent>,
    #[serde(
        default,
        rename = "structuredContent",
        skip_serializing_if = "Option::is_none"
    )]
    pub structured_content: Option<Value>,
    #[serde(default, rename = "isError", skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolCallResult {
    pub fn text(text: String) -> Self {
        Self {
            content: vec![ToolContent::Text { text }],
            structured_content: None,
            is_error: None,
        }
    }

    /// Success result carrying `payload` both as compact JSON text and as structured content.
    pub fn success(payload: Value) -> Self {
        let text = serde_json::to_string(&payload).unwrap_or_else(|e| e.to_string());
        Self {
            content: vec![ToolContent::Text { text }],
            structured_content: Some(payload),
            is_error: None,
        }
    }

    pub fn error(kind: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            content: vec![ToolContent::Text {
                text: message.clone(),
            }],
            structured_content: Some(json!({ "kind": kind, "message": message })),
            is_error: Some(true),
        }
    }

    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }

    /// The structured payload, falling back to parsing the first text item as JSON.
    ///
    /// Servers that only send text content get their text back as a JSON string.
    pub fn payload(&self) -> Value {
        if let Some(structured) = &self.structured_content {
            return structured.clone();
        }
        match self.content.first() {
            Some(ToolContent::Text { text }) => {
                serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.clone()))
            }
            None => Value::Null,
        }
    }

    /// Human-readable message of an error result.
    pub fn error_message(&self) -> Option<String> {
        if !self.is_error() {
            return None;
        }
        self.structured_content
            .as_ref()
            .and_then(|s| s.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| {
                self.content.first().map(|c| match c {
                    ToolContent::Text { text } => text.clone(),
                })
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolListResult {
    pub tools: Vec<ToolDefinition>,
    #[serde(default, rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}
