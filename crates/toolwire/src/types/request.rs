//! Params carried by the requests and notifications this crate sends or answers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `tools/call` params. Missing `arguments` means an empty object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

impl ToolCallParams {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments: Some(arguments),
        }
    }

    pub fn arguments_or_empty(self) -> (String, Value) {
        let args = self
            .arguments
            .unwrap_or_else(|| Value::Object(Map::new()));
        (self.name, args)
    }
}

/// `tools/list` params; the cursor comes from a previous page's `nextCursor`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolListParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// `notifications/cancelled` payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelRequestParams {
    #[serde(rename = "requestId")]
    pub request_id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_call_params_wire_shape() {
        let params = ToolCallParams::new("get_weather", json!({"city": "Mumbai"}));
        assert_eq!(
            serde_json::to_value(&params).unwrap(),
            json!({"name": "get_weather", "arguments": {"city": "Mumbai"}})
        );

        let bare: ToolCallParams = serde_json::from_value(json!({"name": "ping_tool"})).unwrap();
        let (name, args) = bare.arguments_or_empty();
        assert_eq!(name, "ping_tool");
        assert_eq!(args, json!({}));
    }

    #[test]
    fn test_first_list_page_sends_no_cursor() {
        let first = serde_json::to_value(ToolListParams::default()).unwrap();
        assert_eq!(first, json!({}));
        let next: ToolListParams = serde_json::from_value(json!({"cursor": "p2"})).unwrap();
        assert_eq!(next.cursor.as_deref(), Some("p2"));
    }
}
