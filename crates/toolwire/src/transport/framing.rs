//! Message framing for newline-delimited JSON.
//!
//! One message per line, serialized compactly so a frame never contains a raw newline.

use serde_json::Value;

use crate::types::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, McpError,
    McpResult, JSONRPC_VERSION,
};

/// Decode one frame (without its delimiter).
///
/// The variant is chosen from the fields present: `method` + `id` is a request,
/// `method` alone a notification, `id` + `result` or `id` + `error` a response.
pub fn decode(frame: &str) -> McpResult<JsonRpcMessage> {
    let trimmed = frame.trim();
    if trimmed.is_empty() {
        return Err(McpError::MalformedMessage("Empty message".to_string()));
    }

    let value: Value =
        serde_json::from_str(trimmed).map_err(|e| McpError::MalformedMessage(e.to_string()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| McpError::MalformedMessage("Message is not a JSON object".to_string()))?;

    match obj.get("jsonrpc").and_then(Value::as_str) {
        Some(JSONRPC_VERSION) => {}
        Some(other) => {
            return Err(McpError::MalformedMessage(format!(
                "Expected jsonrpc version \"{JSONRPC_VERSION}\", got \"{other}\""
            )))
        }
        None => {
            return Err(McpError::MalformedMessage(
                "Missing \"jsonrpc\" field".to_string(),
            ))
        }
    }

    let has_id = obj.contains_key("id");
    let has_method = obj.contains_key("method");
    let has_result = obj.contains_key("result");
    let has_error = obj.contains_key("error");

    if has_result && has_error {
        return Err(McpError::MalformedMessage(
            "Response carries both \"result\" and \"error\"".to_string(),
        ));
    }

    let malformed = |e: serde_json::Error| McpError::MalformedMessage(e.to_string());
    let message = if has_method {
        if has_result || has_error {
            return Err(McpError::MalformedMessage(
                "Message mixes \"method\" with a response payload".to_string(),
            ));
        }
        if has_id {
            JsonRpcMessage::Request(serde_json::from_value::<JsonRpcRequest>(value).map_err(malformed)?)
        } else {
            JsonRpcMessage::Notification(
                serde_json::from_value::<JsonRpcNotification>(value).map_err(malformed)?,
            )
        }
    } else if has_result {
        if !has_id {
            return Err(McpError::MalformedMessage(
                "Response is missing \"id\"".to_string(),
            ));
        }
        JsonRpcMessage::Response(serde_json::from_value::<JsonRpcResponse>(value).map_err(malformed)?)
    } else if has_error {
        // A null or missing id is legal here: the peer could not read ours.
        let mut value = value;
        if !has_id {
            value["id"] = Value::Null;
        }
        JsonRpcMessage::Error(serde_json::from_value::<JsonRpcError>(value).map_err(malformed)?)
    } else {
        return Err(McpError::MalformedMessage(
            "Message has neither \"method\" nor \"result\"/\"error\"".to_string(),
        ));
    };

    Ok(message)
}

/// Encode a message as one compact frame, without the delimiter.
pub fn encode(message: &JsonRpcMessage) -> McpResult<String> {
    serde_json::to_string(message).map_err(McpError::Json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{JsonRpcErrorObject, RequestId};
    use serde_json::json;

    fn roundtrip(message: JsonRpcMessage) {
        let frame = encode(&message).unwrap();
        assert!(!frame.contains('\n'), "frame must be a single line: {frame}");
        assert_eq!(decode(&frame).unwrap(), message);
    }

    #[test]
    fn test_roundtrip_each_kind() {
        roundtrip(
            JsonRpcRequest::new(
                1,
                "tools/call",
                Some(json!({"name": "get_weather", "arguments": {"city": "Mumbai\nCity"}})),
            )
            .into(),
        );
        roundtrip(JsonRpcRequest::new("req-7", "tools/list", None).into());
        roundtrip(JsonRpcResponse::new(RequestId::Number(2), json!({"tools": []})).into());
        roundtrip(
            JsonRpcError::new(RequestId::from("3"), -32601, "Method not found: x".into()).into(),
        );
        roundtrip(JsonRpcNotification::new("initialized", None).into());
    }

    #[test]
    fn test_decode_distinguishes_notification_from_request() {
        let n = decode(r#"{"jsonrpc":"2.0","method":"initialized"}"#).unwrap();
        assert!(matches!(n, JsonRpcMessage::Notification(_)));

        let r = decode(r#"{"jsonrpc":"2.0","id":"1","method":"initialize","params":{}}"#).unwrap();
        assert_eq!(r.id(), Some(&RequestId::from("1")));
    }

    #[test]
    fn test_decode_rejects_result_and_error_together() {
        let err = decode(
            r#"{"jsonrpc":"2.0","id":1,"result":{},"error":{"code":1,"message":"x"}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, McpError::MalformedMessage(_)));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        for frame in [
            "",
            "   ",
            r#"{"broken":"#,
            "[1,2,3]",
            "Starting MCP server...",
            r#"{"jsonrpc":"2.0","id":1}"#,
            r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#,
            r#"{"id":1,"method":"ping"}"#,
            r#"{"jsonrpc":"2.0","result":{}}"#,
        ] {
            let err = decode(frame).unwrap_err();
            assert_eq!(err.code(), -32700, "frame {frame:?} should be malformed");
        }
    }

    #[test]
    fn test_error_without_id_decodes_as_null_id() {
        let msg = decode(r#"{"jsonrpc":"2.0","error":{"code":-32700,"message":"Parse error"}}"#)
            .unwrap();
        match msg {
            JsonRpcMessage::Error(e) => {
                assert_eq!(e.id, RequestId::Null);
                assert_eq!(
                    e.error,
                    JsonRpcErrorObject {
                        code: -32700,
                        message: "Parse error".into(),
                        data: None
                    }
                );
            }
            other => panic!("expected error response, got {other:?}"),
        }
    }
}
