//! Server-role request dispatcher: routes requests to negotiation and the tool registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::tools::ToolRegistry;
use crate::types::notification::CANCELLED;
use crate::types::*;

use super::correlator::MessageHandler;
use super::negotiation::NegotiatedCapabilities;
use super::validator::{required_params, validate_request};

/// Answers everything a client may ask of a tool server.
pub struct ProtocolHandler {
    registry: Arc<ToolRegistry>,
    capabilities: Mutex<NegotiatedCapabilities>,
    shutdown_requested: AtomicBool,
}

impl ProtocolHandler {
    pub fn new(registry: Arc<ToolRegistry>, capabilities: NegotiatedCapabilities) -> Self {
        Self {
            registry,
            capabilities: Mutex::new(capabilities),
            shutdown_requested: AtomicBool::new(false),
        }
    }

    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }

    async fn dispatch_request(&self, request: JsonRpcRequest) -> McpResult<Value> {
        match request.method.as_str() {
            "initialize" => self.handle_initialize(request.params).await,
            "shutdown" => self.handle_shutdown(),

            "tools/list" | "tools/call" if self.shutdown_requested() => Err(
                McpError::InvalidRequest("Server is shutting down".to_string()),
            ),
            "tools/list" => self.handle_tools_list(request.params),
            "tools/call" => self.handle_tools_call(request.params).await,

            _ => Err(McpError::MethodNotFound(request.method)),
        }
    }

    async fn handle_initialize(&self, params: Option<Value>) -> McpResult<Value> {
        let init_params: InitializeParams = required_params(params, "Initialize")?;
        let mut caps = self.capabilities.lock().await;
        let result = caps.negotiate(init_params)?;
        serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
    }

    fn handle_shutdown(&self) -> McpResult<Value> {
        tracing::info!("Shutdown requested");
        self.shutdown_requested.store(true, Ordering::SeqCst);
        Ok(Value::Object(serde_json::Map::new()))
    }

    /// The whole table fits on one page, so a cursor can only be stale.
    fn handle_tools_list(&self, params: Option<Value>) -> McpResult<Value> {
        let params: ToolListParams = match params {
            Some(p) => serde_json::from_value(p)
                .map_err(|e| McpError::InvalidParams(e.to_string()))?,
            None => ToolListParams::default(),
        };
        if let Some(cursor) = params.cursor {
            return Err(McpError::InvalidParams(format!("Unknown cursor '{cursor}'")));
        }

        let result = ToolListResult {
            tools: self.registry.list_tools(),
            next_cursor: None,
        };
        serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
    }

    async fn handle_tools_call(&self, params: Option<Value>) -> McpResult<Value> {
        let call_params: ToolCallParams = required_params(params, "Tool call")?;
        let (name, arguments) = call_params.arguments_or_empty();

        tracing::info!(tool = %name, "Tool call");
        let result = self.registry.invoke(&name, arguments).await?;

        serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
    }
}

#[async_trait]
impl MessageHandler for ProtocolHandler {
    async fn handle_request(&self, request: JsonRpcRequest) -> McpResult<Value> {
        validate_request(&request)?;
        self.dispatch_request(request).await
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) {
        match notification.method.as_str() {
            // The session already moved to Ready before this arrives.
            m if is_initialized(m) => {}
            CANCELLED => {
                let request_id = notification
                    .params
                    .and_then(|p| serde_json::from_value::<CancelRequestParams>(p).ok());
                match request_id {
                    Some(cancel) => tracing::info!(
                        request_id = %cancel.request_id,
                        reason = cancel.reason.as_deref().unwrap_or(""),
                        "Client cancelled a request"
                    ),
                    None => tracing::info!("Received cancellation notification"),
                }
            }
            other => tracing::debug!(method = %other, "Unknown notification"),
        }
    }
}
