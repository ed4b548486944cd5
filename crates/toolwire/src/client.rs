//! Client lifecycle: spawn a tool server, handshake, call tools, disconnect.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::protocol::{Correlator, MessageHandler};
use crate::session::{Phase, Role, Session};
use crate::transport::{Channel, PeerProcess, ServerCommand};
use crate::types::notification::MESSAGE;
use crate::types::{
    ClientCapabilities, InitializeResult, JsonRpcNotification, LogLevel, LogMessageParams,
    McpResult, ToolCallParams, ToolCallResult, ToolDefinition, ToolListParams, ToolListResult,
};

/// One session with one tool server.
///
/// Cheap to share behind an `Arc`: every method takes `&self` and calls may
/// run concurrently.
pub struct McpClient {
    correlator: Arc<Correlator>,
    process: Option<PeerProcess>,
    reader_task: JoinHandle<()>,
    config: ClientConfig,
    server: Mutex<Option<InitializeResult>>,
}

impl McpClient {
    /// Spawn `command` and complete the handshake.
    pub async fn connect(command: &ServerCommand, config: ClientConfig) -> McpResult<Self> {
        let channel = Channel::spawn(command)?.with_read_timeout(config.read_timeout);
        let client = Self::open(channel, config);
        if let Err(e) = client.handshake(ClientCapabilities::default()).await {
            client.disconnect().await;
            return Err(e);
        }
        Ok(client)
    }

    /// Attach to an existing channel and start reading. No handshake yet.
    ///
    /// Server log notifications are re-emitted as `tracing` events until
    /// [`McpClient::on_notification`] installs a handler.
    pub fn open(channel: Channel, config: ClientConfig) -> Self {
        let (reader, writer, process) = channel.split();
        let correlator =
            Arc::new(Correlator::new(Role::Client, writer).with_handler(Arc::new(ServerLogs)));
        let reader_task = tokio::spawn(Arc::clone(&correlator).dispatch_incoming(reader));
        Self {
            correlator,
            process,
            reader_task,
            config,
            server: Mutex::new(None),
        }
    }

    pub async fn handshake(&self, capabilities: ClientCapabilities) -> McpResult<InitializeResult> {
        let result = self
            .correlator
            .handshake(
                self.config.client_info.clone(),
                capabilities,
                self.config.handshake_timeout,
            )
            .await?;
        *self.server.lock().await = Some(result.clone());
        Ok(result)
    }

    /// Deliver server notifications to `handler`. Replaces any earlier one;
    /// log notifications are still forwarded to `tracing` first.
    pub async fn on_notification<F>(&self, handler: F)
    where
        F: Fn(JsonRpcNotification) + Send + Sync + 'static,
    {
        self.correlator
            .set_handler(Arc::new(NotificationFn(handler)))
            .await;
    }

    /// Raw request on a ready session. `None` uses the configured call timeout.
    pub async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Option<Duration>,
    ) -> McpResult<Value> {
        let timeout = timeout.unwrap_or(self.config.call_timeout);
        self.correlator.call(method, params, timeout).await
    }

    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        timeout: Option<Duration>,
    ) -> McpResult<ToolCallResult> {
        let params = serde_json::to_value(ToolCallParams::new(name, arguments))?;
        let raw = self.call("tools/call", Some(params), timeout).await?;
        Ok(serde_json::from_value(raw)?)
    }

    /// Every tool the server advertises, following pagination cursors.
    pub async fn list_tools(&self) -> McpResult<Vec<ToolDefinition>> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let params = match cursor.take() {
                Some(cursor) => Some(serde_json::to_value(ToolListParams {
                    cursor: Some(cursor),
                })?),
                None => None,
            };
            let raw = self.call("tools/list", params, None).await?;
            let page: ToolListResult = serde_json::from_value(raw)?;
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    pub async fn ping(&self) -> McpResult<()> {
        self.correlator.ping(self.config.call_timeout).await
    }

    /// Requests sent and still waiting for a response.
    pub async fn pending_count(&self) -> usize {
        self.correlator.pending_count().await
    }

    pub async fn phase(&self) -> Phase {
        self.correlator.phase().await
    }

    pub async fn session(&self) -> Session {
        self.correlator.session().await
    }

    /// The server's `initialize` result, once the handshake has completed.
    pub async fn server(&self) -> Option<InitializeResult> {
        self.server.lock().await.clone()
    }

    pub fn process(&self) -> Option<&PeerProcess> {
        self.process.as_ref()
    }

    /// Close the session, then stop the server: EOF on its stdin, wait the
    /// configured grace period, kill. Safe to call more than once.
    pub async fn disconnect(&self) {
        self.correlator.close().await;
        if let Some(process) = &self.process {
            process.close(self.config.close_grace).await;
        }
        self.reader_task.abort();
    }
}

impl Drop for McpClient {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

/// Re-emit a server `notifications/message` as a local event. Returns false
/// for anything else.
fn forward_log(notification: &JsonRpcNotification) -> bool {
    if notification.method != MESSAGE {
        return false;
    }
    let Some(params) = notification
        .params
        .clone()
        .and_then(|p| serde_json::from_value::<LogMessageParams>(p).ok())
    else {
        tracing::debug!("Server log notification without valid params");
        return false;
    };

    let logger = params.logger.as_deref().unwrap_or("server");
    let data = match &params.data {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    match params.level {
        LogLevel::Debug => tracing::debug!(target: "toolwire::peer", logger, "{data}"),
        LogLevel::Info => tracing::info!(target: "toolwire::peer", logger, "{data}"),
        LogLevel::Warning => tracing::warn!(target: "toolwire::peer", logger, "{data}"),
        LogLevel::Error => tracing::error!(target: "toolwire::peer", logger, "{data}"),
    }
    true
}

struct ServerLogs;

#[async_trait]
impl MessageHandler for ServerLogs {
    async fn handle_notification(&self, notification: JsonRpcNotification) {
        if !forward_log(&notification) {
            tracing::debug!(method = %notification.method, "Ignoring notification");
        }
    }
}

struct NotificationFn<F>(F);

#[async_trait]
impl<F> MessageHandler for NotificationFn<F>
where
    F: Fn(JsonRpcNotification) + Send + Sync + 'static,
{
    async fn handle_notification(&self, notification: JsonRpcNotification) {
        forward_log(&notification);
        (self.0)(notification)
    }
}
