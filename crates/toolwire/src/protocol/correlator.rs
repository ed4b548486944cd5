//! Request/response correlation over a frame channel.
//!
//! One reader task runs [`Correlator::dispatch_incoming`]; any number of
//! callers issue requests concurrently and wait on a oneshot keyed by id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{oneshot, Mutex, RwLock};

use crate::session::{Direction, Event, PeerCapabilities, Phase, Role, Session};
use crate::transport::{framing, FrameReader, FrameWriter};
use crate::types::notification::INITIALIZED;
use crate::types::{
    is_initialized, is_supported_version, ClientCapabilities, Implementation, InitializeParams,
    InitializeResult, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    McpError, McpResult, RequestId,
};

/// Receives what the peer sends on its own initiative.
///
/// The server's protocol handler answers requests; a client usually only
/// cares about notifications.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle_request(&self, request: JsonRpcRequest) -> McpResult<Value> {
        Err(McpError::MethodNotFound(request.method))
    }

    async fn handle_notification(&self, notification: JsonRpcNotification) {
        tracing::debug!(method = %notification.method, "Ignoring notification");
    }
}

struct PendingCall {
    method: String,
    slot: oneshot::Sender<McpResult<Value>>,
}

#[derive(Default)]
struct PendingCalls {
    calls: HashMap<RequestId, PendingCall>,
    closed: bool,
}

pub struct Correlator {
    writer: FrameWriter,
    session: Mutex<Session>,
    pending: Mutex<PendingCalls>,
    next_id: AtomicI64,
    handler: RwLock<Option<Arc<dyn MessageHandler>>>,
}

impl Correlator {
    pub fn new(role: Role, writer: FrameWriter) -> Self {
        Self {
            writer,
            session: Mutex::new(Session::new(role)),
            pending: Mutex::new(PendingCalls::default()),
            next_id: AtomicI64::new(1),
            handler: RwLock::new(None),
        }
    }

    /// Install `handler` before the reader task starts.
    pub fn with_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = RwLock::new(Some(handler));
        self
    }

    pub async fn set_handler(&self, handler: Arc<dyn MessageHandler>) {
        *self.handler.write().await = Some(handler);
    }

    pub async fn phase(&self) -> Phase {
        self.session.lock().await.phase()
    }

    /// Snapshot of the session record.
    pub async fn session(&self) -> Session {
        self.session.lock().await.clone()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.calls.len()
    }

    /// Run the client side of the `initialize`/`initialized` exchange.
    ///
    /// Any failure leaves the session closed; the caller has to start over
    /// with a new channel.
    pub async fn handshake(
        &self,
        client_info: Implementation,
        capabilities: ClientCapabilities,
        timeout: Duration,
    ) -> McpResult<InitializeResult> {
        {
            let mut session = self.session.lock().await;
            match session.phase() {
                Phase::Uninitialized => {}
                Phase::Closed => return Err(McpError::SessionClosed),
                Phase::Initializing | Phase::Ready => return Err(McpError::AlreadyInitialized),
            }
            session.apply(Direction::Outgoing, Event::Request("initialize"))?;
        }

        tracing::info!(
            client = %client_info.name,
            version = %client_info.version,
            "Sending initialize"
        );
        let params = serde_json::to_value(InitializeParams::new(client_info, capabilities))?;

        let raw = match self.request("initialize", Some(params), timeout).await {
            Ok(raw) => raw,
            Err(McpError::RemoteError { code, message, .. }) => {
                return Err(self
                    .reject_handshake(format!("server answered {code}: {message}"))
                    .await);
            }
            Err(e) => {
                self.session.lock().await.close();
                return Err(e);
            }
        };

        let result: InitializeResult = match serde_json::from_value(raw) {
            Ok(result) => result,
            Err(e) => {
                return Err(self
                    .reject_handshake(format!("invalid initialize result: {e}"))
                    .await)
            }
        };

        if !is_supported_version(&result.protocol_version) {
            return Err(self
                .reject_handshake(format!(
                    "unsupported protocol version {}",
                    result.protocol_version
                ))
                .await);
        }

        self.session.lock().await.record_negotiation(
            result.protocol_version.clone(),
            result.server_info.clone(),
            PeerCapabilities::Server(result.capabilities.clone()),
        );

        self.notify(INITIALIZED, None).await?;

        tracing::info!(
            protocol_version = %result.protocol_version,
            server = ?result.server_info.as_ref().map(|s| &s.name),
            "MCP handshake complete"
        );
        Ok(result)
    }

    async fn reject_handshake(&self, reason: String) -> McpError {
        tracing::warn!(reason = %reason, "Handshake rejected");
        self.session.lock().await.close();
        McpError::HandshakeRejected(reason)
    }

    /// Issue a request on a ready session and wait for its result.
    pub async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> McpResult<Value> {
        match self.session.lock().await.phase() {
            Phase::Ready => {}
            Phase::Closed => return Err(McpError::SessionClosed),
            phase => {
                return Err(McpError::NotReady(format!(
                    "cannot call '{method}' while session is {phase}"
                )))
            }
        }
        self.request(method, params, timeout).await
    }

    /// Liveness check, allowed in every open phase.
    pub async fn ping(&self, timeout: Duration) -> McpResult<()> {
        self.session
            .lock()
            .await
            .check(Direction::Outgoing, Event::Request("ping"))?;
        self.request("ping", None, timeout).await.map(|_| ())
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) -> McpResult<()> {
        self.session
            .lock()
            .await
            .apply(Direction::Outgoing, Event::Notification(method))?;
        let message = JsonRpcNotification::new(method, params).into();
        self.send(&message).await
    }

    async fn request(
        &self,
        method: &str,
        params: Option<Value>,
        timeout: Duration,
    ) -> McpResult<Value> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (slot, completion) = oneshot::channel();

        {
            let mut pending = self.pending.lock().await;
            if pending.closed {
                return Err(McpError::ChannelClosed);
            }
            pending.calls.insert(
                id.clone(),
                PendingCall {
                    method: method.to_string(),
                    slot,
                },
            );
        }

        tracing::debug!(id = %id, method = %method, "Sending request");
        let message = JsonRpcRequest::new(id.clone(), method, params).into();
        if let Err(e) = self.send(&message).await {
            self.pending.lock().await.calls.remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, completion).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(McpError::ChannelClosed),
            Err(_) => {
                self.pending.lock().await.calls.remove(&id);
                tracing::warn!(
                    id = %id,
                    method = %method,
                    timeout_ms = timeout.as_millis() as u64,
                    "Request timed out"
                );
                Err(McpError::CallTimeout {
                    method: method.to_string(),
                    timeout,
                })
            }
        }
    }

    async fn send(&self, message: &JsonRpcMessage) -> McpResult<()> {
        match self.writer.send(message).await {
            Err(McpError::ChannelClosed) => {
                self.shutdown("write failed").await;
                Err(McpError::ChannelClosed)
            }
            other => other,
        }
    }

    /// Close the session and fail every pending call with `ChannelClosed`.
    pub async fn close(&self) {
        self.shutdown("closed locally").await;
        self.writer.close().await;
    }

    async fn shutdown(&self, reason: &str) {
        self.session.lock().await.close();

        let drained: Vec<(RequestId, PendingCall)> = {
            let mut pending = self.pending.lock().await;
            pending.closed = true;
            pending.calls.drain().collect()
        };

        if !drained.is_empty() {
            tracing::warn!(
                reason = %reason,
                pending = drained.len(),
                "Failing pending requests"
            );
        }
        for (id, call) in drained {
            tracing::debug!(id = %id, method = %call.method, "Request abandoned");
            let _ = call.slot.send(Err(McpError::ChannelClosed));
        }
    }

    /// Reader loop. Returns when the channel closes.
    pub async fn dispatch_incoming(self: Arc<Self>, mut reader: FrameReader) {
        loop {
            let line = match reader.receive_line().await {
                Ok(line) => line,
                Err(McpError::ReadTimeout(after)) => {
                    tracing::debug!(after_ms = after.as_millis() as u64, "No frame from peer");
                    continue;
                }
                Err(e) => {
                    tracing::info!(reason = %e, "Peer channel ended");
                    break;
                }
            };

            let message = match framing::decode(&line) {
                Ok(message) => message,
                Err(e) => {
                    tracing::warn!(error = %e, frame = %preview(&line), "Dropping malformed frame");
                    continue;
                }
            };

            match message {
                JsonRpcMessage::Response(response) => {
                    self.resolve(response.id, Ok(response.result)).await
                }
                JsonRpcMessage::Error(error) => {
                    self.resolve(error.id, Err(error.error.into())).await
                }
                JsonRpcMessage::Request(request) => self.handle_incoming_request(request).await,
                JsonRpcMessage::Notification(notification) => {
                    self.handle_incoming_notification(notification).await
                }
            }
        }

        self.shutdown("channel closed").await;
    }

    async fn resolve(&self, id: RequestId, outcome: McpResult<Value>) {
        let call = self.pending.lock().await.calls.remove(&id);
        let Some(call) = call else {
            tracing::warn!(id = %id, "Dropping response for unknown or expired request id");
            return;
        };

        {
            let mut session = self.session.lock().await;
            if session.phase() == Phase::Initializing {
                if let Err(e) = session.apply(Direction::Incoming, Event::Response) {
                    tracing::debug!(error = %e, "Response outside the handshake table");
                }
            }
        }

        tracing::debug!(id = %id, method = %call.method, ok = outcome.is_ok(), "Response received");
        if call.slot.send(outcome).is_err() {
            tracing::debug!(id = %id, "Caller stopped waiting before the response arrived");
        }
    }

    async fn handle_incoming_request(self: &Arc<Self>, request: JsonRpcRequest) {
        let id = request.id.clone();

        let admitted = self
            .session
            .lock()
            .await
            .apply(Direction::Incoming, Event::Request(&request.method));
        if let Err(e) = admitted {
            tracing::warn!(method = %request.method, error = %e, "Rejecting out-of-phase request");
            let e = match e {
                McpError::ProtocolViolation(reason) if request.method != "initialize" => {
                    McpError::NotReady(reason)
                }
                other => other,
            };
            self.respond(id, &request.method, Err(e)).await;
            return;
        }

        // Liveness is answered by the session itself, whichever side asks.
        if request.method == "ping" {
            self.respond(id, "ping", Ok(Value::Object(Default::default())))
                .await;
            return;
        }

        let handler = self.handler.read().await.clone();
        let Some(handler) = handler else {
            let method = request.method.clone();
            self.respond(id, &method, Err(McpError::MethodNotFound(method.clone())))
                .await;
            return;
        };

        if request.method == "initialize" {
            // Inline, so the session records it before `initialized` is read.
            let params = request.params.clone();
            let outcome = handler.handle_request(request).await;
            if let Ok(result) = &outcome {
                self.record_server_negotiation(params, result).await;
            }
            self.respond(id, "initialize", outcome).await;
            return;
        }

        let this = Arc::clone(self);
        tokio::spawn(async move {
            let method = request.method.clone();
            let outcome = handler.handle_request(request).await;
            this.respond(id, &method, outcome).await;
        });
    }

    async fn record_server_negotiation(&self, params: Option<Value>, result: &Value) {
        let params: Option<InitializeParams> =
            params.and_then(|p| serde_json::from_value(p).ok());
        let version = result
            .get("protocolVersion")
            .and_then(Value::as_str)
            .map(str::to_string);
        if let (Some(params), Some(version)) = (params, version) {
            self.session.lock().await.record_negotiation(
                version,
                Some(params.client_info),
                PeerCapabilities::Client(params.capabilities),
            );
        }
    }

    async fn respond(&self, id: RequestId, method: &str, outcome: McpResult<Value>) {
        {
            let mut session = self.session.lock().await;
            let allowed = if method == "initialize" && session.phase() == Phase::Initializing {
                session.apply(Direction::Outgoing, Event::Response).map(|_| ())
            } else if session.is_closed() {
                Err(McpError::SessionClosed)
            } else {
                Ok(())
            };
            if let Err(e) = allowed {
                tracing::debug!(id = %id, method = %method, error = %e, "Not sending response");
                return;
            }
        }

        let message: JsonRpcMessage = match outcome {
            Ok(result) => JsonRpcResponse::new(id, result).into(),
            Err(e) => {
                tracing::debug!(id = %id, method = %method, error = %e, "Request failed");
                e.to_json_rpc_error(id).into()
            }
        };
        if let Err(e) = self.send(&message).await {
            tracing::warn!(method = %method, error = %e, "Failed to send response");
        }
    }

    async fn handle_incoming_notification(&self, notification: JsonRpcNotification) {
        let admitted = self
            .session
            .lock()
            .await
            .apply(Direction::Incoming, Event::Notification(&notification.method));
        if let Err(e) = admitted {
            tracing::warn!(
                method = %notification.method,
                error = %e,
                "Dropping out-of-phase notification"
            );
            return;
        }

        if is_initialized(&notification.method) {
            tracing::info!("Peer finished initialization");
        }

        let handler = self.handler.read().await.clone();
        match handler {
            Some(handler) => handler.handle_notification(notification).await,
            None => tracing::debug!(method = %notification.method, "No notification handler"),
        }
    }
}

fn preview(line: &str) -> &str {
    match line.char_indices().nth(120) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}
