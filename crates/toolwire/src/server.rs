//! Tool server: binds a registry to a channel and answers until the peer hangs up.

use std::sync::Arc;

use crate::protocol::{Correlator, NegotiatedCapabilities, ProtocolHandler};
use crate::session::Role;
use crate::tools::ToolRegistry;
use crate::transport::Channel;
use crate::types::{Implementation, McpResult, ServerCapabilities};

pub struct McpServer {
    registry: Arc<ToolRegistry>,
    server_info: Implementation,
    capabilities: ServerCapabilities,
    instructions: Option<String>,
}

impl McpServer {
    /// The registry is frozen from here on.
    pub fn new(registry: ToolRegistry, server_info: Implementation) -> Self {
        Self {
            registry: Arc::new(registry),
            server_info,
            capabilities: ServerCapabilities::default(),
            instructions: None,
        }
    }

    /// Capabilities advertised in the `initialize` result. Empty by default.
    pub fn with_capabilities(mut self, capabilities: ServerCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Serve one session on `channel`. Returns once the peer closes its end.
    pub async fn serve(&self, channel: Channel) -> McpResult<()> {
        let (reader, writer, _process) = channel.split();

        let negotiation =
            NegotiatedCapabilities::new(self.server_info.clone(), self.capabilities.clone())
                .with_instructions(self.instructions.clone());
        let handler = Arc::new(ProtocolHandler::new(Arc::clone(&self.registry), negotiation));

        let correlator = Arc::new(Correlator::new(Role::Server, writer));
        correlator.set_handler(handler.clone()).await;

        tracing::info!(
            server = %self.server_info.name,
            version = %self.server_info.version,
            tools = self.registry.len(),
            "MCP server started"
        );

        Arc::clone(&correlator).dispatch_incoming(reader).await;

        tracing::info!(
            shutdown_requested = handler.shutdown_requested(),
            "Peer closed the channel, server stopping"
        );
        Ok(())
    }

    /// Serve on this process's stdin/stdout.
    pub async fn serve_stdio(&self) -> McpResult<()> {
        self.serve(Channel::stdio()).await
    }
}
