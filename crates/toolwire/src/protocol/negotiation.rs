//! Server-side capability negotiation during initialization.

use crate::types::{
    is_supported_version, ClientCapabilities, Implementation, InitializeParams, InitializeResult,
    McpError, McpResult, ServerCapabilities, MCP_VERSION,
};

/// What the server advertises, plus what it learned from the client.
#[derive(Debug, Clone)]
pub struct NegotiatedCapabilities {
    pub server_info: Implementation,
    pub server: ServerCapabilities,
    pub instructions: Option<String>,
    pub client: Option<ClientCapabilities>,
    pub client_info: Option<Implementation>,
    pub protocol_version: Option<String>,
}

impl NegotiatedCapabilities {
    pub fn new(server_info: Implementation, server: ServerCapabilities) -> Self {
        Self {
            server_info,
            server,
            instructions: None,
            client: None,
            client_info: None,
            protocol_version: None,
        }
    }

    pub fn with_instructions(mut self, instructions: Option<String>) -> Self {
        self.instructions = instructions;
        self
    }

    /// Answer `initialize`. A version this crate knows is echoed back;
    /// anything else gets [`MCP_VERSION`] and the client decides.
    pub fn negotiate(&mut self, params: InitializeParams) -> McpResult<InitializeResult> {
        if self.protocol_version.is_some() {
            return Err(McpError::AlreadyInitialized);
        }

        let version = if is_supported_version(&params.protocol_version) {
            params.protocol_version.clone()
        } else {
            tracing::warn!(
                requested = %params.protocol_version,
                offered = MCP_VERSION,
                "Client requested an unknown protocol version"
            );
            MCP_VERSION.to_string()
        };

        tracing::info!(
            client = %params.client_info.name,
            version = %params.client_info.version,
            protocol_version = %version,
            "Initialize from client"
        );

        self.client = Some(params.capabilities);
        self.client_info = Some(params.client_info);
        self.protocol_version = Some(version.clone());

        Ok(InitializeResult {
            protocol_version: version,
            capabilities: self.server.clone(),
            server_info: Some(self.server_info.clone()),
            instructions: self.instructions.clone(),
        })
    }
}
