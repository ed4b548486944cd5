//! Toolwire MCP: weather and web-search tool server, plus a stdio client for it.

pub mod config;
pub mod repl;
pub mod tools;

pub use config::ToolConfig;
pub use tools::build_registry;

use toolwire::{Implementation, McpServer, CRATE_VERSION};

pub const SERVER_NAME: &str = "multi-tool-server";

/// The server `toolwire-mcp serve` runs.
pub fn build_server(config: &ToolConfig) -> anyhow::Result<McpServer> {
    let registry = build_registry(config)?;
    Ok(McpServer::new(
        registry,
        Implementation::new(SERVER_NAME, CRATE_VERSION),
    ))
}
