//! Toolwire: Model Context Protocol client/server core.
//!
//! Newline-delimited JSON-RPC over a subordinate process's stdio: the codec
//! and channel in [`transport`], request correlation and the server dispatcher
//! in [`protocol`], the phase machine in [`session`] and the tool table in
//! [`tools`]. [`McpClient`] and [`McpServer`] put them together.

pub mod client;
pub mod config;
pub mod protocol;
pub mod server;
pub mod session;
pub mod tools;
pub mod transport;
pub mod types;

pub use client::McpClient;
pub use config::ClientConfig;
pub use protocol::{Correlator, MessageHandler, ProtocolHandler};
pub use server::McpServer;
pub use session::{Phase, Role, Session};
pub use tools::{FieldType, InputSchema, ToolHandler, ToolRegistry};
pub use transport::{Channel, ServerCommand};
pub use types::*;
