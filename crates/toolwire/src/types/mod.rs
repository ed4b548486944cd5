//! All MCP data types shared by the client and server roles.

pub mod capabilities;
pub mod error;
pub mod message;
pub mod notification;
pub mod request;
pub mod response;

pub use capabilities::*;
pub use error::*;
pub use message::*;
pub use notification::{is_initialized, LogLevel, LogMessageParams};
pub use request::*;
pub use response::*;
