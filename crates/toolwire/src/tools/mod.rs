//! Tool registry, input schemas and handler interface.

pub mod registry;
pub mod schema;

pub use registry::{ToolHandler, ToolRegistry};
pub use schema::{FieldSpec, FieldType, InputSchema};
