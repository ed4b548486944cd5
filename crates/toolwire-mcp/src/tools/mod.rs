//! Tools served by `toolwire-mcp`.

pub mod weather;
pub mod web_search;

pub use weather::WeatherTool;
pub use web_search::WebSearchTool;

use toolwire::ToolRegistry;

use crate::config::ToolConfig;

/// Registry with every bundled tool, in advertisement order.
pub fn build_registry(config: &ToolConfig) -> anyhow::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(
        weather::NAME,
        weather::DESCRIPTION,
        WeatherTool::schema(),
        WeatherTool::new(config)?,
    )?;
    registry.register(
        web_search::NAME,
        web_search::DESCRIPTION,
        WebSearchTool::schema(),
        WebSearchTool::new(config)?,
    )?;
    Ok(registry)
}
