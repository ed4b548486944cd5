//! Tool registration and dispatch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::types::{McpError, McpResult, ToolCallResult, ToolDefinition};

use super::schema::InputSchema;

/// Anything that turns validated arguments into a payload.
///
/// Async closures `Fn(Value) -> impl Future<Output = anyhow::Result<Value>>`
/// implement this directly.
#[async_trait]
pub trait ToolHandler: Send + Sync + 'static {
    async fn call(&self, args: Value) -> anyhow::Result<Value>;
}

#[async_trait]
impl<F, Fut> ToolHandler for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    async fn call(&self, args: Value) -> anyhow::Result<Value> {
        (self)(args).await
    }
}

struct RegisteredTool {
    definition: ToolDefinition,
    schema: InputSchema,
    handler: Arc<dyn ToolHandler>,
}

/// Name-keyed table of tools. Built at startup, read-only once shared.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H: ToolHandler>(
        &mut self,
        name: &str,
        description: &str,
        schema: InputSchema,
        handler: H,
    ) -> McpResult<()> {
        if self.by_name.contains_key(name) {
            tracing::warn!(tool = %name, "Rejected duplicate tool registration");
            return Err(McpError::DuplicateTool(name.to_string()));
        }

        let definition = ToolDefinition {
            name: name.to_string(),
            description: (!description.is_empty()).then(|| description.to_string()),
            input_schema: schema.to_json_schema(),
        };
        self.by_name.insert(name.to_string(), self.tools.len());
        self.tools.push(RegisteredTool {
            definition,
            schema,
            handler: Arc::new(handler),
        });
        tracing::debug!(tool = %name, "Registered tool");
        Ok(())
    }

    /// Definitions in registration order.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validate `args` against the tool's schema and run its handler.
    ///
    /// Handler failures, including panics, come back as an error
    /// `ToolCallResult`; only lookup and validation failures are `Err`.
    pub async fn invoke(&self, name: &str, args: Value) -> McpResult<ToolCallResult> {
        let tool = self
            .by_name
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| McpError::UnknownTool(name.to_string()))?;

        tool.schema.validate(&args)?;

        let handler = Arc::clone(&tool.handler);
        let outcome = tokio::spawn(async move { handler.call(args).await }).await;

        let result = match outcome {
            Ok(Ok(payload)) => {
                tracing::debug!(tool = %name, "Tool call succeeded");
                ToolCallResult::success(payload)
            }
            Ok(Err(e)) => {
                tracing::warn!(tool = %name, error = %e, "Tool handler failed");
                ToolCallResult::error("handler_error", format!("{e:#}"))
            }
            Err(join) if join.is_panic() => {
                tracing::error!(tool = %name, "Tool handler panicked");
                ToolCallResult::error("handler_panic", format!("Tool '{name}' panicked"))
            }
            Err(join) => {
                tracing::warn!(tool = %name, error = %join, "Tool handler was cancelled");
                ToolCallResult::error("handler_cancelled", format!("Tool '{name}' was cancelled"))
            }
        };
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::schema::FieldType;
    use serde_json::json;

    fn weather_schema() -> InputSchema {
        InputSchema::new().required("city", FieldType::String, "City name")
    }

    async fn fake_weather(args: Value) -> anyhow::Result<Value> {
        let city = args["city"].as_str().unwrap_or_default();
        Ok(json!({ "location": format!("{city}, India") }))
    }

    async fn first(_args: Value) -> anyhow::Result<Value> {
        Ok(json!({"from": "first"}))
    }

    async fn second(_args: Value) -> anyhow::Result<Value> {
        Ok(json!({"from": "second"}))
    }

    async fn flaky(_args: Value) -> anyhow::Result<Value> {
        anyhow::bail!("Weather API error: connection refused")
    }

    async fn noop(_args: Value) -> anyhow::Result<Value> {
        Ok(Value::Null)
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register(
                "get_weather",
                "Get current weather for a city",
                weather_schema(),
                fake_weather,
            )
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_invoke_unknown_tool() {
        let err = registry().invoke("unknown_tool", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::UnknownTool(ref n) if n == "unknown_tool"));
    }

    #[tokio::test]
    async fn test_invoke_missing_required_argument() {
        let err = registry().invoke("get_weather", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::SchemaValidationError { ref field, .. } if field == "city"));
    }

    #[tokio::test]
    async fn test_invoke_success() {
        let result = registry()
            .invoke("get_weather", json!({"city": "Mumbai"}))
            .await
            .unwrap();
        assert!(!result.is_error());
        assert_eq!(result.payload()["location"], "Mumbai, India");
    }

    #[tokio::test]
    async fn test_duplicate_registration_keeps_first() {
        let mut registry = ToolRegistry::new();
        let schema = InputSchema::new().required("query", FieldType::String, "");
        registry
            .register("search", "first", schema.clone(), first)
            .unwrap();
        let err = registry
            .register("search", "second", schema, second)
            .unwrap_err();
        assert!(matches!(err, McpError::DuplicateTool(_)));
        assert_eq!(registry.len(), 1);

        let result = registry.invoke("search", json!({"query": "mcp"})).await.unwrap();
        assert_eq!(result.payload()["from"], "first");
        assert_eq!(registry.list_tools()[0].description.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn test_handler_failure_becomes_error_result() {
        let mut registry = ToolRegistry::new();
        registry
            .register("flaky", "", InputSchema::new(), flaky)
            .unwrap();
        let result = registry.invoke("flaky", json!({})).await.unwrap();
        assert!(result.is_error());
        assert_eq!(
            result.error_message().as_deref(),
            Some("Weather API error: connection refused")
        );
        assert_eq!(result.payload()["kind"], "handler_error");
    }

    #[tokio::test]
    async fn test_handler_panic_becomes_error_result() {
        struct Panics;

        #[async_trait]
        impl ToolHandler for Panics {
            async fn call(&self, _args: Value) -> anyhow::Result<Value> {
                panic!("boom");
            }
        }

        let mut registry = ToolRegistry::new();
        registry
            .register("panics", "", InputSchema::new(), Panics)
            .unwrap();
        let result = registry.invoke("panics", json!({})).await.unwrap();
        assert!(result.is_error());
        assert_eq!(result.payload()["kind"], "handler_panic");

        // The registry is still usable afterwards.
        assert!(registry.invoke("panics", json!({})).await.is_ok());
    }

    #[test]
    fn test_list_tools_order_and_schema() {
        let mut registry = registry();
        registry
            .register(
                "web_search",
                "Search the web",
                InputSchema::new().required("query", FieldType::String, ""),
                noop,
            )
            .unwrap();
        let names: Vec<String> = registry.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["get_weather", "web_search"]);
        assert_eq!(
            registry.list_tools()[0].input_schema["required"],
            json!(["city"])
        );
        assert!(registry.contains("web_search"));
        assert!(!registry.is_empty());
    }
}
