//! `web_search`: Google results through the Serper API.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use toolwire::{FieldType, InputSchema, ToolHandler};

use crate::config::ToolConfig;

pub const NAME: &str = "web_search";
pub const DESCRIPTION: &str = "Search the web using Serper";

const DEFAULT_NUM_RESULTS: u64 = 5;
const MAX_NUM_RESULTS: u64 = 20;

pub struct WebSearchTool {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SearchHit>,
    #[serde(rename = "knowledgeGraph")]
    knowledge_graph: Option<KnowledgeGraph>,
}

#[derive(Debug, Deserialize, Serialize)]
struct SearchHit {
    title: Option<String>,
    link: Option<String>,
    snippet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KnowledgeGraph {
    #[serde(default)]
    description: Option<String>,
}

impl WebSearchTool {
    pub fn new(config: &ToolConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.search_timeout)
            .build()
            .context("building search HTTP client")?;
        Ok(Self {
            client,
            url: config.search_url.clone(),
            api_key: config.serper_api_key.clone(),
        })
    }

    pub fn schema() -> InputSchema {
        InputSchema::new()
            .required("query", FieldType::String, "Search query")
            .optional(
                "num_results",
                FieldType::Integer,
                "Number of results to return (default 5)",
            )
    }

    pub async fn search(&self, query: &str, num: u64) -> Result<Value> {
        let Some(api_key) = self.api_key.as_deref() else {
            anyhow::bail!("SERPER_API_KEY not configured");
        };

        tracing::debug!(query = %query, num, "Searching the web");
        let resp = self
            .client
            .post(&self.url)
            .header("X-API-KEY", api_key)
            .json(&json!({ "q": query, "num": num }))
            .send()
            .await
            .context("Web search error")?;

        if !resp.status().is_success() {
            anyhow::bail!("Serper API error: {}", resp.status());
        }

        let body: SerperResponse = resp
            .json()
            .await
            .context("Serper API returned an unexpected body")?;
        Ok(shape(query, num, body))
    }
}

fn shape(query: &str, num: u64, body: SerperResponse) -> Value {
    let results: Vec<SearchHit> = body.organic.into_iter().take(num as usize).collect();
    // Present but empty knowledge graph reads as "", absent as null.
    let knowledge = body
        .knowledge_graph
        .map(|kg| kg.description.unwrap_or_default());
    json!({
        "query": query,
        "results": results,
        "knowledge_graph": knowledge,
    })
}

#[async_trait]
impl ToolHandler for WebSearchTool {
    async fn call(&self, args: Value) -> Result<Value> {
        let query = args["query"].as_str().context("query must be a string")?;
        let num = args["num_results"]
            .as_u64()
            .unwrap_or(DEFAULT_NUM_RESULTS)
            .clamp(1, MAX_NUM_RESULTS);
        self.search(query, num).await
    }
}
