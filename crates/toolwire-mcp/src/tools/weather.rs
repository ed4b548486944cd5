//! `get_weather`: current conditions from a wttr.in-compatible service.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use toolwire::{FieldType, InputSchema, ToolHandler};

use crate::config::ToolConfig;

pub const NAME: &str = "get_weather";
pub const DESCRIPTION: &str = "Get current weather for a city";

pub struct WeatherTool {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct WttrReport {
    current_condition: Vec<CurrentCondition>,
    nearest_area: Vec<NearestArea>,
}

#[derive(Debug, Deserialize)]
struct CurrentCondition {
    #[serde(rename = "temp_C")]
    temp_c: String,
    #[serde(rename = "temp_F")]
    temp_f: String,
    #[serde(rename = "FeelsLikeC")]
    feels_like_c: String,
    humidity: String,
    #[serde(rename = "windspeedKmph")]
    windspeed_kmph: String,
    #[serde(rename = "weatherDesc")]
    weather_desc: Vec<TextValue>,
}

#[derive(Debug, Deserialize)]
struct NearestArea {
    #[serde(rename = "areaName")]
    area_name: Vec<TextValue>,
    country: Vec<TextValue>,
}

#[derive(Debug, Deserialize)]
struct TextValue {
    value: String,
}

fn first(values: &[TextValue]) -> &str {
    values.first().map(|v| v.value.as_str()).unwrap_or("")
}

impl WeatherTool {
    pub fn new(config: &ToolConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.weather_timeout)
            .build()
            .context("building weather HTTP client")?;
        Ok(Self {
            client,
            base_url: config.weather_url.clone(),
        })
    }

    pub fn schema() -> InputSchema {
        InputSchema::new().required("city", FieldType::String, "City name, e.g. \"Mumbai\"")
    }

    fn report_url(&self, city: &str) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .with_context(|| format!("invalid weather URL '{}'", self.base_url))?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("weather URL '{}' cannot take a path", self.base_url))?
            .pop_if_empty()
            .push(city);
        url.query_pairs_mut().append_pair("format", "j1");
        Ok(url)
    }

    pub async fn fetch(&self, city: &str) -> Result<Value> {
        let url = self.report_url(city)?;
        tracing::debug!(%url, "Fetching weather");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .context("Weather API error")?;

        if !resp.status().is_success() {
            anyhow::bail!("Could not fetch weather for {city}: HTTP {}", resp.status());
        }

        let report: WttrReport = resp
            .json()
            .await
            .context("Weather API returned an unexpected body")?;
        summarize(&report).with_context(|| format!("Could not fetch weather for {city}"))
    }
}

fn summarize(report: &WttrReport) -> Result<Value> {
    let current = report
        .current_condition
        .first()
        .context("no current conditions in report")?;
    let area = report
        .nearest_area
        .first()
        .context("no area in report")?;

    Ok(json!({
        "location": format!("{}, {}", first(&area.area_name), first(&area.country)),
        "temperature": format!("{}°C / {}°F", current.temp_c, current.temp_f),
        "condition": first(&current.weather_desc),
        "humidity": format!("{}%", current.humidity),
        "wind": format!("{} km/h", current.windspeed_kmph),
        "feels_like": format!("{}°C", current.feels_like_c),
    }))
}

#[async_trait]
impl ToolHandler for WeatherTool {
    async fn call(&self, args: Value) -> Result<Value> {
        let city = args["city"]
            .as_str()
            .context("city must be a string")?
            .trim();
        if city.is_empty() {
            anyhow::bail!("city must not be empty");
        }
        self.fetch(city).await
    }
}
