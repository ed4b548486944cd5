//! Configuration loading and resolution for the bundled tools.

use std::time::Duration;

pub const DEFAULT_WEATHER_URL: &str = "https://wttr.in";
pub const DEFAULT_SEARCH_URL: &str = "https://google.serper.dev/search";

/// Where the tools send their HTTP requests, and with which credentials.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    pub weather_url: String,
    pub search_url: String,
    pub serper_api_key: Option<String>,
    pub weather_timeout: Duration,
    pub search_timeout: Duration,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            weather_url: DEFAULT_WEATHER_URL.to_string(),
            search_url: DEFAULT_SEARCH_URL.to_string(),
            serper_api_key: None,
            weather_timeout: Duration::from_secs(5),
            search_timeout: Duration::from_secs(10),
        }
    }
}

impl ToolConfig {
    /// Explicit values win, then the environment, then the defaults.
    pub fn resolve(
        weather_url: Option<&str>,
        search_url: Option<&str>,
        serper_api_key: Option<&str>,
    ) -> Self {
        Self::resolve_with(weather_url, search_url, serper_api_key, |key| {
            std::env::var(key).ok()
        })
    }

    fn resolve_with(
        weather_url: Option<&str>,
        search_url: Option<&str>,
        serper_api_key: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let pick = |explicit: Option<&str>, key: &str| {
            explicit
                .map(str::to_string)
                .or_else(|| env(key))
                .filter(|v| !v.trim().is_empty())
        };

        let defaults = Self::default();
        Self {
            weather_url: pick(weather_url, "TOOLWIRE_WEATHER_URL")
                .unwrap_or(defaults.weather_url),
            search_url: pick(search_url, "TOOLWIRE_SEARCH_URL").unwrap_or(defaults.search_url),
            serper_api_key: pick(serper_api_key, "SERPER_API_KEY"),
            ..defaults
        }
    }
}
