//! Client timeouts and identity.

use std::time::Duration;

use crate::types::{Implementation, CRATE_VERSION};

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Default per-call timeout when the caller does not pass one.
    pub call_timeout: Duration,
    pub handshake_timeout: Duration,
    /// `None` waits for frames indefinitely.
    pub read_timeout: Option<Duration>,
    /// How long `disconnect` waits for the server to exit before killing it.
    pub close_grace: Duration,
    pub client_info: Implementation,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            call_timeout: DEFAULT_CALL_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            read_timeout: None,
            close_grace: DEFAULT_CLOSE_GRACE,
            client_info: Implementation::new("toolwire", CRATE_VERSION),
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `TOOLWIRE_*_MS` variables. Unparseable values
    /// are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(d) = millis(&lookup, "TOOLWIRE_CALL_TIMEOUT_MS") {
            config.call_timeout = d;
        }
        if let Some(d) = millis(&lookup, "TOOLWIRE_HANDSHAKE_TIMEOUT_MS") {
            config.handshake_timeout = d;
        }
        if let Some(d) = millis(&lookup, "TOOLWIRE_READ_TIMEOUT_MS") {
            config.read_timeout = Some(d);
        }
        if let Some(d) = millis(&lookup, "TOOLWIRE_CLOSE_GRACE_MS") {
            config.close_grace = d;
        }
        config
    }

    pub fn with_client_info(mut self, client_info: Implementation) -> Self {
        self.client_info = client_info;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

fn millis(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = lookup(key)?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            tracing::warn!(var = key, value = %raw, "Ignoring non-numeric duration");
            None
        }
    }
}
