//! Settings schema. Every section deserializes with defaults so a partial
//! settings file is valid.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeatherSettings {
    pub server: ServerSettings,
    pub polling: PollingSettings,
    pub source: SourceSettings,
    pub logging: LoggingSettings,
}

impl WeatherSettings {
    /// Reject values that would make the service unusable.
    pub fn validate(&self) -> Result<()> {
        if self.polling.interval_ms == 0 {
            return Err(SettingsError::invalid("polling.intervalMs", "must be greater than zero"));
        }
        if self.server.max_send_queue == 0 {
            return Err(SettingsError::invalid("server.maxSendQueue", "must be greater than zero"));
        }
        if self.server.heartbeat_interval_ms == 0 {
            return Err(SettingsError::invalid(
                "server.heartbeatIntervalMs",
                "must be greater than zero",
            ));
        }
        if self.server.client_timeout_ms <= self.server.heartbeat_interval_ms {
            return Err(SettingsError::invalid(
                "server.clientTimeoutMs",
                format!(
                    "must exceed server.heartbeatIntervalMs ({} <= {})",
                    self.server.client_timeout_ms, self.server.heartbeat_interval_ms
                ),
            ));
        }
        if self.source.kind == SourceKind::Http && self.source.base_url.is_none() {
            return Err(SettingsError::invalid(
                "source.baseUrl",
                "is required when source.kind is \"http\"",
            ));
        }
        Ok(())
    }
}

/// WebSocket server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port. `0` picks a free port.
    pub port: u16,
    /// Per-connection outbound queue length.
    pub max_send_queue: usize,
    /// Interval between WebSocket pings.
    pub heartbeat_interval_ms: u64,
    /// A client with no pong for this long is dropped.
    pub client_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_send_queue: 256,
            heartbeat_interval_ms: 30_000,
            client_timeout_ms: 90_000,
        }
    }
}

/// Upstream polling cadence.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PollingSettings {
    pub interval_ms: u64,
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self { interval_ms: 5_000 }
    }
}

/// Which weather source backs the service.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Built-in random readings, no network access.
    #[default]
    Simulated,
    /// Remote HTTP/JSON weather service.
    Http,
}

impl std::str::FromStr for SourceKind {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "simulated" => Ok(Self::Simulated),
            "http" => Ok(Self::Http),
            _ => Err(SettingsError::UnknownSourceKind(s.to_string())),
        }
    }
}

/// Weather source settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceSettings {
    pub kind: SourceKind,
    /// Base URL of the HTTP weather service.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub request_timeout_ms: u64,
    /// Seed for the simulated source. Random when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            kind: SourceKind::Simulated,
            base_url: None,
            request_timeout_ms: 10_000,
            seed: None,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level directive; `RUST_LOG` wins when set.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
