//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration document.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
}

/// Everything under `[server]`.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    pub listener: ListenerConfig,

    pub timeouts: TimeoutsConfig,

    pub logger: LoggerConfig,

    /// Access logging is enabled only when this table is present.
    pub access_log: Option<AccessLogConfig>,

    pub stats: StatsConfig,

    /// Expose `/debug/runtime`.
    pub enable_debug: bool,

    /// Upper bound for responses decoded by the JSON bridge (0 = unlimited).
    pub max_response_size_bytes: u64,
}

impl ServerConfig {
    pub fn max_response_size(&self) -> Option<usize> {
        (self.max_response_size_bytes > 0).then_some(self.max_response_size_bytes as usize)
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// IP address to bind (e.g., "0.0.0.0").
    pub address: String,

    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0".to_string(),
            port: 50051,
        }
    }
}

/// Call timeouts. A value of 0 disables the deadline.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    pub default_ms: u64,

    pub overrides: Vec<TimeoutOverride>,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            default_ms: 15_000,
            overrides: Vec::new(),
        }
    }
}

impl TimeoutsConfig {
    /// Longest configured timeout, or `None` if any call may run unbounded.
    pub fn maximum(&self) -> Option<Duration> {
        let mut max = self.default_ms;
        for o in &self.overrides {
            if max == 0 || o.timeout_ms == 0 {
                return None;
            }
            max = max.max(o.timeout_ms);
        }
        (max > 0).then(|| Duration::from_millis(max))
    }
}

/// Per-method timeout override.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TimeoutOverride {
    pub service: String,
    pub method: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,

    /// Human-readable output instead of JSON.
    pub pretty: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            pretty: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AccessLogConfig {
    /// Numeric status codes to log. Empty logs every call.
    pub status_code_filters: Vec<i32>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReporterKind {
    #[default]
    Null,
    Log,
    Prometheus,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatsConfig {
    pub reporter: ReporterKind,

    pub flush_interval_ms: u64,

    /// Prefix of every metric name.
    pub prefix: String,

    pub runtime: Option<RuntimeStatsConfig>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            reporter: ReporterKind::Null,
            flush_interval_ms: 1_000,
            prefix: "gateway".to_string(),
            runtime: None,
        }
    }
}

impl StatsConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeStatsConfig {
    pub collection_interval_ms: u64,
}

impl Default for RuntimeStatsConfig {
    fn default() -> Self {
        Self {
            collection_interval_ms: 10_000,
        }
    }
}

impl RuntimeStatsConfig {
    pub fn collection_interval(&self) -> Duration {
        Duration::from_millis(self.collection_interval_ms)
    }
}
