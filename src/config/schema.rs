//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the framework.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct FrameworkConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Handler deadline defaults.
    pub timeouts: TimeoutConfig,

    /// Responses committed on fault and timeout.
    pub responses: ResponseConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest request body buffered before dispatch, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Deadline applied by `App::timeout` when the route gives none, in milliseconds.
    pub handler_ms: u64,
}

impl TimeoutConfig {
    /// The default handler deadline as a `Duration`.
    pub fn handler(&self) -> Duration {
        Duration::from_millis(self.handler_ms)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { handler_ms: 1000 }
    }
}

/// Status and body sent when a handler faults or times out.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// Status sent when a handler panics.
    pub fault_status: u16,

    /// Body sent when a handler panics.
    pub fault_body: String,

    /// Status sent when a handler misses its deadline.
    pub timeout_status: u16,

    /// Body sent when a handler misses its deadline.
    pub timeout_body: String,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            fault_status: 500,
            fault_body: "panic".to_string(),
            timeout_status: 500,
            timeout_body: "time out".to_string(),
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
