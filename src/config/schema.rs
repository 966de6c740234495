//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Config {
    /// Admission and timeout settings.
    pub dispatcher: DispatcherConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Maximum tasks running at once. Must be positive.
    pub concurrency_limit: usize,

    /// Per-task timeout in milliseconds. Zero is allowed.
    pub timeout_ms: u64,

    /// Cancel a task's token when its caller times out.
    pub cancel_on_timeout: bool,
}

impl DispatcherConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: 8,
            timeout_ms: 1000,
            cancel_on_timeout: true,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
