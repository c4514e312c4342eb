//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the service shell.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Main HTTP listener.
    pub listener: ListenerConfig,

    /// Runtime telemetry sampler.
    pub runtime_metrics: RuntimeMetricsConfig,

    /// Readiness endpoint server.
    pub readiness: ReadinessConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
///
/// A zero read, write or idle timeout disables it; a zero shutdown timeout
/// lets the drain wait forever.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Port bound on all interfaces.
    pub port: u16,

    /// Time allowed to read request headers, in seconds.
    pub read_timeout_secs: u64,

    /// Time allowed to produce a response, in seconds.
    pub write_timeout_secs: u64,

    /// Time an idle keep-alive connection stays open, in seconds.
    pub idle_timeout_secs: u64,

    /// Bound on the graceful drain, in seconds.
    pub shutdown_timeout_secs: u64,

    /// Maximum size of request headers.
    pub max_header_bytes: usize,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            read_timeout_secs: 30,
            write_timeout_secs: 60,
            idle_timeout_secs: 120,
            shutdown_timeout_secs: 30,
            max_header_bytes: 1 << 20,
            max_connections: 10_000,
        }
    }
}

/// Runtime telemetry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeMetricsConfig {
    pub enabled: bool,

    /// Sampling interval in seconds.
    pub interval_secs: u64,
}

impl Default for RuntimeMetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
        }
    }
}

/// Readiness endpoint configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8081,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Expose the Prometheus scrape endpoint.
    pub metrics_enabled: bool,

    /// Address of the Prometheus scrape endpoint.
    pub metrics_address: String,

    /// Default log filter when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
            log_filter: "service_shell=info,tower_http=info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: ServiceConfig = toml::from_str(
            r#"
            [listener]
            port = 9000
            shutdown_timeout_secs = 0

            [readiness]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.port, 9000);
        assert_eq!(config.listener.shutdown_timeout_secs, 0);
        assert_eq!(config.listener.max_header_bytes, 1 << 20);
        assert!(!config.readiness.enabled);
        assert_eq!(config.readiness.port, 8081);
        assert_eq!(config.runtime_metrics.interval_secs, 30);
    }
}
