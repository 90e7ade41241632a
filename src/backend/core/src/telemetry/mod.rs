//! Telemetry: Logging and Metrics Infrastructure.
//!
//! This module provides the telemetry stack for Taskhive:
//!
//! - **Logging**: Structured JSON/pretty logging through `tracing`
//! - **Metrics**: Prometheus gauges and counters for workers, tasks and listeners
//!
//! # Example
//!
//! ```rust,no_run
//! use taskhive_core::telemetry::{TelemetryConfig, init_telemetry};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = TelemetryConfig::default();
//! let handle = init_telemetry(&config)?;
//! # Ok(())
//! # }
//! ```

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogFormat, LoggingConfig, SpanEventConfig};
pub use metrics::{init_metrics, HiveMetrics, MetricsConfig, MetricsRegistry};

use serde::Deserialize;

/// Unified telemetry configuration (the `observability` config section).
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Service name for identification in logs and metrics
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Environment (development, staging, production)
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            environment: default_environment(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

fn default_service_name() -> String {
    "taskhive".to_string()
}

fn default_environment() -> String {
    std::env::var("TASKHIVE_ENVIRONMENT").unwrap_or_else(|_| "development".to_string())
}

/// Initialize logging and metrics.
///
/// Call once at startup; a second call fails because the global subscriber
/// and recorder are already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> anyhow::Result<TelemetryHandle> {
    init_logging(&config.logging, &config.environment)?;
    let metrics = init_metrics(&config.metrics, &config.service_name)?;

    Ok(TelemetryHandle { metrics })
}

/// Handle for the installed telemetry components.
#[derive(Debug, Clone)]
pub struct TelemetryHandle {
    /// Metrics handle used by the `/metrics` endpoint
    pub metrics: MetricsRegistry,
}
