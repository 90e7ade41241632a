//! Prometheus Metrics for Workers, Tasks and Listeners.
//!
//! This module provides:
//!
//! - Gauges for pool size, queue size and listener totals
//! - Per-status transition counters fed by the system metrics listener
//! - A Prometheus recorder whose output is served at `GET /metrics`
//!
//! # Example
//!
//! ```rust,no_run
//! use taskhive_core::telemetry::metrics::HiveMetrics;
//!
//! HiveMetrics::set_workers_total(4);
//! HiveMetrics::record_task_status("success");
//! ```

use metrics::{counter, describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use std::collections::HashMap;

pub const WORKERS_TOTAL: &str = "taskhive_workers_total";
pub const TASKS_TOTAL: &str = "taskhive_tasks_total";
pub const LISTENERS_TOTAL: &str = "taskhive_listeners_total";
pub const LISTENERS_EVENTS_TOTAL: &str = "taskhive_listeners_events_total";
pub const WORKER_STATUS_TOTAL: &str = "taskhive_worker_status_total";
pub const TASK_STATUS_TOTAL: &str = "taskhive_task_status_total";
pub const ERRORS_TOTAL: &str = "taskhive_errors_total";

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether metrics collection is enabled
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Global labels to add to all metrics
    #[serde(default)]
    pub global_labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            global_labels: HashMap::new(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

/// Handle onto the installed Prometheus recorder, if any.
#[derive(Clone, Default)]
pub struct MetricsRegistry {
    prometheus_handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("prometheus_handle", &self.prometheus_handle.is_some())
            .finish()
    }
}

impl MetricsRegistry {
    /// A registry that renders nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Wrap an existing Prometheus handle.
    pub fn from_handle(handle: PrometheusHandle) -> Self {
        Self {
            prometheus_handle: Some(handle),
        }
    }

    /// Whether a recorder is attached.
    pub fn is_enabled(&self) -> bool {
        self.prometheus_handle.is_some()
    }

    /// Render all metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.prometheus_handle
            .as_ref()
            .map(|h| h.render())
            .unwrap_or_default()
    }
}

/// Initialize the metrics subsystem and install the global recorder.
///
/// # Errors
///
/// Returns an error if a global recorder is already installed.
pub fn init_metrics(config: &MetricsConfig, service_name: &str) -> anyhow::Result<MetricsRegistry> {
    if !config.enabled {
        return Ok(MetricsRegistry::disabled());
    }

    let mut builder = PrometheusBuilder::new();
    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key, value);
    }

    let handle = builder.install_recorder()?;
    register_metric_descriptions();

    tracing::info!(service_name = %service_name, "Metrics initialized");

    Ok(MetricsRegistry::from_handle(handle))
}

/// Register all metric descriptions.
pub fn register_metric_descriptions() {
    describe_gauge!(WORKERS_TOTAL, "Number of workers in the pool");
    describe_gauge!(TASKS_TOTAL, "Number of tasks held by the queue");
    describe_gauge!(LISTENERS_TOTAL, "Number of registered listeners");
    describe_gauge!(
        LISTENERS_EVENTS_TOTAL,
        "Number of distinct event subscriptions across listeners"
    );
    describe_counter!(WORKER_STATUS_TOTAL, "Worker status transitions by target status");
    describe_counter!(TASK_STATUS_TOTAL, "Task status transitions by target status");
    describe_counter!(ERRORS_TOTAL, "Errors by code, category and severity");
}

/// Domain metrics for the task/worker lifecycle.
pub struct HiveMetrics;

impl HiveMetrics {
    pub fn set_workers_total(count: usize) {
        gauge!(WORKERS_TOTAL).set(count as f64);
    }

    pub fn set_tasks_total(count: usize) {
        gauge!(TASKS_TOTAL).set(count as f64);
    }

    pub fn set_listeners_total(count: usize) {
        gauge!(LISTENERS_TOTAL).set(count as f64);
    }

    pub fn set_listeners_events_total(count: usize) {
        gauge!(LISTENERS_EVENTS_TOTAL).set(count as f64);
    }

    /// Count a worker entering `status`.
    pub fn record_worker_status(status: &str) {
        counter!(WORKER_STATUS_TOTAL, "status" => status.to_string()).increment(1);
    }

    /// Count a task entering `status`.
    pub fn record_task_status(status: &str) {
        counter!(TASK_STATUS_TOTAL, "status" => status.to_string()).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_config_defaults() {
        let config = MetricsConfig::default();
        assert!(config.enabled);
        assert!(config.global_labels.is_empty());
    }

    #[test]
    fn test_disabled_registry_renders_nothing() {
        let registry = MetricsRegistry::disabled();
        assert!(!registry.is_enabled());
        assert!(registry.render().is_empty());
    }

    #[test]
    fn test_hive_metrics_render() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let registry = MetricsRegistry::from_handle(recorder.handle());

        metrics::with_local_recorder(&recorder, || {
            HiveMetrics::set_workers_total(3);
            HiveMetrics::record_task_status("success");
            HiveMetrics::record_task_status("success");
        });

        let rendered = registry.render();
        assert!(rendered.contains("taskhive_workers_total 3"));
        assert!(rendered.contains("taskhive_task_status_total{status=\"success\"} 2"));
    }
}
