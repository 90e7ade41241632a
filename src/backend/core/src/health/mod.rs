//! Health reporting.
//!
//! A single report derived from the dispatcher:
//! - **Unhealthy** when the dispatch loop is not running (`503`)
//! - **Degraded** when tasks wait but the pool has no workers
//! - **Healthy** otherwise

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::jobs::QueueStats;
use crate::orchestrator::{Dispatcher, WorkerCounts};

// ═══════════════════════════════════════════════════════════════════════════════
// Health Status
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Running, but unable to make progress on waiting tasks
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy)
    }

    /// Check if the status is at least partially operational.
    pub fn is_operational(&self) -> bool {
        matches!(self, Self::Healthy | Self::Degraded)
    }

    /// Convert to HTTP status code.
    pub fn to_http_status(&self) -> u16 {
        match self {
            Self::Healthy | Self::Degraded => 200,
            Self::Unhealthy => 503,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Health Report
// ═══════════════════════════════════════════════════════════════════════════════

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: u64,
    /// Whether the dispatch loop is running
    pub running: bool,
    pub workers: WorkerCounts,
    pub queue: QueueStats,
    pub listeners: usize,
    /// Handler executions not yet finished
    pub executions_in_flight: usize,
}

impl HealthReport {
    pub fn from_dispatcher(dispatcher: &Dispatcher, uptime: Duration) -> Self {
        let running = dispatcher.is_running();
        let workers = dispatcher.pool().counts();
        let queue = dispatcher.queue().stats();

        let status = if !running {
            HealthStatus::Unhealthy
        } else if workers.total == 0 && queue.waiting > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self {
            status,
            service: "taskhive".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            timestamp: Utc::now(),
            uptime_secs: uptime.as_secs(),
            running,
            workers,
            queue,
            listeners: dispatcher.listeners().len(),
            executions_in_flight: dispatcher.executions_in_flight(),
        }
    }

    pub fn is_operational(&self) -> bool {
        self.status.is_operational()
    }

    pub fn http_status(&self) -> u16 {
        self.status.to_http_status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkersConfig;
    use crate::jobs::{HandlerRegistry, Task};

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(&WorkersConfig::default(), HandlerRegistry::with_builtins())
    }

    #[test]
    fn test_status_http_mapping() {
        assert_eq!(HealthStatus::Healthy.to_http_status(), 200);
        assert_eq!(HealthStatus::Degraded.to_http_status(), 200);
        assert_eq!(HealthStatus::Unhealthy.to_http_status(), 503);
        assert!(!HealthStatus::Unhealthy.is_operational());
    }

    #[test]
    fn test_not_running_is_unhealthy() {
        let dispatcher = dispatcher();
        let report = HealthReport::from_dispatcher(&dispatcher, Duration::from_secs(3));

        assert!(!report.running);
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert_eq!(report.uptime_secs, 3);
        assert_eq!(report.http_status(), 503);
    }

    #[test]
    fn test_report_counts() {
        let dispatcher = dispatcher();
        dispatcher.scale_to(2).unwrap();
        dispatcher.submit(Task::new("noop")).unwrap();

        let report = HealthReport::from_dispatcher(&dispatcher, Duration::ZERO);
        assert_eq!(report.workers.total, 2);
        assert_eq!(report.queue.waiting, 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["service"], "taskhive");
    }
}
