//! System listeners registered locked at startup.

use crate::error::Result;
use crate::telemetry::HiveMetrics;

use super::event::{Event, EventKind};
use super::registry::ListenerRegistry;

/// Logs every event.
pub const LOGGING_LISTENER: &str = "workers.logging";

/// Counts worker and task status transitions.
pub const METRICS_LISTENER: &str = "workers.metrics";

/// Register the logging and metrics listeners.
pub fn register_system_listeners(registry: &ListenerRegistry) -> Result<()> {
    registry.register_locked(LOGGING_LISTENER, &[EventKind::Any], log_event)?;
    registry.register_locked(
        METRICS_LISTENER,
        &[EventKind::WorkerStatusChanged, EventKind::TaskStatusChanged],
        record_event,
    )?;
    Ok(())
}

fn log_event(event: &Event) {
    if event.kind == EventKind::TaskExecuteStop {
        if let Some(error) = event.field("error") {
            tracing::error!(
                event = %event.kind,
                task_id = event.field("task_id").unwrap_or_default(),
                task_name = event.field("task_name").unwrap_or_default(),
                worker_id = event.field("worker_id").unwrap_or_default(),
                error = %error,
                "Task ended with an error"
            );
            return;
        }
    }

    tracing::debug!(event = %event.kind, payload = %event.payload, "Event fired");
}

fn record_event(event: &Event) {
    let Some(status) = event.field("status") else {
        return;
    };
    match event.kind {
        EventKind::WorkerStatusChanged => HiveMetrics::record_worker_status(status),
        EventKind::TaskStatusChanged => HiveMetrics::record_task_status(status),
        _ => {}
    }
}
