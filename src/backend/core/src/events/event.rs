//! Lifecycle events fired by the worker pool and the listener registry.
//!
//! This module provides:
//! - `EventKind`, the closed set of event names plus the `*` wildcard
//! - `Event`, a fired event with its JSON payload and fire timestamp
//! - Constructors building the payload for each worker/task/listener event

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{HiveError, Result};
use crate::jobs::{Task, TaskOutcome, TaskStatus, Worker, WorkerId, WorkerStatus};

// =============================================================================
// Event Kinds
// =============================================================================

/// Names of the events listeners can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "*")]
    Any,
    #[serde(rename = "worker.add")]
    WorkerAdd,
    #[serde(rename = "worker.remove")]
    WorkerRemove,
    #[serde(rename = "worker.status_changed")]
    WorkerStatusChanged,
    #[serde(rename = "task.add")]
    TaskAdd,
    #[serde(rename = "task.remove")]
    TaskRemove,
    #[serde(rename = "task.execute_start")]
    TaskExecuteStart,
    #[serde(rename = "task.execute_stop")]
    TaskExecuteStop,
    #[serde(rename = "task.status_changed")]
    TaskStatusChanged,
    #[serde(rename = "task.success")]
    TaskSuccess,
    #[serde(rename = "task.fail")]
    TaskFail,
    #[serde(rename = "task.timeout")]
    TaskTimeout,
    #[serde(rename = "task.kill")]
    TaskKill,
    #[serde(rename = "listener.add")]
    ListenerAdd,
    #[serde(rename = "listener.remove")]
    ListenerRemove,
}

impl EventKind {
    pub const ALL: [EventKind; 15] = [
        Self::Any,
        Self::WorkerAdd,
        Self::WorkerRemove,
        Self::WorkerStatusChanged,
        Self::TaskAdd,
        Self::TaskRemove,
        Self::TaskExecuteStart,
        Self::TaskExecuteStop,
        Self::TaskStatusChanged,
        Self::TaskSuccess,
        Self::TaskFail,
        Self::TaskTimeout,
        Self::TaskKill,
        Self::ListenerAdd,
        Self::ListenerRemove,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "*",
            Self::WorkerAdd => "worker.add",
            Self::WorkerRemove => "worker.remove",
            Self::WorkerStatusChanged => "worker.status_changed",
            Self::TaskAdd => "task.add",
            Self::TaskRemove => "task.remove",
            Self::TaskExecuteStart => "task.execute_start",
            Self::TaskExecuteStop => "task.execute_stop",
            Self::TaskStatusChanged => "task.status_changed",
            Self::TaskSuccess => "task.success",
            Self::TaskFail => "task.fail",
            Self::TaskTimeout => "task.timeout",
            Self::TaskKill => "task.kill",
            Self::ListenerAdd => "listener.add",
            Self::ListenerRemove => "listener.remove",
        }
    }

    /// Parse a comma separated list such as `"task.success, task.fail"`.
    pub fn parse_list(list: &str) -> Result<Vec<EventKind>> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = HiveError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| HiveError::unknown_event(s))
    }
}

// =============================================================================
// Event
// =============================================================================

/// Unique identifier for a fired event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

/// A fired event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub kind: EventKind,
    pub payload: serde_json::Value,
    pub fired_at: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind, payload: serde_json::Value) -> Self {
        Self {
            id: EventId::new(),
            kind,
            payload,
            fired_at: Utc::now(),
        }
    }

    /// String field of the payload, if present.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(|v| v.as_str())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Worker events
    // ─────────────────────────────────────────────────────────────────────────

    pub fn worker_add(worker: &Worker) -> Self {
        Self::new(
            EventKind::WorkerAdd,
            json!({ "worker_id": worker.id, "status": worker.status }),
        )
    }

    pub fn worker_remove(worker: &Worker) -> Self {
        Self::new(
            EventKind::WorkerRemove,
            json!({
                "worker_id": worker.id,
                "status": worker.status,
                "task_id": worker.task_id(),
            }),
        )
    }

    pub fn worker_status_changed(worker_id: WorkerId, status: WorkerStatus, prev: WorkerStatus) -> Self {
        Self::new(
            EventKind::WorkerStatusChanged,
            json!({ "worker_id": worker_id, "status": status, "prev_status": prev }),
        )
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Task events
    // ─────────────────────────────────────────────────────────────────────────

    fn task_payload(task: &Task) -> serde_json::Value {
        json!({
            "task_id": task.id,
            "task_name": task.name,
            "status": task.status,
            "attempts": task.attempts,
        })
    }

    fn task_event(kind: EventKind, task: &Task) -> Self {
        Self::new(kind, Self::task_payload(task))
    }

    pub fn task_add(task: &Task) -> Self {
        Self::task_event(EventKind::TaskAdd, task)
    }

    pub fn task_remove(task: &Task) -> Self {
        Self::task_event(EventKind::TaskRemove, task)
    }

    pub fn task_status_changed(task: &Task, prev: TaskStatus) -> Self {
        let mut payload = Self::task_payload(task);
        payload["prev_status"] = json!(prev);
        Self::new(EventKind::TaskStatusChanged, payload)
    }

    pub fn task_execute_start(task: &Task, worker_id: WorkerId) -> Self {
        let mut payload = Self::task_payload(task);
        payload["worker_id"] = json!(worker_id);
        Self::new(EventKind::TaskExecuteStart, payload)
    }

    pub fn task_execute_stop(task: &Task, worker_id: WorkerId, outcome: &TaskOutcome) -> Self {
        let mut payload = Self::task_payload(task);
        payload["worker_id"] = json!(worker_id);
        payload["result"] = json!(if outcome.is_success() { "success" } else { "fail" });
        payload["error"] = json!(outcome.error());
        Self::new(EventKind::TaskExecuteStop, payload)
    }

    /// The outcome event matching the task's new status, if it has one.
    pub fn task_outcome(task: &Task, outcome: &TaskOutcome) -> Self {
        let kind = match outcome {
            TaskOutcome::Success => EventKind::TaskSuccess,
            TaskOutcome::Fail(_) => EventKind::TaskFail,
            TaskOutcome::Timeout => EventKind::TaskTimeout,
        };
        let mut payload = Self::task_payload(task);
        payload["error"] = json!(outcome.error());
        Self::new(kind, payload)
    }

    pub fn task_kill(task: &Task) -> Self {
        Self::task_event(EventKind::TaskKill, task)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Listener events
    // ─────────────────────────────────────────────────────────────────────────

    pub fn listener_add(name: &str, event: EventKind) -> Self {
        Self::new(
            EventKind::ListenerAdd,
            json!({ "listener_name": name, "event": event }),
        )
    }

    pub fn listener_remove(name: &str, event: EventKind) -> Self {
        Self::new(
            EventKind::ListenerRemove,
            json!({ "listener_name": name, "event": event }),
        )
    }
}
