//! Wire DTOs of the stats/control API.
//!
//! Statuses travel as small integers here and only here:
//!
//! | Worker | Task                |
//! |--------|---------------------|
//! | 0 wait | 0 wait              |
//! | 1 process | 1 process        |
//! | 2 busy | 2 success           |
//! |        | 3 fail              |
//! |        | 4 fail_by_timeout   |
//! |        | 5 kill              |
//! |        | 6 wait_repeat       |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::HiveError;
use crate::events::Listener;
use crate::jobs::{Task, TaskStatus, Worker, WorkerStatus};

// ═══════════════════════════════════════════════════════════════════════════════
// Status codes
// ═══════════════════════════════════════════════════════════════════════════════

impl From<TaskStatus> for u8 {
    fn from(status: TaskStatus) -> Self {
        match status {
            TaskStatus::Wait => 0,
            TaskStatus::Process => 1,
            TaskStatus::Success => 2,
            TaskStatus::Fail => 3,
            TaskStatus::FailByTimeout => 4,
            TaskStatus::Kill => 5,
            TaskStatus::WaitRepeat => 6,
        }
    }
}

impl TryFrom<u8> for TaskStatus {
    type Error = HiveError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| u8::from(*status) == code)
            .ok_or_else(|| HiveError::invalid_input("status", format!("unknown task status code {code}")))
    }
}

impl From<WorkerStatus> for u8 {
    fn from(status: WorkerStatus) -> Self {
        match status {
            WorkerStatus::Wait => 0,
            WorkerStatus::Process => 1,
            WorkerStatus::Busy => 2,
        }
    }
}

impl TryFrom<u8> for WorkerStatus {
    type Error = HiveError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        WorkerStatus::ALL
            .into_iter()
            .find(|status| u8::from(*status) == code)
            .ok_or_else(|| HiveError::invalid_input("status", format!("unknown worker status code {code}")))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Views
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: String,
    pub name: String,
    pub status: u8,
    pub priority: i64,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Task> for TaskView {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.to_string(),
            name: task.name.clone(),
            status: task.status.into(),
            priority: task.priority,
            attempts: task.attempts,
            last_error: task.last_error.clone(),
            created_at: task.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerView {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub status: u8,
    /// The task held, if any
    pub task: Option<TaskView>,
}

impl WorkerView {
    pub fn new(worker: &Worker, task: Option<&Task>) -> Self {
        Self {
            id: worker.id.to_string(),
            created_at: worker.created_at,
            status: worker.status.into(),
            task: task.map(TaskView::from),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListenerView {
    pub id: String,
    pub name: String,
    pub events: Vec<String>,
    pub fire_count: u64,
    pub first_fired_at: Option<DateTime<Utc>>,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub locked: bool,
}

impl From<&Listener> for ListenerView {
    fn from(listener: &Listener) -> Self {
        Self {
            id: listener.id.to_string(),
            name: listener.name.clone(),
            events: listener.events.iter().map(|e| e.to_string()).collect(),
            fire_count: listener.fire_count,
            first_fired_at: listener.first_fired_at,
            last_fired_at: listener.last_fired_at,
            created_at: listener.created_at,
            locked: listener.locked,
        }
    }
}

/// Response of `GET /workers?action=stats`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub listeners_count: usize,
    pub workers_count: usize,
    pub workers_wait: usize,
    pub workers_busy: usize,
    pub tasks_wait_count: usize,
    pub listeners: Vec<ListenerView>,
    /// Workers holding a task first
    pub workers: Vec<WorkerView>,
    /// Tasks in `wait` or `wait_repeat`, in dispatch order
    pub tasks_wait: Vec<TaskView>,
}
