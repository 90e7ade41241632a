//! Wire types of the `/workers` endpoint and their table rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tabled::Tabled;

pub fn worker_status_name(code: u8) -> &'static str {
    match code {
        0 => "wait",
        1 => "process",
        2 => "busy",
        _ => "unknown",
    }
}

pub fn task_status_name(code: u8) -> &'static str {
    match code {
        0 => "wait",
        1 => "process",
        2 => "success",
        3 => "fail",
        4 => "fail_by_timeout",
        5 => "kill",
        6 => "wait_repeat",
        _ => "unknown",
    }
}

fn short(id: &str) -> String {
    id.chars().take(8).collect()
}

fn timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

// ── API types ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskInfo {
    pub id: String,
    pub name: String,
    pub status: u8,
    pub priority: i64,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub status: u8,
    pub task: Option<TaskInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerInfo {
    pub id: String,
    pub name: String,
    pub events: Vec<String>,
    pub fire_count: u64,
    pub first_fired_at: Option<DateTime<Utc>>,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub locked: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub listeners_count: usize,
    pub workers_count: usize,
    pub workers_wait: usize,
    pub workers_busy: usize,
    pub tasks_wait_count: usize,
    pub listeners: Vec<ListenerInfo>,
    pub workers: Vec<WorkerInfo>,
    pub tasks_wait: Vec<TaskInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageInfo {
    pub current_page: u64,
    pub per_page: u64,
    pub total_items: u64,
    pub total_pages: u64,
    pub has_previous_page: bool,
    pub has_next_page: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: PageInfo,
}

/// Query of a paginated entity view.
#[derive(Debug, Clone, Serialize)]
pub struct ViewQuery {
    pub entity: &'static str,
    pub page: u64,
    pub per_page: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort: Option<String>,
    pub order: String,
}

/// Form fields of a control command.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ControlForm {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<String>,
}

// ── Table rows ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Tabled)]
pub struct TaskRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Priority")]
    pub priority: i64,
    #[tabled(rename = "Attempts")]
    pub attempts: u32,
    #[tabled(rename = "Last Error")]
    pub last_error: String,
    #[tabled(rename = "Created")]
    pub created_at: String,
}

impl From<&TaskInfo> for TaskRow {
    fn from(task: &TaskInfo) -> Self {
        Self {
            id: short(&task.id),
            name: task.name.clone(),
            status: task_status_name(task.status).to_string(),
            priority: task.priority,
            attempts: task.attempts,
            last_error: task.last_error.clone().unwrap_or_else(|| "-".to_string()),
            created_at: timestamp(Some(task.created_at)),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct WorkerRow {
    #[tabled(rename = "ID")]
    pub id: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Task")]
    pub task: String,
    #[tabled(rename = "Created")]
    pub created_at: String,
}

impl From<&WorkerInfo> for WorkerRow {
    fn from(worker: &WorkerInfo) -> Self {
        Self {
            id: worker.id.clone(),
            status: worker_status_name(worker.status).to_string(),
            task: worker
                .task
                .as_ref()
                .map(|t| format!("{} ({})", t.name, short(&t.id)))
                .unwrap_or_else(|| "-".to_string()),
            created_at: timestamp(Some(worker.created_at)),
        }
    }
}

#[derive(Debug, Serialize, Tabled)]
pub struct ListenerRow {
    #[tabled(rename = "Name")]
    pub name: String,
    #[tabled(rename = "Events")]
    pub events: String,
    #[tabled(rename = "Fired")]
    pub fire_count: u64,
    #[tabled(rename = "Last Fired")]
    pub last_fired_at: String,
    #[tabled(rename = "Locked")]
    pub locked: bool,
}

impl From<&ListenerInfo> for ListenerRow {
    fn from(listener: &ListenerInfo) -> Self {
        Self {
            name: listener.name.clone(),
            events: listener.events.join(","),
            fire_count: listener.fire_count,
            last_fired_at: timestamp(listener.last_fired_at),
            locked: listener.locked,
        }
    }
}
