//! Stats/Control API
//!
//! The read model and command surface observers poll and drive:
//!
//! - **`snapshot`**: Wire DTOs with integer status codes
//! - **`command`**: Control commands parsed from `action` + form fields
//! - **`ControlApi`**: Snapshot, paginated entity views and command execution
//!
//! Commands are validated before anything is mutated, so a failed command
//! leaves the pool, queue and registry untouched.

pub mod command;
pub mod snapshot;

pub use command::{ControlCommand, ControlForm};
pub use snapshot::{ListenerView, Snapshot, TaskView, WorkerView};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{HiveError, Result};
use crate::events::Listener;
use crate::jobs::{Task, Worker};
use crate::orchestrator::Dispatcher;
use crate::pagination::{OffsetPagination, PaginatedResponse, SortDirection};
use crate::telemetry::HiveMetrics;

// ═══════════════════════════════════════════════════════════════════════════════
// Entity views
// ═══════════════════════════════════════════════════════════════════════════════

/// Entity of a paginated view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Tasks,
    Workers,
    Listeners,
}

impl Entity {
    /// Sort field used when `sort` is absent.
    pub fn default_sort(&self) -> &'static str {
        match self {
            Self::Tasks => "priority",
            Self::Workers => "created_at",
            Self::Listeners => "name",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tasks => write!(f, "tasks"),
            Self::Workers => write!(f, "workers"),
            Self::Listeners => write!(f, "listeners"),
        }
    }
}

impl FromStr for Entity {
    type Err = HiveError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "tasks" => Ok(Self::Tasks),
            "workers" => Ok(Self::Workers),
            "listeners" => Ok(Self::Listeners),
            other => Err(HiveError::invalid_input(
                "entity",
                format!("unknown entity '{other}', expected tasks, workers or listeners"),
            )),
        }
    }
}

/// Query of a paginated, sorted entity view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewQuery {
    pub entity: Entity,
    pub pagination: OffsetPagination,
    pub sort: Option<String>,
    pub order: SortDirection,
}

impl ViewQuery {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            pagination: OffsetPagination::default(),
            sort: None,
            order: SortDirection::Asc,
        }
    }

    pub fn with_page(mut self, page: u64, per_page: u64) -> Self {
        self.pagination = OffsetPagination::new(page, per_page);
        self
    }

    pub fn with_sort(mut self, sort: impl Into<String>, order: SortDirection) -> Self {
        self.sort = Some(sort.into());
        self.order = order;
        self
    }

    fn sort_field(&self) -> &str {
        self.sort.as_deref().unwrap_or_else(|| self.entity.default_sort())
    }
}

/// One page of an entity view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityView {
    Tasks(PaginatedResponse<TaskView>),
    Workers(PaginatedResponse<WorkerView>),
    Listeners(PaginatedResponse<ListenerView>),
}

fn unknown_sort(entity: Entity, field: &str) -> HiveError {
    HiveError::invalid_input("sort", format!("cannot sort {entity} by '{field}'"))
}

fn task_ordering(field: &str) -> Option<fn(&Task, &Task) -> Ordering> {
    let cmp: fn(&Task, &Task) -> Ordering = match field {
        "priority" => |a, b| a.priority.cmp(&b.priority).then(a.created_at.cmp(&b.created_at)),
        "created_at" => |a, b| a.created_at.cmp(&b.created_at),
        "name" => |a, b| a.name.cmp(&b.name),
        "attempts" => |a, b| a.attempts.cmp(&b.attempts),
        "status" => |a, b| u8::from(a.status).cmp(&u8::from(b.status)),
        _ => return None,
    };
    Some(cmp)
}

fn worker_ordering(field: &str) -> Option<fn(&Worker, &Worker) -> Ordering> {
    let cmp: fn(&Worker, &Worker) -> Ordering = match field {
        "created_at" => |a, b| a.created_at.cmp(&b.created_at),
        "status" => |a, b| u8::from(a.status).cmp(&u8::from(b.status)),
        _ => return None,
    };
    Some(cmp)
}

fn listener_ordering(field: &str) -> Option<fn(&Listener, &Listener) -> Ordering> {
    let cmp: fn(&Listener, &Listener) -> Ordering = match field {
        "name" => |a, b| a.name.cmp(&b.name),
        "created_at" => |a, b| a.created_at.cmp(&b.created_at),
        "fire_count" => |a, b| a.fire_count.cmp(&b.fire_count),
        "last_fired_at" => |a, b| a.last_fired_at.cmp(&b.last_fired_at),
        _ => return None,
    };
    Some(cmp)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Control API
// ═══════════════════════════════════════════════════════════════════════════════

/// Read model and command surface over a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct ControlApi {
    dispatcher: Arc<Dispatcher>,
}

impl ControlApi {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Counts and arrays of listeners, workers and waiting tasks.
    ///
    /// Also refreshes the size gauges.
    pub fn snapshot(&self) -> Snapshot {
        let queue = self.dispatcher.queue();
        let pool = self.dispatcher.pool();
        let registry = self.dispatcher.listeners();

        let listeners: Vec<ListenerView> = registry.list().iter().map(ListenerView::from).collect();
        let workers: Vec<WorkerView> = pool
            .workers()
            .iter()
            .map(|w| WorkerView::new(w, w.task_id().and_then(|id| queue.get(id)).as_ref()))
            .collect();
        let tasks_wait: Vec<TaskView> = queue.waiting().iter().map(TaskView::from).collect();

        let counts = pool.counts();

        HiveMetrics::set_workers_total(counts.total);
        HiveMetrics::set_tasks_total(queue.len());
        HiveMetrics::set_listeners_total(listeners.len());
        HiveMetrics::set_listeners_events_total(registry.subscriptions());

        Snapshot {
            listeners_count: listeners.len(),
            workers_count: workers.len(),
            workers_wait: counts.wait,
            workers_busy: counts.busy,
            tasks_wait_count: tasks_wait.len(),
            listeners,
            workers,
            tasks_wait,
        }
    }

    /// One sorted page of an entity.
    pub fn view(&self, query: &ViewQuery) -> Result<EntityView> {
        let field = query.sort_field();
        let order = query.order;
        let pagination = query.pagination;

        match query.entity {
            Entity::Tasks => {
                let cmp = task_ordering(field).ok_or_else(|| unknown_sort(query.entity, field))?;
                let mut tasks = self.dispatcher.queue().list();
                tasks.sort_by(|a, b| order.apply(cmp(a, b)));

                let meta = pagination.metadata(tasks.len() as u64);
                let page = pagination.paginate_iter(tasks.iter().map(TaskView::from));
                Ok(EntityView::Tasks(PaginatedResponse::new(page, meta)))
            }
            Entity::Workers => {
                let cmp = worker_ordering(field).ok_or_else(|| unknown_sort(query.entity, field))?;
                let queue = self.dispatcher.queue();
                let mut workers = self.dispatcher.pool().workers();
                workers.sort_by(|a, b| order.apply(cmp(a, b)));

                let meta = pagination.metadata(workers.len() as u64);
                let page = pagination.paginate_iter(
                    workers
                        .iter()
                        .map(|w| WorkerView::new(w, w.task_id().and_then(|id| queue.get(id)).as_ref())),
                );
                Ok(EntityView::Workers(PaginatedResponse::new(page, meta)))
            }
            Entity::Listeners => {
                let cmp = listener_ordering(field).ok_or_else(|| unknown_sort(query.entity, field))?;
                let mut listeners = self.dispatcher.listeners().list();
                listeners.sort_by(|a, b| order.apply(cmp(a, b)));

                let meta = pagination.metadata(listeners.len() as u64);
                let page = pagination.paginate_iter(listeners.iter().map(ListenerView::from));
                Ok(EntityView::Listeners(PaginatedResponse::new(page, meta)))
            }
        }
    }

    /// Apply a command and return the refreshed snapshot.
    pub fn execute(&self, command: ControlCommand) -> Result<Snapshot> {
        let pool = self.dispatcher.pool();
        let registry = self.dispatcher.listeners();

        match &command {
            ControlCommand::WorkersAdd { count } => {
                pool.add(*count)?;
            }
            ControlCommand::WorkersKill { id: Some(id) } => {
                pool.kill(*id)?;
            }
            ControlCommand::WorkersKill { id: None } => {
                pool.kill_all();
            }
            ControlCommand::WorkersReset { id: Some(id) } => {
                pool.reset(*id)?;
            }
            ControlCommand::WorkersReset { id: None } => {
                pool.reset_all();
            }
            ControlCommand::TasksRemove { id } => {
                pool.remove_task(*id)?;
            }
            ControlCommand::ListenersRemove { name: Some(name), events } => {
                registry.remove(name, events.as_deref())?;
            }
            ControlCommand::ListenersRemove { name: None, events: None } => {
                registry.remove_unlocked();
            }
            ControlCommand::ListenersRemove { name: None, events: Some(events) } => {
                for listener in registry.list().into_iter().filter(|l| !l.locked) {
                    if let Err(error) = registry.remove(&listener.name, Some(events.as_slice())) {
                        tracing::debug!(listener = %listener.name, error = %error, "Listener gone before removal");
                    }
                }
            }
        }

        tracing::info!(action = %command, "Control command applied");
        Ok(self.snapshot())
    }

    /// Parse and apply `action` with its form fields.
    pub fn handle(&self, action: &str, form: &ControlForm) -> Result<Snapshot> {
        let command = ControlCommand::parse(action, form)?;
        self.execute(command)
    }
}
