#![allow(clippy::result_large_err)]
//! # Taskhive Core
//!
//! In-process task queue with a dynamically sized worker pool, an event
//! listener registry and an HTTP stats/control surface.
//!
//! ## Architecture
//!
//! - **Jobs**: Tasks, workers, the priority queue and the task handlers
//! - **Orchestrator**: Worker pool ownership and the dispatch loop
//! - **Events**: Listener registry and the built-in logging/metrics listeners
//! - **Control**: Snapshots, paginated views and control commands
//! - **API**: Axum routes for `/workers`, `/health` and `/metrics`
//! - **Telemetry**: Structured logging and Prometheus metrics

pub mod api;
pub mod config;
pub mod control;
pub mod error;
pub mod events;
pub mod health;
pub mod jobs;
pub mod orchestrator;
pub mod pagination;
pub mod telemetry;

pub use error::{ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, HiveError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::control::{ControlApi, ControlCommand, ControlForm, Snapshot};
    pub use crate::error::{ErrorCode, ErrorContext, HiveError, Result};
    pub use crate::events::{Event, EventKind, Listener, ListenerRegistry};
    pub use crate::jobs::{
        HandlerRegistry, Task, TaskContext, TaskHandler, TaskId, TaskOutcome, TaskQueue, TaskStatus,
        Worker, WorkerId, WorkerStatus,
    };
    pub use crate::orchestrator::{Dispatcher, KillPolicy, WorkerPool};
}
