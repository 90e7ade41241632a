//! Background Task System for Taskhive Core.
//!
//! This module provides the task side of the task/worker lifecycle:
//!
//! - **Task**: Priority, payload, retry and timeout metadata
//! - **Queue**: Priority queue with atomic claim and finished-task history
//! - **Worker**: Execution slots holding at most one task
//! - **Handlers**: Async task handlers keyed by task name
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          Task Lifecycle                              │
//! ├──────────────────────────────────────────────────────────────────────┤
//! │   enqueue        dequeue_next        mark_busy         complete      │
//! │  ─────────▶ wait ───────────▶ process ────────▶ busy ──────────▶     │
//! │              ▲                                          │            │
//! │              │          wait_repeat ◀── fail/timeout ───┤            │
//! │              └──────────────┘                           ├──▶ success │
//! │                                                         └──▶ fail    │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use taskhive_core::jobs::{HandlerRegistry, HandlerResult, Task, TaskContext, TaskHandler};
//!
//! struct Mail;
//!
//! #[async_trait]
//! impl TaskHandler for Mail {
//!     fn name(&self) -> &str {
//!         "mail"
//!     }
//!
//!     async fn execute(&self, ctx: &TaskContext) -> HandlerResult {
//!         // send...
//!         Ok(())
//!     }
//! }
//!
//! let handlers = HandlerRegistry::with_builtins().with_handler(Mail);
//! dispatcher.submit(Task::new("mail").with_priority(-1))?;
//! ```

pub mod handler;
pub mod queue;
pub mod task;
pub mod worker;

pub use handler::{HandlerError, HandlerRegistry, HandlerResult, TaskContext, TaskHandler};
pub use queue::{FinishedHistory, QueueConfig, QueueStats, TaskQueue};
pub use task::{Task, TaskId, TaskOutcome, TaskStatus};
pub use worker::{Assignment, ClaimToken, Worker, WorkerId, WorkerStatus};

// Built-in handlers
mod builtin;
pub use builtin::{NoopHandler, SleepHandler};
