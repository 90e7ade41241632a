//! Task handlers.
//!
//! This module provides the execution seam of the dispatcher:
//!
//! - **TaskHandler trait**: The interface every task body implements
//! - **TaskContext**: Task snapshot, attempt number and cancellation
//! - **HandlerRegistry**: Handlers keyed by task name

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::task::{Task, TaskId, TaskOutcome};
use super::worker::WorkerId;
use crate::error::HiveError;

// ═══════════════════════════════════════════════════════════════════════════════
// Handler Error
// ═══════════════════════════════════════════════════════════════════════════════

/// Error returned by a failed task body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerError {
    pub message: String,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for HandlerError {}

impl From<HiveError> for HandlerError {
    fn from(error: HiveError) -> Self {
        Self::new(error.user_message())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(error: serde_json::Error) -> Self {
        Self::new(format!("invalid payload: {error}"))
    }
}

/// Result type for task bodies.
pub type HandlerResult = std::result::Result<(), HandlerError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Task Context
// ═══════════════════════════════════════════════════════════════════════════════

/// Context passed to a handler for one execution.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// The task as it was when claimed
    pub task: Task,
    /// The executing worker
    pub worker_id: WorkerId,
    cancellation: CancellationToken,
}

impl TaskContext {
    pub fn new(task: Task, worker_id: WorkerId, cancellation: CancellationToken) -> Self {
        Self {
            task,
            worker_id,
            cancellation,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task.id
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.task.payload
    }

    /// The attempt in flight (1-indexed).
    pub fn attempt(&self) -> u32 {
        self.task.attempts + 1
    }

    /// Whether the execution was killed or reset.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Run `future` unless the execution is cancelled first.
    pub async fn cancellable<F, T>(&self, future: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        tokio::select! {
            result = future => Some(result),
            _ = self.cancellation.cancelled() => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Handler Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// The body of a named task.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    /// Task name this handler executes.
    fn name(&self) -> &str;

    /// Execute one attempt.
    ///
    /// Long-running handlers should poll [`TaskContext::is_cancelled`] or wrap
    /// their awaits in [`TaskContext::cancellable`]; a killed execution's
    /// result is discarded either way.
    async fn execute(&self, ctx: &TaskContext) -> HandlerResult;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Handler Registry
// ═══════════════════════════════════════════════════════════════════════════════

/// Handlers keyed by task name.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in `noop` and `sleep` handlers.
    pub fn with_builtins() -> Self {
        Self::new()
            .with_handler(super::NoopHandler)
            .with_handler(super::SleepHandler)
    }

    pub fn with_handler<H: TaskHandler + 'static>(mut self, handler: H) -> Self {
        self.register(handler);
        self
    }

    /// Register `handler` under its name, replacing any previous one.
    pub fn register<H: TaskHandler + 'static>(&mut self, handler: H) {
        self.handlers
            .insert(handler.name().to_string(), Arc::new(handler));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Run the handler for `ctx.task` and turn its result into an outcome.
    pub async fn execute(&self, ctx: &TaskContext) -> TaskOutcome {
        let Some(handler) = self.get(&ctx.task.name) else {
            return TaskOutcome::fail(format!("no handler registered for '{}'", ctx.task.name));
        };

        match handler.execute(ctx).await {
            Ok(()) => TaskOutcome::Success,
            Err(error) => TaskOutcome::Fail(error.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    #[async_trait]
    impl TaskHandler for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn execute(&self, _ctx: &TaskContext) -> HandlerResult {
            Err(HandlerError::new("boom"))
        }
    }

    fn context(name: &str) -> TaskContext {
        TaskContext::new(Task::new(name), WorkerId::new(), CancellationToken::new())
    }

    #[tokio::test]
    async fn test_missing_handler_fails() {
        let registry = HandlerRegistry::new();
        let outcome = registry.execute(&context("unknown")).await;
        assert_eq!(outcome.error(), Some("no handler registered for 'unknown'"));
    }

    #[tokio::test]
    async fn test_handler_error_becomes_fail() {
        let registry = HandlerRegistry::new().with_handler(Failing);
        let outcome = registry.execute(&context("failing")).await;
        assert_eq!(outcome, TaskOutcome::fail("boom"));
    }

    #[tokio::test]
    async fn test_cancellable() {
        let token = CancellationToken::new();
        let ctx = TaskContext::new(Task::new("t"), WorkerId::new(), token.clone());
        assert_eq!(ctx.attempt(), 1);

        token.cancel();
        assert!(ctx.is_cancelled());
        let result = ctx.cancellable(std::future::pending::<()>()).await;
        assert!(result.is_none());
    }

    #[test]
    fn test_builtins_registered() {
        let registry = HandlerRegistry::with_builtins();
        assert_eq!(registry.names(), vec!["noop", "sleep"]);
    }
}
