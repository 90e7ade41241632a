//! Dispatcher - The heart of Taskhive.
//!
//! Owns the task queue, the worker pool, the listener registry and the task
//! handlers, and drives them: a periodic dispatch tick hands queued tasks to
//! idle workers and spawns their handlers, a periodic sweep fails executions
//! that ran past their timeout.

pub mod worker_pool;

pub use worker_pool::{
    Claimed, KillPolicy, WorkerCounts, WorkerPool, WorkerPoolConfig, WorkerPoolStats,
};

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::WorkersConfig;
use crate::error::{ErrorCode, Result};
use crate::events::ListenerRegistry;
use crate::jobs::{HandlerRegistry, QueueConfig, Task, TaskContext, TaskOutcome, TaskQueue};

/// How long `run` waits for cancelled executions to wind down.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Configuration for the dispatcher loop.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Interval between dispatch ticks
    pub tick_interval: Duration,
    /// Interval between timeout sweeps
    pub sweep_interval: Duration,
    /// Timeout applied to submitted tasks without one
    pub default_timeout: Option<Duration>,
    /// Attempts for tasks built with [`Dispatcher::task`]
    pub default_repeats: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self::from(&WorkersConfig::default())
    }
}

impl From<&WorkersConfig> for DispatcherConfig {
    fn from(config: &WorkersConfig) -> Self {
        Self {
            tick_interval: config.tick_interval,
            sweep_interval: config.sweep_interval,
            default_timeout: config.default_timeout,
            default_repeats: config.default_repeats,
        }
    }
}

/// The task dispatch engine.
#[derive(Debug)]
pub struct Dispatcher {
    config: DispatcherConfig,
    queue: Arc<TaskQueue>,
    pool: Arc<WorkerPool>,
    listeners: Arc<ListenerRegistry>,
    handlers: Arc<HandlerRegistry>,
    executions: TaskTracker,
    running: AtomicBool,
}

impl Dispatcher {
    /// Create a dispatcher with its own queue, pool and listener registry.
    pub fn new(config: &WorkersConfig, handlers: HandlerRegistry) -> Self {
        let queue = Arc::new(TaskQueue::new(QueueConfig {
            finished_capacity: config.finished_capacity,
        }));
        let listeners = Arc::new(ListenerRegistry::new());
        let pool = Arc::new(WorkerPool::new(
            WorkerPoolConfig::default()
                .with_max_workers(config.max_workers)
                .with_kill_policy(config.kill_policy),
            queue.clone(),
            listeners.clone(),
        ));

        Self::from_parts(DispatcherConfig::from(config), pool, handlers)
    }

    /// Create a dispatcher over an existing pool.
    pub fn from_parts(config: DispatcherConfig, pool: Arc<WorkerPool>, handlers: HandlerRegistry) -> Self {
        Self {
            config,
            queue: pool.queue().clone(),
            listeners: pool.listeners().clone(),
            pool,
            handlers: Arc::new(handlers),
            executions: TaskTracker::new(),
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Whether the dispatch loop is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Number of handler executions still in flight.
    pub fn executions_in_flight(&self) -> usize {
        self.executions.len()
    }

    /// A new task for `name` carrying the configured defaults.
    pub fn task(&self, name: impl Into<String>) -> Task {
        let task = Task::new(name).with_repeats(Some(self.config.default_repeats));
        match self.config.default_timeout {
            Some(timeout) => task.with_timeout(timeout),
            None => task,
        }
    }

    /// Enqueue a task, applying the default timeout when it has none.
    pub fn submit(&self, mut task: Task) -> Result<Task> {
        if task.timeout.is_none() {
            task.timeout = self.config.default_timeout;
        }
        self.pool.submit(task)
    }

    /// Add workers until the pool holds `target`. Never removes workers.
    pub fn scale_to(&self, target: usize) -> Result<usize> {
        let current = self.pool.len();
        if target > current {
            self.pool.add(target - current)?;
        }
        Ok(self.pool.len())
    }

    /// Grow the pool whenever `counts` publishes a larger worker count,
    /// until `shutdown` is cancelled or the sender is dropped.
    pub async fn watch_count(&self, mut counts: watch::Receiver<usize>, shutdown: CancellationToken) {
        loop {
            let target = *counts.borrow_and_update();
            match self.scale_to(target) {
                Ok(total) => tracing::debug!(target, workers = total, "Worker count applied"),
                Err(error) => tracing::warn!(target, error = %error, "Failed to apply worker count"),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = counts.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Loop
    // ─────────────────────────────────────────────────────────────────────────

    /// Assign queued tasks to every idle worker and spawn their handlers.
    ///
    /// Must be called from within a tokio runtime. Returns the number of
    /// executions started.
    pub fn tick(&self, now: DateTime<Utc>) -> usize {
        let claimed = self.pool.assign_idle(now);
        let started = claimed.len();

        for claimed in claimed {
            let pool = self.pool.clone();
            let handlers = self.handlers.clone();
            self.executions.spawn(execute(pool, handlers, claimed));
        }

        started
    }

    /// Fail executions past their timeout at `now`.
    pub fn sweep(&self, now: DateTime<Utc>) -> usize {
        self.pool.sweep(now).len()
    }

    /// Drive dispatch ticks and sweeps until `shutdown` is cancelled.
    ///
    /// On shutdown every worker is reset, which cancels in-flight executions
    /// and returns their tasks to `wait`.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut tick = tokio::time::interval(self.config.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sweep = tokio::time::interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.running.store(true, Ordering::SeqCst);
        tracing::info!(
            tick_interval = ?self.config.tick_interval,
            sweep_interval = ?self.config.sweep_interval,
            workers = self.pool.len(),
            "Dispatcher started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sweep.tick() => {
                    self.sweep(Utc::now());
                }
                _ = tick.tick() => {
                    self.tick(Utc::now());
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        let reset = self.pool.reset_all();
        tracing::info!(workers = reset.len(), "Dispatcher stopping, in-flight executions cancelled");

        self.executions.close();
        if tokio::time::timeout(SHUTDOWN_GRACE, self.executions.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                in_flight = self.executions.len(),
                "Executions still running after shutdown grace period"
            );
        }
        self.executions.reopen();

        tracing::info!("Dispatcher stopped");
    }
}

/// Run one claimed execution and report its outcome.
async fn execute(pool: Arc<WorkerPool>, handlers: Arc<HandlerRegistry>, claimed: Claimed) {
    let Claimed {
        worker_id,
        claim,
        task,
        cancellation,
    } = claimed;

    if let Err(error) = pool.mark_busy(worker_id, claim) {
        tracing::debug!(worker_id = %worker_id, error = %error, "Claim released before start");
        return;
    }

    let timeout = task.timeout;
    let ctx = TaskContext::new(task, worker_id, cancellation.clone());
    let run = AssertUnwindSafe(handlers.execute(&ctx)).catch_unwind();

    let outcome = match timeout {
        Some(limit) => match tokio::time::timeout(limit, run).await {
            Ok(result) => result.unwrap_or_else(|_| TaskOutcome::fail("handler panicked")),
            Err(_) => TaskOutcome::Timeout,
        },
        None => run
            .await
            .unwrap_or_else(|_| TaskOutcome::fail("handler panicked")),
    };

    if cancellation.is_cancelled() {
        tracing::debug!(worker_id = %worker_id, task_id = %ctx.task_id(), "Discarding result of cancelled execution");
        return;
    }

    match pool.complete_claim(worker_id, claim, outcome) {
        Ok(_) => {}
        Err(error) if matches!(error.code(), ErrorCode::StaleClaim | ErrorCode::WorkerNotFound) => {
            tracing::debug!(worker_id = %worker_id, error = %error, "Discarding stale completion");
        }
        Err(error) => error.log(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{TaskStatus, WorkerStatus};
    use serde_json::json;

    fn dispatcher() -> Dispatcher {
        Dispatcher::new(&WorkersConfig::default(), HandlerRegistry::with_builtins())
    }

    async fn settle(dispatcher: &Dispatcher) {
        for _ in 0..100 {
            if dispatcher.executions_in_flight() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn test_scale_to() {
        let dispatcher = dispatcher();
        assert_eq!(dispatcher.scale_to(3).unwrap(), 3);
        assert_eq!(dispatcher.scale_to(2).unwrap(), 3);
        assert!(dispatcher.scale_to(1_000).is_err());
    }

    #[tokio::test]
    async fn test_watch_count_grows_pool() {
        let dispatcher = Arc::new(dispatcher());
        let (counts, receiver) = watch::channel(1);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn({
            let dispatcher = dispatcher.clone();
            let shutdown = shutdown.clone();
            async move { dispatcher.watch_count(receiver, shutdown).await }
        });

        for _ in 0..100 {
            if dispatcher.pool().len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(dispatcher.pool().len(), 1);

        counts.send(4).unwrap();
        for _ in 0..100 {
            if dispatcher.pool().len() == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(dispatcher.pool().len(), 4);

        // a smaller count never removes workers, an oversized one is ignored
        counts.send(2).unwrap();
        counts.send(1_000).unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(dispatcher.pool().len(), 4);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[test]
    fn test_task_defaults() {
        let config = WorkersConfig {
            default_timeout: Some(Duration::from_secs(30)),
            default_repeats: 3,
            ..Default::default()
        };
        let dispatcher = Dispatcher::new(&config, HandlerRegistry::new());

        let task = dispatcher.task("noop");
        assert_eq!(task.repeats, Some(3));
        assert_eq!(task.timeout, Some(Duration::from_secs(30)));

        let submitted = dispatcher.submit(Task::new("noop")).unwrap();
        assert_eq!(submitted.timeout, Some(Duration::from_secs(30)));
    }

    #[tokio::test]
    async fn test_tick_executes_noop() {
        let dispatcher = dispatcher();
        dispatcher.scale_to(1).unwrap();
        let task = dispatcher.submit(Task::new("noop")).unwrap();

        assert_eq!(dispatcher.tick(Utc::now()), 1);
        settle(&dispatcher).await;

        assert!(!dispatcher.queue().contains(task.id));
        assert_eq!(dispatcher.pool().counts().wait, 1);
        assert_eq!(dispatcher.pool().stats().tasks_succeeded, 1);
    }

    #[tokio::test]
    async fn test_missing_handler_fails_task() {
        let dispatcher = dispatcher();
        dispatcher.scale_to(1).unwrap();
        let task = dispatcher.submit(Task::new("unknown")).unwrap();

        dispatcher.tick(Utc::now());
        settle(&dispatcher).await;

        let task = dispatcher.queue().get(task.id).unwrap();
        assert_eq!(task.status, TaskStatus::Fail);
        assert_eq!(task.attempts, 1);
        assert!(task.last_error.unwrap().contains("no handler registered"));
    }

    #[tokio::test]
    async fn test_handler_timeout() {
        let dispatcher = dispatcher();
        dispatcher.scale_to(1).unwrap();
        let task = dispatcher
            .submit(
                Task::new("sleep")
                    .with_payload(json!({ "millis": 60_000 }))
                    .with_timeout(Duration::from_millis(20)),
            )
            .unwrap();

        dispatcher.tick(Utc::now());
        settle(&dispatcher).await;

        let task = dispatcher.queue().get(task.id).unwrap();
        assert_eq!(task.status, TaskStatus::FailByTimeout);
    }

    #[tokio::test]
    async fn test_kill_cancels_execution() {
        let dispatcher = dispatcher();
        let worker = dispatcher.pool().add(1).unwrap().remove(0);
        let task = dispatcher
            .submit(Task::new("sleep").with_payload(json!({ "millis": 60_000 })))
            .unwrap();

        dispatcher.tick(Utc::now());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(dispatcher.pool().get(worker.id).unwrap().status, WorkerStatus::Busy);

        dispatcher.pool().kill(worker.id).unwrap();
        settle(&dispatcher).await;

        assert_eq!(dispatcher.executions_in_flight(), 0);
        assert_eq!(dispatcher.queue().get(task.id).unwrap().status, TaskStatus::Kill);
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let config = WorkersConfig {
            tick_interval: Duration::from_millis(10),
            sweep_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let dispatcher = Arc::new(Dispatcher::new(&config, HandlerRegistry::with_builtins()));
        dispatcher.scale_to(2).unwrap();
        let task = dispatcher.submit(Task::new("noop")).unwrap();

        let shutdown = CancellationToken::new();
        let handle = tokio::spawn({
            let dispatcher = dispatcher.clone();
            let shutdown = shutdown.clone();
            async move { dispatcher.run(shutdown).await }
        });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(dispatcher.is_running());
        assert!(!dispatcher.queue().contains(task.id));

        shutdown.cancel();
        handle.await.unwrap();
        assert!(!dispatcher.is_running());
    }
}
