//! End-to-end tests of the dispatcher and the control surface.
//!
//! Tests cover:
//! - Tasks running to completion through the dispatch loop
//! - Control commands applied atomically with refreshed snapshots
//! - Kill and reset of workers with executions in flight
//! - Event delivery to user listeners

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use taskhive_core::config::WorkersConfig;
use taskhive_core::control::{ControlApi, ControlForm, Entity, EntityView, ViewQuery};
use taskhive_core::error::ErrorCode;
use taskhive_core::events::{register_system_listeners, EventKind};
use taskhive_core::jobs::{HandlerRegistry, HandlerResult, Task, TaskContext, TaskHandler, TaskStatus};
use taskhive_core::orchestrator::Dispatcher;
use taskhive_core::pagination::OffsetPagination;

struct Counting {
    runs: Arc<AtomicUsize>,
}

#[async_trait]
impl TaskHandler for Counting {
    fn name(&self) -> &str {
        "count"
    }

    async fn execute(&self, _ctx: &TaskContext) -> HandlerResult {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct Harness {
    api: ControlApi,
    runs: Arc<AtomicUsize>,
    shutdown: CancellationToken,
    loop_handle: JoinHandle<()>,
}

impl Harness {
    fn start(workers: usize) -> Self {
        let runs = Arc::new(AtomicUsize::new(0));
        let config = WorkersConfig {
            count: workers,
            tick_interval: Duration::from_millis(10),
            sweep_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let handlers = HandlerRegistry::with_builtins().with_handler(Counting { runs: runs.clone() });

        let dispatcher = Arc::new(Dispatcher::new(&config, handlers));
        register_system_listeners(dispatcher.listeners()).unwrap();
        dispatcher.scale_to(workers).unwrap();

        let shutdown = CancellationToken::new();
        let loop_handle = {
            let dispatcher = dispatcher.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move { dispatcher.run(shutdown).await })
        };

        Self {
            api: ControlApi::new(dispatcher),
            runs,
            shutdown,
            loop_handle,
        }
    }

    fn dispatcher(&self) -> &Arc<Dispatcher> {
        self.api.dispatcher()
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.loop_handle.await.unwrap();
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(tokio::time::Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ============================================================================
// Dispatch
// ============================================================================

#[tokio::test]
async fn test_tasks_run_to_completion() {
    let harness = Harness::start(2);
    for _ in 0..10 {
        harness.dispatcher().submit(Task::new("count")).unwrap();
    }

    let runs = harness.runs.clone();
    wait_until(|| runs.load(Ordering::SeqCst) == 10).await;

    let dispatcher = harness.dispatcher().clone();
    wait_until(|| dispatcher.queue().is_empty()).await;
    assert_eq!(dispatcher.pool().stats().tasks_succeeded, 10);

    harness.stop().await;
}

#[tokio::test]
async fn test_timeout_then_retry() {
    let harness = Harness::start(1);
    let task = harness
        .dispatcher()
        .submit(
            Task::new("sleep")
                .with_payload(json!({ "millis": 10_000 }))
                .with_timeout(Duration::from_millis(50))
                .with_repeats(Some(2)),
        )
        .unwrap();

    let queue = harness.dispatcher().queue().clone();
    wait_until(|| {
        queue
            .get(task.id)
            .map(|t| t.status == TaskStatus::FailByTimeout)
            .unwrap_or(false)
    })
    .await;

    let finished = queue.get(task.id).unwrap();
    assert_eq!(finished.attempts, 2);

    harness.stop().await;
}

// ============================================================================
// Control Commands
// ============================================================================

#[tokio::test]
async fn test_workers_add_then_kill_all() {
    let harness = Harness::start(0);

    let snapshot = harness
        .api
        .handle("workers-add", &ControlForm::default().with_count(3))
        .unwrap();
    assert_eq!(snapshot.workers_count, 3);

    let snapshot = harness.api.handle("workers-kill", &ControlForm::default()).unwrap();
    assert_eq!(snapshot.workers_count, 0);

    harness.stop().await;
}

#[tokio::test]
async fn test_kill_busy_worker_kills_task() {
    let harness = Harness::start(1);
    let task = harness
        .dispatcher()
        .submit(Task::new("sleep").with_payload(json!({ "millis": 10_000 })))
        .unwrap();

    let pool = harness.dispatcher().pool().clone();
    wait_until(|| pool.counts().busy == 1).await;

    let worker_id = pool.workers()[0].id;
    let snapshot = harness
        .api
        .handle("workers-kill", &ControlForm::default().with_id(worker_id.to_string()))
        .unwrap();

    assert_eq!(snapshot.workers_count, 0);
    let killed = harness.dispatcher().queue().get(task.id).unwrap();
    assert_eq!(killed.status, TaskStatus::Kill);

    let dispatcher = harness.dispatcher().clone();
    wait_until(|| dispatcher.executions_in_flight() == 0).await;

    harness.stop().await;
}

#[tokio::test]
async fn test_reset_returns_task_to_wait() {
    let harness = Harness::start(1);
    let task = harness
        .dispatcher()
        .submit(Task::new("sleep").with_payload(json!({ "millis": 10_000 })))
        .unwrap();

    let pool = harness.dispatcher().pool().clone();
    wait_until(|| pool.counts().busy == 1).await;

    // Stop dispatching so the reset task is not picked up again.
    harness.shutdown.cancel();
    let Harness { api, loop_handle, .. } = harness;
    loop_handle.await.unwrap();

    let reset = api.dispatcher().queue().get(task.id).unwrap();
    assert_eq!(reset.status, TaskStatus::Wait);
    assert_eq!(reset.attempts, 0);

    let snapshot = api.handle("workers-reset", &ControlForm::default()).unwrap();
    assert_eq!(snapshot.workers_wait, 1);
    assert_eq!(snapshot.tasks_wait_count, 1);
}

#[tokio::test]
async fn test_failed_command_changes_nothing() {
    let harness = Harness::start(2);
    let before = harness.api.snapshot();

    let err = harness
        .api
        .handle("workers-kill", &ControlForm::default().with_id("not-a-worker"))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::WorkerNotFound);

    let err = harness
        .api
        .handle("workers-add", &ControlForm::default().with_count(1_000))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::WorkerPoolExhausted);

    let after = harness.api.snapshot();
    assert_eq!(before.workers_count, after.workers_count);

    harness.stop().await;
}

#[tokio::test]
async fn test_workers_add_huge_count_is_rejected() {
    let harness = Harness::start(1);

    let err = harness
        .api
        .handle("workers-add", &ControlForm::default().with_count(usize::MAX))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::WorkerPoolExhausted);
    assert_eq!(harness.api.snapshot().workers_count, 1);

    harness.stop().await;
}

#[tokio::test]
async fn test_view_page_far_beyond_end_is_empty() {
    let harness = Harness::start(2);
    let query = ViewQuery {
        pagination: OffsetPagination::from_query(Some(u64::MAX), Some(50)).unwrap(),
        ..ViewQuery::new(Entity::Workers)
    };

    let EntityView::Workers(page) = harness.api.view(&query).unwrap() else {
        panic!("expected a workers view");
    };
    assert!(page.is_empty());
    assert_eq!(page.pagination.total_items, 2);

    harness.stop().await;
}

#[tokio::test]
async fn test_listeners_remove_skips_system_listeners() {
    let harness = Harness::start(0);
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    harness
        .dispatcher()
        .listeners()
        .register("audit", &[EventKind::TaskAdd], move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    harness.dispatcher().submit(Task::new("count")).unwrap();
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    let snapshot = harness.api.handle("listeners-remove", &ControlForm::default()).unwrap();
    assert_eq!(snapshot.listeners_count, 2);
    assert!(snapshot.listeners.iter().all(|l| l.locked));

    let err = harness
        .api
        .handle("listeners-remove", &ControlForm::default().with_id("workers.logging"))
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::LockedListener);

    harness.stop().await;
}
