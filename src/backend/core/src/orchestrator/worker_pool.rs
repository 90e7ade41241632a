//! Worker Pool - Manages worker slots and their ownership of tasks.
//!
//! The `WorkerPool` provides:
//! - Dynamic worker lifecycle (`add`, `kill`, `reset`)
//! - Claim-token bound assignment of queued tasks to idle workers
//! - Completion, timeout sweep and task removal with ownership release
//! - Pool statistics and monitoring
//!
//! Transitions run under the pool mutex with the queue mutex nested inside
//! (fixed order: pool, then queue). Lifecycle events are collected while the
//! locks are held and fired on the listener registry after release.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::{HiveError, Result};
use crate::events::{Event, ListenerRegistry};
use crate::jobs::{
    ClaimToken, Task, TaskId, TaskOutcome, TaskQueue, TaskStatus, Worker, WorkerId, WorkerStatus,
};

// ═══════════════════════════════════════════════════════════════════════════════
// Configuration
// ═══════════════════════════════════════════════════════════════════════════════

/// What happens to the task held by a killed worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KillPolicy {
    /// Mark the task `kill`
    #[default]
    Kill,
    /// Return the task to `wait` without recording an attempt
    Requeue,
}

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Maximum number of workers
    pub max_workers: usize,
    /// Fate of a killed worker's task
    pub kill_policy: KillPolicy,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            max_workers: 100,
            kill_policy: KillPolicy::Kill,
        }
    }
}

impl WorkerPoolConfig {
    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_kill_policy(mut self, kill_policy: KillPolicy) -> Self {
        self.kill_policy = kill_policy;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Claims
// ═══════════════════════════════════════════════════════════════════════════════

/// A task handed to a worker for one execution.
#[derive(Debug, Clone)]
pub struct Claimed {
    pub worker_id: WorkerId,
    pub claim: ClaimToken,
    /// The task as claimed, status `process`
    pub task: Task,
    /// Cancelled when the worker is killed or reset, or the task times out
    pub cancellation: CancellationToken,
}

/// Worker counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerCounts {
    pub total: usize,
    pub wait: usize,
    pub process: usize,
    pub busy: usize,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Statistics
// ═══════════════════════════════════════════════════════════════════════════════

/// Internal statistics tracking.
struct PoolStats {
    /// Tasks handed to workers
    tasks_assigned: AtomicU64,
    /// Executions ending in `success`
    tasks_succeeded: AtomicU64,
    /// Executions ending in an error
    tasks_failed: AtomicU64,
    /// Executions failed by the sweep
    tasks_timed_out: AtomicU64,
    /// Completions rejected for a stale claim
    stale_completions: AtomicU64,
    workers_added: AtomicU64,
    workers_killed: AtomicU64,
}

impl PoolStats {
    fn new() -> Self {
        Self {
            tasks_assigned: AtomicU64::new(0),
            tasks_succeeded: AtomicU64::new(0),
            tasks_failed: AtomicU64::new(0),
            tasks_timed_out: AtomicU64::new(0),
            stale_completions: AtomicU64::new(0),
            workers_added: AtomicU64::new(0),
            workers_killed: AtomicU64::new(0),
        }
    }

    fn record_outcome(&self, outcome: &TaskOutcome) {
        let counter = match outcome {
            TaskOutcome::Success => &self.tasks_succeeded,
            TaskOutcome::Fail(_) => &self.tasks_failed,
            TaskOutcome::Timeout => &self.tasks_timed_out,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Statistics for the worker pool.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerPoolStats {
    pub max_workers: usize,
    pub workers: WorkerCounts,
    pub tasks_assigned: u64,
    pub tasks_succeeded: u64,
    pub tasks_failed: u64,
    pub tasks_timed_out: u64,
    pub stale_completions: u64,
    pub workers_added: u64,
    pub workers_killed: u64,
    pub uptime_secs: u64,
}

impl WorkerPoolStats {
    /// Calculate success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        let total = self.tasks_succeeded + self.tasks_failed + self.tasks_timed_out;
        if total == 0 {
            100.0
        } else {
            (self.tasks_succeeded as f64 / total as f64) * 100.0
        }
    }

    /// Calculate utilization as a percentage of live workers.
    pub fn utilization(&self) -> f64 {
        if self.workers.total == 0 {
            0.0
        } else {
            ((self.workers.process + self.workers.busy) as f64 / self.workers.total as f64) * 100.0
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Worker Pool
// ═══════════════════════════════════════════════════════════════════════════════

struct PoolState {
    /// Workers in creation order
    workers: Vec<Worker>,
    /// Cancellation of each worker's execution in flight
    cancellations: std::collections::HashMap<WorkerId, CancellationToken>,
    next_claim: u64,
}

impl PoolState {
    fn position(&self, id: WorkerId) -> Result<usize> {
        self.workers
            .iter()
            .position(|w| w.id == id)
            .ok_or_else(|| HiveError::worker_not_found(id))
    }

    fn holder_of(&self, task_id: TaskId) -> Option<usize> {
        self.workers.iter().position(|w| w.task_id() == Some(task_id))
    }

    fn next_claim(&mut self) -> ClaimToken {
        self.next_claim += 1;
        ClaimToken(self.next_claim)
    }

    fn cancel(&mut self, id: WorkerId) {
        if let Some(token) = self.cancellations.remove(&id) {
            token.cancel();
        }
    }
}

/// Manages the worker slots claiming tasks from a [`TaskQueue`].
pub struct WorkerPool {
    config: WorkerPoolConfig,
    queue: Arc<TaskQueue>,
    listeners: Arc<ListenerRegistry>,
    state: Mutex<PoolState>,
    stats: PoolStats,
    created_at: Instant,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("workers", &self.len())
            .finish()
    }
}

impl WorkerPool {
    /// Create a new worker pool over `queue`, reporting to `listeners`.
    pub fn new(
        config: WorkerPoolConfig,
        queue: Arc<TaskQueue>,
        listeners: Arc<ListenerRegistry>,
    ) -> Self {
        tracing::info!(
            max_workers = config.max_workers,
            kill_policy = ?config.kill_policy,
            "Worker pool created"
        );

        Self {
            config,
            queue,
            listeners,
            state: Mutex::new(PoolState {
                workers: Vec::new(),
                cancellations: std::collections::HashMap::new(),
                next_claim: 0,
            }),
            stats: PoolStats::new(),
            created_at: Instant::now(),
        }
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn listeners(&self) -> &Arc<ListenerRegistry> {
        &self.listeners
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tasks
    // ─────────────────────────────────────────────────────────────────────────

    /// Enqueue a task and fire `task.add`.
    pub fn submit(&self, task: Task) -> Result<Task> {
        let task = self.queue.enqueue(task)?;
        tracing::debug!(task_id = %task.id, task_name = %task.name, priority = task.priority, "Task submitted");
        self.listeners.fire(&Event::task_add(&task));
        Ok(task)
    }

    /// Remove a task wherever it is, releasing the worker holding it.
    pub fn remove_task(&self, task_id: TaskId) -> Result<Task> {
        let mut events = Vec::new();
        let task = {
            let mut state = self.state.lock();
            let task = self.queue.remove(task_id)?;

            if let Some(idx) = state.holder_of(task_id) {
                let worker_id = state.workers[idx].id;
                state.cancel(worker_id);
                let worker = &mut state.workers[idx];
                let prev = worker.status;
                worker.release();
                events.push(Event::worker_status_changed(worker_id, WorkerStatus::Wait, prev));
            }

            events.push(Event::task_remove(&task));
            task
        };

        tracing::info!(task_id = %task_id, "Task removed");
        self.listeners.fire_all(events);
        Ok(task)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Worker lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Spawn `count` workers in `wait`.
    pub fn add(&self, count: usize) -> Result<Vec<Worker>> {
        if count == 0 {
            return Err(HiveError::invalid_input("count", "count must be at least 1"));
        }

        let now = Utc::now();
        let added = {
            let mut state = self.state.lock();
            let current = state.workers.len();
            current
                .checked_add(count)
                .filter(|total| *total <= self.config.max_workers)
                .ok_or_else(|| HiveError::worker_pool_exhausted(current, self.config.max_workers))?;

            let added: Vec<Worker> = (0..count).map(|_| Worker::new(now)).collect();
            state.workers.extend(added.iter().cloned());
            added
        };

        self.stats
            .workers_added
            .fetch_add(added.len() as u64, Ordering::Relaxed);
        tracing::info!(count = added.len(), "Workers added");
        self.listeners.fire_all(added.iter().map(Event::worker_add));
        Ok(added)
    }

    /// Remove a worker, even mid-task.
    ///
    /// The task it held is marked `kill` or returned to `wait` according to
    /// the configured [`KillPolicy`].
    pub fn kill(&self, worker_id: WorkerId) -> Result<Worker> {
        let mut events = Vec::new();
        let worker = {
            let mut state = self.state.lock();
            self.kill_locked(&mut state, worker_id, &mut events)?
        };

        self.stats.workers_killed.fetch_add(1, Ordering::Relaxed);
        tracing::info!(worker_id = %worker_id, "Worker killed");
        self.listeners.fire_all(events);
        Ok(worker)
    }

    /// Kill every worker.
    pub fn kill_all(&self) -> Vec<Worker> {
        let mut events = Vec::new();
        let killed = {
            let mut state = self.state.lock();
            let ids: Vec<WorkerId> = state.workers.iter().map(|w| w.id).collect();
            ids.into_iter()
                .filter_map(|id| match self.kill_locked(&mut state, id, &mut events) {
                    Ok(worker) => Some(worker),
                    Err(error) => {
                        tracing::warn!(worker_id = %id, error = %error, "Failed to kill worker");
                        None
                    }
                })
                .collect::<Vec<_>>()
        };

        self.stats
            .workers_killed
            .fetch_add(killed.len() as u64, Ordering::Relaxed);
        tracing::info!(count = killed.len(), "Workers killed");
        self.listeners.fire_all(events);
        killed
    }

    fn kill_locked(
        &self,
        state: &mut PoolState,
        worker_id: WorkerId,
        events: &mut Vec<Event>,
    ) -> Result<Worker> {
        let idx = state.position(worker_id)?;

        if let Some(task_id) = state.workers[idx].task_id() {
            let task = match self.config.kill_policy {
                KillPolicy::Kill => self.queue.kill(task_id)?,
                KillPolicy::Requeue => self.queue.requeue(task_id)?,
            };
            events.push(Event::task_status_changed(&task, TaskStatus::Process));
            if task.status == TaskStatus::Kill {
                events.push(Event::task_kill(&task));
            }
        }

        state.cancel(worker_id);
        let worker = state.workers.remove(idx);
        events.push(Event::worker_remove(&worker));
        Ok(worker)
    }

    /// Return a worker to `wait`; its in-flight task goes back to `wait`
    /// without an attempt or error being recorded.
    pub fn reset(&self, worker_id: WorkerId) -> Result<Worker> {
        let mut events = Vec::new();
        let worker = {
            let mut state = self.state.lock();
            self.reset_locked(&mut state, worker_id, &mut events)?
        };

        tracing::info!(worker_id = %worker_id, "Worker reset");
        self.listeners.fire_all(events);
        Ok(worker)
    }

    /// Reset every worker.
    pub fn reset_all(&self) -> Vec<Worker> {
        let mut events = Vec::new();
        let reset = {
            let mut state = self.state.lock();
            let ids: Vec<WorkerId> = state.workers.iter().map(|w| w.id).collect();
            ids.into_iter()
                .filter_map(|id| match self.reset_locked(&mut state, id, &mut events) {
                    Ok(worker) => Some(worker),
                    Err(error) => {
                        tracing::warn!(worker_id = %id, error = %error, "Failed to reset worker");
                        None
                    }
                })
                .collect::<Vec<_>>()
        };

        tracing::info!(count = reset.len(), "Workers reset");
        self.listeners.fire_all(events);
        reset
    }

    fn reset_locked(
        &self,
        state: &mut PoolState,
        worker_id: WorkerId,
        events: &mut Vec<Event>,
    ) -> Result<Worker> {
        let idx = state.position(worker_id)?;

        if let Some(task_id) = state.workers[idx].task_id() {
            let task = self.queue.requeue(task_id)?;
            events.push(Event::task_status_changed(&task, TaskStatus::Process));
        }

        state.cancel(worker_id);
        let worker = &mut state.workers[idx];
        let prev = worker.status;
        worker.release();
        if prev != WorkerStatus::Wait {
            events.push(Event::worker_status_changed(worker_id, WorkerStatus::Wait, prev));
        }
        Ok(worker.clone())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Execution
    // ─────────────────────────────────────────────────────────────────────────

    /// Hand the next eligible task to an idle worker.
    ///
    /// Returns `Ok(None)` when nothing is eligible; the worker stays in `wait`.
    pub fn assign(&self, worker_id: WorkerId, now: DateTime<Utc>) -> Result<Option<Claimed>> {
        let mut events = Vec::new();
        let claimed = {
            let mut state = self.state.lock();
            let idx = state.position(worker_id)?;
            let worker = &state.workers[idx];
            if !worker.is_idle() {
                return Err(HiveError::invalid_state_transition(
                    "worker", worker_id, worker.status, WorkerStatus::Process,
                ));
            }
            self.assign_locked(&mut state, idx, now, &mut events)?
        };

        self.listeners.fire_all(events);
        Ok(claimed)
    }

    /// Hand eligible tasks to every idle worker, in worker creation order.
    pub fn assign_idle(&self, now: DateTime<Utc>) -> Vec<Claimed> {
        let mut events = Vec::new();
        let mut claimed = Vec::new();
        {
            let mut state = self.state.lock();
            for idx in 0..state.workers.len() {
                if !state.workers[idx].is_idle() {
                    continue;
                }
                match self.assign_locked(&mut state, idx, now, &mut events) {
                    Ok(Some(c)) => claimed.push(c),
                    Ok(None) => break,
                    Err(error) => {
                        tracing::warn!(error = %error, "Failed to assign task");
                        break;
                    }
                }
            }
        }

        self.listeners.fire_all(events);
        claimed
    }

    fn assign_locked(
        &self,
        state: &mut PoolState,
        idx: usize,
        now: DateTime<Utc>,
        events: &mut Vec<Event>,
    ) -> Result<Option<Claimed>> {
        let Some((task, prev)) = self.queue.claim_next(now) else {
            return Ok(None);
        };

        let claim = state.next_claim();
        let worker = &mut state.workers[idx];
        if let Err(error) = worker.assign(task.id, claim, now) {
            self.queue.requeue(task.id)?;
            return Err(error);
        }
        let worker_id = worker.id;

        let cancellation = CancellationToken::new();
        state.cancellations.insert(worker_id, cancellation.clone());

        self.stats.tasks_assigned.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(worker_id = %worker_id, task_id = %task.id, claim = %claim, "Task assigned");

        events.push(Event::task_status_changed(&task, prev));
        events.push(Event::worker_status_changed(worker_id, WorkerStatus::Process, WorkerStatus::Wait));

        Ok(Some(Claimed {
            worker_id,
            claim,
            task,
            cancellation,
        }))
    }

    /// The executor started the task body: `process → busy`.
    pub fn mark_busy(&self, worker_id: WorkerId, claim: ClaimToken) -> Result<()> {
        let events = {
            let mut state = self.state.lock();
            let idx = state.position(worker_id)?;
            let worker = &mut state.workers[idx];
            worker.mark_busy(claim)?;

            let mut events = vec![Event::worker_status_changed(
                worker_id,
                WorkerStatus::Busy,
                WorkerStatus::Process,
            )];
            if let Some(task) = worker.task_id().and_then(|id| self.queue.get(id)) {
                events.push(Event::task_execute_start(&task, worker_id));
            }
            events
        };

        self.listeners.fire_all(events);
        Ok(())
    }

    /// Report the outcome of the task the worker currently holds.
    pub fn complete(&self, worker_id: WorkerId, outcome: TaskOutcome) -> Result<Task> {
        let claim = {
            let state = self.state.lock();
            let idx = state.position(worker_id)?;
            state.workers[idx]
                .assignment
                .map(|a| a.claim)
                .ok_or_else(|| HiveError::stale_claim(worker_id))?
        };
        self.complete_claim(worker_id, claim, outcome)
    }

    /// Report the outcome of the execution bound to `claim`.
    ///
    /// Fails with `StaleClaim` when the worker no longer holds that claim
    /// (it was reset, its task was removed or swept in the meantime).
    pub fn complete_claim(
        &self,
        worker_id: WorkerId,
        claim: ClaimToken,
        outcome: TaskOutcome,
    ) -> Result<Task> {
        let mut events = Vec::new();
        let task = {
            let mut state = self.state.lock();
            let idx = state.position(worker_id)?;
            if !state.workers[idx].holds(claim) {
                self.stats.stale_completions.fetch_add(1, Ordering::Relaxed);
                return Err(HiveError::stale_claim(worker_id));
            }
            self.complete_locked(&mut state, idx, &outcome, Utc::now(), &mut events)?
        };

        self.listeners.fire_all(events);
        Ok(task)
    }

    fn complete_locked(
        &self,
        state: &mut PoolState,
        idx: usize,
        outcome: &TaskOutcome,
        now: DateTime<Utc>,
        events: &mut Vec<Event>,
    ) -> Result<Task> {
        let worker_id = state.workers[idx].id;
        let task_id = state.workers[idx]
            .task_id()
            .ok_or_else(|| HiveError::stale_claim(worker_id))?;

        let task = self.queue.mark_result(task_id, outcome, now)?;

        state.cancel(worker_id);
        let worker = &mut state.workers[idx];
        let prev = worker.status;
        worker.release();

        self.stats.record_outcome(outcome);
        tracing::debug!(
            worker_id = %worker_id,
            task_id = %task_id,
            status = %task.status,
            attempts = task.attempts,
            "Task completed"
        );

        events.push(Event::task_execute_stop(&task, worker_id, outcome));
        events.push(Event::task_status_changed(&task, TaskStatus::Process));
        events.push(Event::task_outcome(&task, outcome));
        events.push(Event::worker_status_changed(worker_id, WorkerStatus::Wait, prev));
        Ok(task)
    }

    /// Fail in-flight tasks past their timeout at `now` and release their
    /// workers.
    pub fn sweep(&self, now: DateTime<Utc>) -> Vec<Task> {
        let mut events = Vec::new();
        let mut swept = Vec::new();
        {
            let mut state = self.state.lock();
            for task_id in self.queue.timed_out(now) {
                let result = match state.holder_of(task_id) {
                    Some(idx) => {
                        self.complete_locked(&mut state, idx, &TaskOutcome::Timeout, now, &mut events)
                    }
                    None => self
                        .queue
                        .mark_result(task_id, &TaskOutcome::Timeout, now)
                        .map(|task| {
                            events.push(Event::task_status_changed(&task, TaskStatus::Process));
                            events.push(Event::task_outcome(&task, &TaskOutcome::Timeout));
                            task
                        }),
                };

                match result {
                    Ok(task) => swept.push(task),
                    Err(error) => {
                        tracing::warn!(task_id = %task_id, error = %error, "Failed to sweep task")
                    }
                }
            }
        }

        if !swept.is_empty() {
            tracing::info!(count = swept.len(), "Timed out tasks swept");
        }
        self.listeners.fire_all(events);
        swept
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Workers holding a task first, each group in creation order.
    pub fn workers(&self) -> Vec<Worker> {
        let mut workers = self.state.lock().workers.clone();
        workers.sort_by_key(|w| w.assignment.is_none());
        workers
    }

    pub fn get(&self, worker_id: WorkerId) -> Option<Worker> {
        self.state
            .lock()
            .workers
            .iter()
            .find(|w| w.id == worker_id)
            .cloned()
    }

    pub fn counts(&self) -> WorkerCounts {
        let state = self.state.lock();
        state.workers.iter().fold(
            WorkerCounts {
                total: state.workers.len(),
                ..Default::default()
            },
            |mut counts, worker| {
                match worker.status {
                    WorkerStatus::Wait => counts.wait += 1,
                    WorkerStatus::Process => counts.process += 1,
                    WorkerStatus::Busy => counts.busy += 1,
                }
                counts
            },
        )
    }

    pub fn len(&self) -> usize {
        self.state.lock().workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get pool statistics.
    pub fn stats(&self) -> WorkerPoolStats {
        let stats = &self.stats;
        WorkerPoolStats {
            max_workers: self.config.max_workers,
            workers: self.counts(),
            tasks_assigned: stats.tasks_assigned.load(Ordering::Relaxed),
            tasks_succeeded: stats.tasks_succeeded.load(Ordering::Relaxed),
            tasks_failed: stats.tasks_failed.load(Ordering::Relaxed),
            tasks_timed_out: stats.tasks_timed_out.load(Ordering::Relaxed),
            stale_completions: stats.stale_completions.load(Ordering::Relaxed),
            workers_added: stats.workers_added.load(Ordering::Relaxed),
            workers_killed: stats.workers_killed.load(Ordering::Relaxed),
            uptime_secs: self.created_at.elapsed().as_secs(),
        }
    }
}
