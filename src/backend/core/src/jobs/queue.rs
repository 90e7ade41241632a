//! Task queue with priority ordering and finished-task history.
//!
//! Live tasks (`wait`, `process`, `wait_repeat`) are held in a map; the
//! waiting ones are also indexed in dispatch order: priority ascending, then
//! `created_at`, then insertion sequence. Tasks ending in `fail`,
//! `fail_by_timeout` or `kill` move to a bounded [`FinishedHistory`].

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};

use super::task::{Task, TaskId, TaskOutcome, TaskStatus};
use crate::error::{HiveError, Result};

/// Configuration for the task queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum tasks kept in the finished history (oldest evicted first)
    pub finished_capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            finished_capacity: 1000,
        }
    }
}

/// Dispatch-order key of a waiting task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    priority: i64,
    created_at: DateTime<Utc>,
    seq: u64,
    id: TaskId,
}

/// A live task with its insertion sequence.
#[derive(Debug, Clone)]
struct QueuedTask {
    task: Task,
    seq: u64,
}

impl QueuedTask {
    fn key(&self) -> QueueKey {
        QueueKey {
            priority: self.task.priority,
            created_at: self.task.created_at,
            seq: self.seq,
            id: self.task.id,
        }
    }
}

/// Queue statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Tasks in `wait` or `wait_repeat`
    pub waiting: usize,
    /// Tasks in `process`
    pub in_flight: usize,
    /// Tasks in the finished history
    pub finished: usize,
}

impl QueueStats {
    pub fn total(&self) -> usize {
        self.waiting + self.in_flight + self.finished
    }
}

/// Bounded history of failed and killed tasks.
#[derive(Debug)]
pub struct FinishedHistory {
    tasks: VecDeque<Task>,
    max_size: usize,
}

impl FinishedHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            tasks: VecDeque::new(),
            max_size,
        }
    }

    /// Append a task, returning the evicted one when full.
    pub fn push(&mut self, task: Task) -> Option<Task> {
        if self.max_size == 0 {
            return Some(task);
        }
        let evicted = if self.tasks.len() >= self.max_size {
            self.tasks.pop_front()
        } else {
            None
        };
        self.tasks.push_back(task);
        evicted
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn get_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        let index = self.tasks.iter().position(|t| t.id == id)?;
        self.tasks.remove(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[derive(Debug)]
struct QueueState {
    tasks: HashMap<TaskId, QueuedTask>,
    ready: BTreeSet<QueueKey>,
    finished: FinishedHistory,
    next_seq: u64,
}

impl QueueState {
    fn settle(&mut self, id: TaskId) {
        let Some(queued) = self.tasks.get(&id) else {
            return;
        };
        let key = queued.key();
        let status = queued.task.status;

        if status.is_waiting() {
            self.ready.insert(key);
        } else {
            self.ready.remove(&key);
        }

        if status.is_finished() || status == TaskStatus::Success {
            if let Some(queued) = self.tasks.remove(&id) {
                if status.is_finished() {
                    if let Some(evicted) = self.finished.push(queued.task) {
                        tracing::debug!(task_id = %evicted.id, "Evicted task from finished history");
                    }
                }
            }
        }
    }
}

/// Thread-safe priority task queue.
///
/// Every operation runs under one mutex, so selecting and claiming a task in
/// [`TaskQueue::dequeue_next`] is atomic.
#[derive(Debug)]
pub struct TaskQueue {
    state: Mutex<QueueState>,
}

impl TaskQueue {
    /// Create a new task queue.
    pub fn new(config: QueueConfig) -> Self {
        Self {
            state: Mutex::new(QueueState {
                tasks: HashMap::new(),
                ready: BTreeSet::new(),
                finished: FinishedHistory::new(config.finished_capacity),
                next_seq: 0,
            }),
        }
    }

    /// Add a waiting task.
    pub fn enqueue(&self, task: Task) -> Result<Task> {
        if !task.status.is_waiting() {
            return Err(HiveError::invalid_state_transition(
                "task", task.id, task.status, TaskStatus::Wait,
            ));
        }
        if task.repeats == Some(0) {
            return Err(HiveError::invalid_input("repeats", "repeats must be at least 1"));
        }
        if !task.has_attempts_left() {
            return Err(HiveError::invalid_input(
                "attempts",
                format!("task has no attempts left ({} used)", task.attempts),
            ));
        }

        let mut state = self.state.lock();
        if state.tasks.contains_key(&task.id) || state.finished.get(task.id).is_some() {
            return Err(HiveError::duplicate_task(task.id));
        }

        let seq = state.next_seq;
        state.next_seq += 1;

        let id = task.id;
        let snapshot = task.clone();
        state.tasks.insert(id, QueuedTask { task, seq });
        state.settle(id);

        Ok(snapshot)
    }

    /// Claim the most urgent task eligible at `now`, marking it `process`.
    pub fn dequeue_next(&self, now: DateTime<Utc>) -> Option<Task> {
        self.claim_next(now).map(|(task, _)| task)
    }

    /// Like [`TaskQueue::dequeue_next`], also returning the status the task
    /// was claimed from.
    pub(crate) fn claim_next(&self, now: DateTime<Utc>) -> Option<(Task, TaskStatus)> {
        let mut state = self.state.lock();

        let key = state
            .ready
            .iter()
            .find(|key| {
                state
                    .tasks
                    .get(&key.id)
                    .map(|q| q.task.is_eligible(now))
                    .unwrap_or(false)
            })
            .copied()?;

        state.ready.remove(&key);
        let queued = state.tasks.get_mut(&key.id)?;
        let prev = queued.task.status;
        queued.task.mark_process(now);
        Some((queued.task.clone(), prev))
    }

    /// Record the outcome of a task in `process`.
    ///
    /// Returns the task as it stands after the transition; a `success` task
    /// has already left the queue.
    pub fn mark_result(&self, id: TaskId, outcome: &TaskOutcome, now: DateTime<Utc>) -> Result<Task> {
        let mut state = self.state.lock();
        let queued = state
            .tasks
            .get_mut(&id)
            .ok_or_else(|| HiveError::task_not_found(id))?;

        queued.task.mark_result(outcome, now)?;
        let snapshot = queued.task.clone();
        state.settle(id);

        Ok(snapshot)
    }

    /// Return an in-flight task to `wait` without recording an attempt.
    pub fn requeue(&self, id: TaskId) -> Result<Task> {
        let mut state = self.state.lock();
        let queued = state
            .tasks
            .get_mut(&id)
            .ok_or_else(|| HiveError::task_not_found(id))?;

        queued.task.requeue()?;
        let snapshot = queued.task.clone();
        state.settle(id);

        Ok(snapshot)
    }

    /// Mark a task `kill`, moving it to the finished history.
    pub fn kill(&self, id: TaskId) -> Result<Task> {
        let mut state = self.state.lock();

        if let Some(queued) = state.tasks.get_mut(&id) {
            queued.task.kill()?;
            let snapshot = queued.task.clone();
            state.settle(id);
            return Ok(snapshot);
        }

        match state.finished.get_mut(id) {
            Some(task) => {
                task.kill()?;
                Ok(task.clone())
            }
            None => Err(HiveError::task_not_found(id)),
        }
    }

    /// Remove a task wherever it is.
    pub fn remove(&self, id: TaskId) -> Result<Task> {
        let mut state = self.state.lock();

        if let Some(queued) = state.tasks.remove(&id) {
            state.ready.remove(&queued.key());
            return Ok(queued.task);
        }

        state
            .finished
            .remove(id)
            .ok_or_else(|| HiveError::task_not_found(id))
    }

    /// Ids of in-flight tasks past their timeout at `now`.
    pub fn timed_out(&self, now: DateTime<Utc>) -> Vec<TaskId> {
        let state = self.state.lock();
        state
            .tasks
            .values()
            .filter(|q| q.task.is_timed_out(now))
            .map(|q| q.task.id)
            .collect()
    }

    pub fn get(&self, id: TaskId) -> Option<Task> {
        let state = self.state.lock();
        state
            .tasks
            .get(&id)
            .map(|q| q.task.clone())
            .or_else(|| state.finished.get(id).cloned())
    }

    pub fn contains(&self, id: TaskId) -> bool {
        let state = self.state.lock();
        state.tasks.contains_key(&id) || state.finished.get(id).is_some()
    }

    /// Waiting tasks in dispatch order.
    pub fn waiting(&self) -> Vec<Task> {
        let state = self.state.lock();
        state
            .ready
            .iter()
            .filter_map(|key| state.tasks.get(&key.id))
            .map(|q| q.task.clone())
            .collect()
    }

    /// All tasks: waiting in dispatch order, then in-flight, then finished.
    pub fn list(&self) -> Vec<Task> {
        let state = self.state.lock();
        let mut in_flight: Vec<&QueuedTask> = state
            .tasks
            .values()
            .filter(|q| q.task.status == TaskStatus::Process)
            .collect();
        in_flight.sort_by_key(|q| q.key());

        state
            .ready
            .iter()
            .filter_map(|key| state.tasks.get(&key.id))
            .chain(in_flight)
            .map(|q| q.task.clone())
            .chain(state.finished.iter().cloned())
            .collect()
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.state.lock();
        QueueStats {
            waiting: state.ready.len(),
            in_flight: state.tasks.len() - state.ready.len(),
            finished: state.finished.len(),
        }
    }

    /// Number of tasks held, finished history included.
    pub fn len(&self) -> usize {
        self.stats().total()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_enqueue_dequeue() {
        let queue = TaskQueue::default();
        let task = Task::new("test_task");
        let id = task.id;

        queue.enqueue(task).unwrap();
        assert_eq!(queue.stats().waiting, 1);

        let claimed = queue.dequeue_next(Utc::now()).unwrap();
        assert_eq!(claimed.id, id);
        assert_eq!(claimed.status, TaskStatus::Process);
        assert!(claimed.started_at.is_some());

        assert!(queue.dequeue_next(Utc::now()).is_none());
        assert_eq!(queue.stats().in_flight, 1);
    }

    #[test]
    fn test_duplicate_rejected() {
        let queue = TaskQueue::default();
        let task = Task::new("dup");

        queue.enqueue(task.clone()).unwrap();
        let err = queue.enqueue(task).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::DuplicateTask);
    }

    #[test]
    fn test_priority_ordering() {
        let queue = TaskQueue::default();
        let now = Utc::now();

        let a = Task::new("a").with_priority(5).with_created_at(now);
        let b = Task::new("b").with_priority(1).with_created_at(now);
        let c = Task::new("c").with_priority(5).with_created_at(now);
        queue.enqueue(a).unwrap();
        queue.enqueue(b).unwrap();
        queue.enqueue(c).unwrap();

        let order: Vec<String> = std::iter::from_fn(|| queue.dequeue_next(now))
            .map(|t| t.name)
            .collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_created_at_breaks_priority_ties() {
        let queue = TaskQueue::default();
        let now = Utc::now();

        let newer = Task::new("newer").with_created_at(now);
        let older = Task::new("older").with_created_at(now - chrono::Duration::seconds(1));
        queue.enqueue(newer).unwrap();
        queue.enqueue(older).unwrap();

        assert_eq!(queue.dequeue_next(now).unwrap().name, "older");
    }

    #[test]
    fn test_success_removes_task() {
        let queue = TaskQueue::default();
        let id = queue.enqueue(Task::new("ok")).unwrap().id;
        queue.dequeue_next(Utc::now()).unwrap();

        let done = queue.mark_result(id, &TaskOutcome::Success, Utc::now()).unwrap();
        assert_eq!(done.status, TaskStatus::Success);
        assert!(queue.get(id).is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_failure_goes_to_history() {
        let queue = TaskQueue::default();
        let id = queue.enqueue(Task::new("bad")).unwrap().id;
        queue.dequeue_next(Utc::now()).unwrap();

        queue.mark_result(id, &TaskOutcome::fail("nope"), Utc::now()).unwrap();
        let task = queue.get(id).unwrap();
        assert_eq!(task.status, TaskStatus::Fail);
        assert_eq!(queue.stats().finished, 1);
        assert!(queue.dequeue_next(Utc::now()).is_none());

        queue.remove(id).unwrap();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_wait_repeat_respects_interval() {
        let queue = TaskQueue::default();
        let now = Utc::now();
        let id = queue
            .enqueue(
                Task::new("retry")
                    .with_repeats(Some(2))
                    .with_repeat_interval(Duration::from_secs(60)),
            )
            .unwrap()
            .id;

        queue.dequeue_next(now).unwrap();
        queue.mark_result(id, &TaskOutcome::fail("x"), now).unwrap();

        assert!(queue.dequeue_next(now).is_none());
        let later = now + chrono::Duration::seconds(60);
        let again = queue.dequeue_next(later).unwrap();
        assert_eq!(again.id, id);
        assert_eq!(again.attempts, 1);
    }

    #[test]
    fn test_mark_result_requires_process() {
        let queue = TaskQueue::default();
        let id = queue.enqueue(Task::new("idle")).unwrap().id;

        let err = queue.mark_result(id, &TaskOutcome::Success, Utc::now()).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidStateTransition);
        assert_eq!(queue.get(id).unwrap().status, TaskStatus::Wait);
    }

    #[test]
    fn test_remove_missing() {
        let queue = TaskQueue::default();
        assert!(queue.remove(TaskId::new()).unwrap_err().is_not_found());
    }

    #[test]
    fn test_kill_waiting_task() {
        let queue = TaskQueue::default();
        let id = queue.enqueue(Task::new("victim")).unwrap().id;

        queue.kill(id).unwrap();
        assert_eq!(queue.get(id).unwrap().status, TaskStatus::Kill);
        assert!(queue.dequeue_next(Utc::now()).is_none());
        assert!(queue.kill(id).is_err());
    }

    #[test]
    fn test_requeue() {
        let queue = TaskQueue::default();
        let id = queue.enqueue(Task::new("back")).unwrap().id;
        queue.dequeue_next(Utc::now()).unwrap();

        let task = queue.requeue(id).unwrap();
        assert_eq!(task.status, TaskStatus::Wait);
        assert_eq!(queue.dequeue_next(Utc::now()).unwrap().id, id);
    }

    #[test]
    fn test_timed_out() {
        let queue = TaskQueue::default();
        let start = Utc::now();
        let id = queue
            .enqueue(Task::new("slow").with_timeout(Duration::from_millis(100)))
            .unwrap()
            .id;
        queue.enqueue(Task::new("no-timeout")).unwrap();

        queue.dequeue_next(start).unwrap();
        queue.dequeue_next(start).unwrap();

        assert!(queue.timed_out(start + chrono::Duration::milliseconds(50)).is_empty());
        assert_eq!(
            queue.timed_out(start + chrono::Duration::milliseconds(150)),
            vec![id]
        );
    }

    #[test]
    fn test_finished_history_is_bounded() {
        let queue = TaskQueue::new(QueueConfig {
            finished_capacity: 2,
        });
        let now = Utc::now();

        let mut ids = Vec::new();
        for i in 0..3 {
            let id = queue.enqueue(Task::new(format!("t{}", i))).unwrap().id;
            queue.dequeue_next(now).unwrap();
            queue.mark_result(id, &TaskOutcome::fail("x"), now).unwrap();
            ids.push(id);
        }

        assert_eq!(queue.stats().finished, 2);
        assert!(queue.get(ids[0]).is_none());
        assert!(queue.get(ids[2]).is_some());
    }

    #[test]
    fn test_list_order() {
        let queue = TaskQueue::default();
        let now = Utc::now();
        let running = queue.enqueue(Task::new("running").with_priority(-1)).unwrap().id;
        let waiting = queue.enqueue(Task::new("waiting")).unwrap().id;
        queue.dequeue_next(now).unwrap();

        let ids: Vec<TaskId> = queue.list().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![waiting, running]);
        assert_eq!(queue.waiting().len(), 1);
    }
}
