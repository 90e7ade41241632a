//! Integration tests for the task queue.
//!
//! Tests cover:
//! - Dispatch order by priority, then creation time
//! - Attempt limits and `wait_repeat`
//! - Exclusive claims under concurrent `dequeue_next`
//! - Finished history

use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;

use taskhive_core::error::ErrorCode;
use taskhive_core::jobs::{QueueConfig, Task, TaskId, TaskOutcome, TaskQueue, TaskStatus};

// ============================================================================
// Ordering
// ============================================================================

#[test]
fn test_priority_then_creation_order() {
    let queue = TaskQueue::default();
    let t0 = Utc::now();

    let a = queue.enqueue(Task::new("a").with_priority(5).with_created_at(t0)).unwrap();
    let b = queue
        .enqueue(Task::new("b").with_priority(1).with_created_at(t0 + ChronoDuration::milliseconds(1)))
        .unwrap();
    let c = queue
        .enqueue(Task::new("c").with_priority(5).with_created_at(t0 + ChronoDuration::milliseconds(2)))
        .unwrap();

    let now = t0 + ChronoDuration::seconds(1);
    let order: Vec<TaskId> = std::iter::from_fn(|| queue.dequeue_next(now)).map(|t| t.id).collect();

    assert_eq!(order, vec![b.id, a.id, c.id]);
}

#[test]
fn test_scheduled_task_not_dispatched_early() {
    let queue = TaskQueue::default();
    let now = Utc::now();
    queue
        .enqueue(Task::new("later").scheduled_for(now + ChronoDuration::seconds(10)))
        .unwrap();

    assert!(queue.dequeue_next(now).is_none());
    assert!(queue.dequeue_next(now + ChronoDuration::seconds(11)).is_some());
}

// ============================================================================
// Attempts
// ============================================================================

#[test]
fn test_attempts_never_exceed_repeats() {
    let queue = TaskQueue::default();
    let task = queue.enqueue(Task::new("flaky").with_repeats(Some(3))).unwrap();
    let now = Utc::now();

    for attempt in 1..=3 {
        let claimed = queue.dequeue_next(now).expect("task should be eligible");
        assert_eq!(claimed.status, TaskStatus::Process);

        let after = queue.mark_result(task.id, &TaskOutcome::fail("boom"), now).unwrap();
        assert_eq!(after.attempts, attempt);
        assert!(after.attempts <= 3);
    }

    assert!(queue.dequeue_next(now).is_none());
    let finished = queue.get(task.id).unwrap();
    assert_eq!(finished.status, TaskStatus::Fail);
    assert_eq!(finished.attempts, 3);
    assert_eq!(finished.last_error.as_deref(), Some("boom"));
}

#[test]
fn test_timeout_outcome_on_last_attempt() {
    let queue = TaskQueue::default();
    let task = queue.enqueue(Task::new("slow")).unwrap();
    let now = Utc::now();

    queue.dequeue_next(now).unwrap();
    let after = queue.mark_result(task.id, &TaskOutcome::Timeout, now).unwrap();

    assert_eq!(after.status, TaskStatus::FailByTimeout);
    assert_eq!(queue.stats().finished, 1);
}

#[test]
fn test_success_leaves_queue() {
    let queue = TaskQueue::default();
    let task = queue.enqueue(Task::new("ok")).unwrap();
    let now = Utc::now();

    queue.dequeue_next(now).unwrap();
    let after = queue.mark_result(task.id, &TaskOutcome::Success, now).unwrap();

    assert_eq!(after.status, TaskStatus::Success);
    assert!(!queue.contains(task.id));
    assert!(queue.is_empty());
}

#[test]
fn test_duplicate_rejected() {
    let queue = TaskQueue::default();
    let task = queue.enqueue(Task::new("once")).unwrap();

    let err = queue.enqueue(Task::new("once").with_id(task.id)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::DuplicateTask);
}

#[test]
fn test_exhausted_task_rejected() {
    let queue = TaskQueue::default();
    let mut task = Task::new("spent").with_repeats(Some(1));
    task.attempts = 1;

    let err = queue.enqueue(task).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidInput);
    assert!(queue.is_empty());
    assert_eq!(queue.stats().waiting, 0);
}

#[test]
fn test_finished_history_bounded() {
    let queue = TaskQueue::new(QueueConfig { finished_capacity: 2 });
    let now = Utc::now();

    let ids: Vec<TaskId> = (0..3)
        .map(|i| queue.enqueue(Task::new(format!("t{i}"))).unwrap().id)
        .collect();
    for id in &ids {
        queue.dequeue_next(now).unwrap();
        queue.mark_result(*id, &TaskOutcome::fail("nope"), now).unwrap();
    }

    assert_eq!(queue.stats().finished, 2);
    assert!(!queue.contains(ids[0]));
    assert!(queue.contains(ids[2]));
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_dequeue_claims_each_task_once() {
    const TASKS: usize = 500;
    const THREADS: usize = 8;

    let queue = Arc::new(TaskQueue::default());
    for i in 0..TASKS {
        queue.enqueue(Task::new("race").with_priority((i % 7) as i64)).unwrap();
    }

    let claimed = Arc::new(Mutex::new(Vec::new()));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let queue = queue.clone();
            let claimed = claimed.clone();
            thread::spawn(move || {
                let now = Utc::now();
                let mut mine = Vec::new();
                while let Some(task) = queue.dequeue_next(now) {
                    mine.push(task.id);
                }
                claimed.lock().unwrap().extend(mine);
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let claimed = claimed.lock().unwrap();
    let unique: HashSet<&TaskId> = claimed.iter().collect();
    assert_eq!(claimed.len(), TASKS);
    assert_eq!(unique.len(), TASKS);
    assert_eq!(queue.stats().in_flight, TASKS);
    assert_eq!(queue.stats().waiting, 0);
}
