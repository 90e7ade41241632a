//! Task definitions.
//!
//! This module provides the unit of background work:
//!
//! - **TaskId**: UUID v4 newtype
//! - **TaskStatus**: Lifecycle states, including retry waiting
//! - **TaskOutcome**: What an execution reports back
//! - **Task**: Priority, payload, retry and timeout metadata plus timestamps

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{HiveError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Task Identification
// ═══════════════════════════════════════════════════════════════════════════════

/// Unique identifier for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Create a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TaskId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for TaskId {
    type Err = HiveError;

    /// Malformed ids cannot name an existing task, so they parse to `TaskNotFound`.
    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| HiveError::task_not_found(s))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Task Status
// ═══════════════════════════════════════════════════════════════════════════════

/// Status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting in the queue
    Wait,
    /// Claimed by a worker
    Process,
    /// Completed successfully
    Success,
    /// Failed with no attempts left
    Fail,
    /// Timed out with no attempts left
    FailByTimeout,
    /// Killed together with its worker
    Kill,
    /// Failed, waiting for the repeat interval before the next attempt
    WaitRepeat,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 7] = [
        Self::Wait,
        Self::Process,
        Self::Success,
        Self::Fail,
        Self::FailByTimeout,
        Self::Kill,
        Self::WaitRepeat,
    ];

    /// Terminal tasks are never dispatched again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Kill)
    }

    /// Tasks kept in the finished history.
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Fail | Self::FailByTimeout | Self::Kill)
    }

    /// Tasks sitting in the queue, waiting for a worker.
    pub fn is_waiting(&self) -> bool {
        matches!(self, Self::Wait | Self::WaitRepeat)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wait => "wait",
            Self::Process => "process",
            Self::Success => "success",
            Self::Fail => "fail",
            Self::FailByTimeout => "fail_by_timeout",
            Self::Kill => "kill",
            Self::WaitRepeat => "wait_repeat",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Task Outcome
// ═══════════════════════════════════════════════════════════════════════════════

/// Result reported for one execution of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "error", rename_all = "snake_case")]
pub enum TaskOutcome {
    Success,
    Fail(String),
    Timeout,
}

impl TaskOutcome {
    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Error message recorded on the task, if any.
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success => None,
            Self::Fail(message) => Some(message),
            Self::Timeout => Some("execution timed out"),
        }
    }
}

impl fmt::Display for TaskOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Fail(message) => write!(f, "fail: {}", message),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Task
// ═══════════════════════════════════════════════════════════════════════════════

/// A unit of background work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier
    pub id: TaskId,
    /// Handler name
    pub name: String,
    /// Lower value is more urgent
    pub priority: i64,
    /// Handler input
    pub payload: serde_json::Value,
    /// Current status
    pub status: TaskStatus,
    /// Completed execution attempts
    pub attempts: u32,
    /// Error of the last failed attempt
    pub last_error: Option<String>,
    /// Maximum attempts; `None` repeats without limit
    pub repeats: Option<u32>,
    /// Delay before a failed task becomes eligible again
    #[serde(with = "humantime_serde")]
    pub repeat_interval: Duration,
    /// Maximum execution time
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    /// When the task was created
    pub created_at: DateTime<Utc>,
    /// Earliest time the task may be dispatched
    pub allow_start_at: DateTime<Utc>,
    /// Start of the first execution
    pub first_started_at: Option<DateTime<Utc>>,
    /// Start of the most recent execution
    pub last_started_at: Option<DateTime<Utc>>,
    /// Start of the execution currently in flight
    pub started_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new waiting task for the handler `name`.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            name: name.into(),
            priority: 0,
            payload: serde_json::Value::Null,
            status: TaskStatus::Wait,
            attempts: 0,
            last_error: None,
            repeats: Some(1),
            repeat_interval: Duration::ZERO,
            timeout: None,
            created_at: now,
            allow_start_at: now,
            first_started_at: None,
            last_started_at: None,
            started_at: None,
        }
    }

    pub fn with_id(mut self, id: TaskId) -> Self {
        self.id = id;
        self
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }

    /// Set the attempt limit; `None` repeats until success.
    pub fn with_repeats(mut self, repeats: Option<u32>) -> Self {
        self.repeats = repeats;
        self
    }

    pub fn with_repeat_interval(mut self, interval: Duration) -> Self {
        self.repeat_interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self.allow_start_at = at;
        self
    }

    /// Delay the first dispatch until `at`.
    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.allow_start_at = at;
        self
    }

    /// Whether another attempt is allowed.
    pub fn has_attempts_left(&self) -> bool {
        match self.repeats {
            Some(max) => self.attempts < max,
            None => true,
        }
    }

    /// Whether a worker may claim this task at `now`.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status.is_waiting() && self.has_attempts_left() && self.allow_start_at <= now
    }

    /// Whether the execution in flight has run past its timeout at `now`.
    pub fn is_timed_out(&self, now: DateTime<Utc>) -> bool {
        match (self.status, self.started_at, self.timeout) {
            (TaskStatus::Process, Some(started), Some(timeout)) => {
                let elapsed = now.signed_duration_since(started);
                elapsed.to_std().map(|e| e > timeout).unwrap_or(false)
            }
            _ => false,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transitions
    // ─────────────────────────────────────────────────────────────────────────

    /// Claim for execution.
    pub(crate) fn mark_process(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Process;
        self.started_at = Some(now);
        self.last_started_at = Some(now);
        if self.first_started_at.is_none() {
            self.first_started_at = Some(now);
        }
    }

    /// Record the outcome of the execution in flight.
    pub(crate) fn mark_result(&mut self, outcome: &TaskOutcome, now: DateTime<Utc>) -> Result<TaskStatus> {
        if self.status != TaskStatus::Process {
            let target = if outcome.is_success() {
                TaskStatus::Success
            } else {
                TaskStatus::Fail
            };
            return Err(HiveError::invalid_state_transition(
                "task", self.id, self.status, target,
            ));
        }

        self.attempts += 1;
        self.started_at = None;
        if let Some(error) = outcome.error() {
            self.last_error = Some(error.to_string());
        }

        self.status = match outcome {
            TaskOutcome::Success => TaskStatus::Success,
            _ if self.has_attempts_left() => {
                self.allow_start_at = add_duration(now, self.repeat_interval);
                TaskStatus::WaitRepeat
            }
            TaskOutcome::Timeout => TaskStatus::FailByTimeout,
            TaskOutcome::Fail(_) => TaskStatus::Fail,
        };

        Ok(self.status)
    }

    /// Return the execution in flight to the queue without recording an attempt.
    pub(crate) fn requeue(&mut self) -> Result<()> {
        if self.status != TaskStatus::Process {
            return Err(HiveError::invalid_state_transition(
                "task", self.id, self.status, TaskStatus::Wait,
            ));
        }
        self.status = TaskStatus::Wait;
        self.started_at = None;
        Ok(())
    }

    pub(crate) fn kill(&mut self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(HiveError::invalid_state_transition(
                "task", self.id, self.status, TaskStatus::Kill,
            ));
        }
        self.status = TaskStatus::Kill;
        self.started_at = None;
        Ok(())
    }
}

/// `at + duration`, saturating at the largest representable time.
pub(crate) fn add_duration(at: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|d| at.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id() {
        let id1 = TaskId::new();
        let id2 = TaskId::new();
        assert_ne!(id1, id2);

        let parsed: TaskId = id1.to_string().parse().unwrap();
        assert_eq!(parsed, id1);

        let err = "not-a-uuid".parse::<TaskId>().unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_task_status() {
        assert!(TaskStatus::Success.is_terminal());
        assert!(TaskStatus::Kill.is_terminal());
        assert!(!TaskStatus::Fail.is_terminal());
        assert!(!TaskStatus::WaitRepeat.is_terminal());

        assert!(TaskStatus::Fail.is_finished());
        assert!(TaskStatus::FailByTimeout.is_finished());
        assert!(!TaskStatus::Success.is_finished());

        assert_eq!(TaskStatus::FailByTimeout.to_string(), "fail_by_timeout");
        assert_eq!(
            serde_json::to_value(TaskStatus::WaitRepeat).unwrap(),
            "wait_repeat"
        );
    }

    #[test]
    fn test_task_builder() {
        let task = Task::new("mail")
            .with_priority(-3)
            .with_payload(serde_json::json!({"to": "ops"}))
            .with_repeats(Some(3))
            .with_timeout(Duration::from_secs(5));

        assert_eq!(task.name, "mail");
        assert_eq!(task.priority, -3);
        assert_eq!(task.status, TaskStatus::Wait);
        assert_eq!(task.repeats, Some(3));
        assert_eq!(task.timeout, Some(Duration::from_secs(5)));
        assert!(task.is_eligible(Utc::now()));
    }

    #[test]
    fn test_scheduled_task_not_eligible_early() {
        let now = Utc::now();
        let task = Task::new("later").scheduled_for(now + chrono::Duration::seconds(10));

        assert!(!task.is_eligible(now));
        assert!(task.is_eligible(now + chrono::Duration::seconds(10)));
    }

    #[test]
    fn test_fail_with_attempts_left_waits_for_repeat() {
        let now = Utc::now();
        let mut task = Task::new("flaky")
            .with_repeats(Some(2))
            .with_repeat_interval(Duration::from_secs(30));

        task.mark_process(now);
        let status = task.mark_result(&TaskOutcome::fail("boom"), now).unwrap();

        assert_eq!(status, TaskStatus::WaitRepeat);
        assert_eq!(task.attempts, 1);
        assert_eq!(task.last_error.as_deref(), Some("boom"));
        assert_eq!(task.allow_start_at, now + chrono::Duration::seconds(30));
        assert!(!task.is_eligible(now));
        assert!(task.is_eligible(now + chrono::Duration::seconds(30)));

        task.mark_process(now);
        let status = task.mark_result(&TaskOutcome::fail("boom again"), now).unwrap();
        assert_eq!(status, TaskStatus::Fail);
        assert_eq!(task.attempts, 2);
    }

    #[test]
    fn test_timeout_without_attempts_left() {
        let now = Utc::now();
        let mut task = Task::new("slow");
        task.mark_process(now);

        let status = task.mark_result(&TaskOutcome::Timeout, now).unwrap();
        assert_eq!(status, TaskStatus::FailByTimeout);
        assert!(task.started_at.is_none());
    }

    #[test]
    fn test_unlimited_repeats() {
        let now = Utc::now();
        let mut task = Task::new("forever").with_repeats(None);

        for _ in 0..5 {
            task.mark_process(now);
            assert_eq!(
                task.mark_result(&TaskOutcome::fail("again"), now).unwrap(),
                TaskStatus::WaitRepeat
            );
        }
        assert_eq!(task.attempts, 5);
    }

    #[test]
    fn test_mark_result_requires_process() {
        let mut task = Task::new("idle");
        let err = task.mark_result(&TaskOutcome::Success, Utc::now()).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::InvalidStateTransition);
        assert_eq!(task.attempts, 0);
    }

    #[test]
    fn test_start_timestamps() {
        let first = Utc::now();
        let second = first + chrono::Duration::seconds(5);
        let mut task = Task::new("ts").with_repeats(Some(2));

        task.mark_process(first);
        task.mark_result(&TaskOutcome::fail("x"), first).unwrap();
        task.mark_process(second);

        assert_eq!(task.first_started_at, Some(first));
        assert_eq!(task.last_started_at, Some(second));
        assert_eq!(task.started_at, Some(second));
    }

    #[test]
    fn test_timed_out() {
        let start = Utc::now();
        let mut task = Task::new("t").with_timeout(Duration::from_millis(100));
        assert!(!task.is_timed_out(start + chrono::Duration::seconds(1)));

        task.mark_process(start);
        assert!(!task.is_timed_out(start + chrono::Duration::milliseconds(50)));
        assert!(task.is_timed_out(start + chrono::Duration::milliseconds(150)));
    }

    #[test]
    fn test_kill_terminal_rejected() {
        let now = Utc::now();
        let mut task = Task::new("k");
        task.kill().unwrap();
        assert_eq!(task.status, TaskStatus::Kill);
        assert!(task.kill().is_err());

        let mut done = Task::new("d");
        done.mark_process(now);
        done.mark_result(&TaskOutcome::Success, now).unwrap();
        assert!(done.kill().is_err());
    }

    #[test]
    fn test_requeue_keeps_attempts() {
        let now = Utc::now();
        let mut task = Task::new("r");
        task.mark_process(now);
        task.requeue().unwrap();

        assert_eq!(task.status, TaskStatus::Wait);
        assert_eq!(task.attempts, 0);
        assert!(task.last_error.is_none());
        assert!(task.started_at.is_none());
        assert!(task.requeue().is_err());
    }
}
