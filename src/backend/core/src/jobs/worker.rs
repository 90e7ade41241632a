//! Worker slots.
//!
//! A worker holds at most one task at a time. Each claim of a task is bound
//! to the worker by a [`ClaimToken`]; completions carrying a token the worker
//! no longer holds are stale and get rejected by the pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::task::TaskId;
use crate::error::{HiveError, Result};

/// Unique identifier for a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub Uuid);

impl WorkerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorkerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WorkerId {
    type Err = HiveError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| HiveError::worker_not_found(s))
    }
}

/// Token binding one worker to one execution of one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimToken(pub u64);

impl fmt::Display for ClaimToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "claim-{}", self.0)
    }
}

/// Status of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// Idle, ready to claim a task
    Wait,
    /// Holding a task whose execution has not started yet
    Process,
    /// Executing its task
    Busy,
}

impl WorkerStatus {
    pub const ALL: [WorkerStatus; 3] = [Self::Wait, Self::Process, Self::Busy];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wait => "wait",
            Self::Process => "process",
            Self::Busy => "busy",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The task a worker currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub task_id: TaskId,
    pub claim: ClaimToken,
    pub assigned_at: DateTime<Utc>,
}

/// An execution slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    pub created_at: DateTime<Utc>,
    pub status: WorkerStatus,
    pub assignment: Option<Assignment>,
}

impl Worker {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            id: WorkerId::new(),
            created_at: now,
            status: WorkerStatus::Wait,
            assignment: None,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.status == WorkerStatus::Wait
    }

    pub fn task_id(&self) -> Option<TaskId> {
        self.assignment.map(|a| a.task_id)
    }

    /// Whether `claim` is the claim this worker currently holds.
    pub fn holds(&self, claim: ClaimToken) -> bool {
        self.assignment.map(|a| a.claim == claim).unwrap_or(false)
    }

    pub(crate) fn assign(&mut self, task_id: TaskId, claim: ClaimToken, now: DateTime<Utc>) -> Result<()> {
        if self.status != WorkerStatus::Wait {
            return Err(HiveError::invalid_state_transition(
                "worker", self.id, self.status, WorkerStatus::Process,
            ));
        }
        self.assignment = Some(Assignment {
            task_id,
            claim,
            assigned_at: now,
        });
        self.status = WorkerStatus::Process;
        Ok(())
    }

    pub(crate) fn mark_busy(&mut self, claim: ClaimToken) -> Result<()> {
        if !self.holds(claim) {
            return Err(HiveError::stale_claim(self.id));
        }
        if self.status != WorkerStatus::Process {
            return Err(HiveError::invalid_state_transition(
                "worker", self.id, self.status, WorkerStatus::Busy,
            ));
        }
        self.status = WorkerStatus::Busy;
        Ok(())
    }

    /// Drop the assignment and go back to `wait`.
    pub(crate) fn release(&mut self) -> Option<Assignment> {
        self.status = WorkerStatus::Wait;
        self.assignment.take()
    }
}
