//! Control commands and their parsing from `action` + form fields.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{HiveError, Result};
use crate::events::EventKind;
use crate::jobs::{TaskId, WorkerId};

/// Form body of `POST /workers?action=...`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlForm {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub count: Option<String>,
    #[serde(default)]
    pub events: Option<String>,
}

impl ControlForm {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_count(mut self, count: impl fmt::Display) -> Self {
        self.count = Some(count.to_string());
        self
    }

    pub fn with_events(mut self, events: impl Into<String>) -> Self {
        self.events = Some(events.into());
        self
    }

    /// Trimmed id, `None` when absent or blank.
    fn id(&self) -> Option<&str> {
        self.id.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

/// A mutating command against the pool, queue or listener registry.
///
/// `None` targets mean every (unlocked) entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    WorkersAdd { count: usize },
    WorkersKill { id: Option<WorkerId> },
    WorkersReset { id: Option<WorkerId> },
    TasksRemove { id: TaskId },
    ListenersRemove {
        name: Option<String>,
        events: Option<Vec<EventKind>>,
    },
}

impl ControlCommand {
    /// Parse `action` and its form fields.
    ///
    /// Malformed ids yield `NotFound`, malformed counts a validation error.
    pub fn parse(action: &str, form: &ControlForm) -> Result<Self> {
        match action {
            "workers-add" => {
                let raw = form
                    .count
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| HiveError::missing_field("count"))?;
                let count = raw
                    .parse::<usize>()
                    .ok()
                    .filter(|c| *c > 0)
                    .ok_or_else(|| {
                        HiveError::invalid_input("count", format!("count must be a positive integer, got '{raw}'"))
                    })?;
                Ok(Self::WorkersAdd { count })
            }
            "workers-remove" | "workers-kill" => Ok(Self::WorkersKill {
                id: form.id().map(str::parse).transpose()?,
            }),
            "workers-reset" => Ok(Self::WorkersReset {
                id: form.id().map(str::parse).transpose()?,
            }),
            "tasks-remove" | "task-remove" => {
                let id = form.id().ok_or_else(|| HiveError::missing_field("id"))?;
                Ok(Self::TasksRemove { id: id.parse()? })
            }
            "listeners-remove" => {
                let events = match form.events.as_deref() {
                    Some(list) => Some(EventKind::parse_list(list)?).filter(|e| !e.is_empty()),
                    None => None,
                };
                Ok(Self::ListenersRemove {
                    name: form.id().map(str::to_string),
                    events,
                })
            }
            other => Err(HiveError::unknown_action(other)),
        }
    }

    /// Canonical action name.
    pub fn action(&self) -> &'static str {
        match self {
            Self::WorkersAdd { .. } => "workers-add",
            Self::WorkersKill { .. } => "workers-kill",
            Self::WorkersReset { .. } => "workers-reset",
            Self::TasksRemove { .. } => "tasks-remove",
            Self::ListenersRemove { .. } => "listeners-remove",
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.action())
    }
}
