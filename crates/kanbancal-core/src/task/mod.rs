//! Task types for the kanban board.
//!
//! A task optionally carries a deadline; tasks with deadlines are picked up
//! by the deadline notifier. The `last_notified` watermark records the most
//! urgent deadline threshold already announced for the task and is owned by
//! the storage layer -- domain code never mutates it directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::notify::threshold::Watermark;

/// Task status enumeration.
///
/// `Done` is terminal for notification purposes: done tasks are permanently
/// exempt from deadline evaluation. Reopening a done task (any transition
/// away from `Done`) resets its notification watermark in the storage layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is open and not yet started (initial state)
    Open,
    /// Task is being worked on
    InProgress,
    /// Task is completed
    Done,
}

impl TaskStatus {
    /// Human-readable label for notification messages.
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Open => "Open",
            TaskStatus::InProgress => "In progress",
            TaskStatus::Done => "Done",
        }
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        TaskStatus::Open
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Task priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn label(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A task on the board.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: String,
    /// Task title
    pub title: String,
    /// Optional description
    pub description: Option<String>,
    /// Current status
    pub status: TaskStatus,
    /// Optional priority
    pub priority: Option<Priority>,
    /// Optional assignee name
    pub assignee: Option<String>,
    /// Tags for categorization
    #[serde(default)]
    pub tags: Vec<String>,
    /// Deadline (None means the task is exempt from deadline notifications)
    pub deadline: Option<DateTime<Utc>>,
    /// Start date for the calendar projection
    pub start_date: Option<DateTime<Utc>>,
    /// End date for the calendar projection
    pub end_date: Option<DateTime<Utc>>,
    /// Most urgent deadline threshold already announced for this task.
    /// Starts at the sentinel ("never notified") and only ever tightens,
    /// except for explicit resets on deadline change or reopen.
    #[serde(default = "Watermark::sentinel")]
    pub last_notified: Watermark,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new open task with default values and a fresh watermark.
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            description: None,
            status: TaskStatus::Open,
            priority: None,
            assignee: None,
            tags: Vec::new(),
            deadline: None,
            start_date: None,
            end_date: None,
            last_notified: Watermark::sentinel(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the task is in a terminal state for notification purposes.
    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }
}
