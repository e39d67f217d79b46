//! Notification payload.
//!
//! The structured message handed to a sink when a threshold fires. Sinks own
//! the final rendering; the alert carries everything they need, including a
//! deep link back to the board.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::threshold::Threshold;
use crate::task::{Priority, Task, TaskStatus};

/// Structured payload for a crossed deadline threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadlineAlert {
    pub task_id: String,
    pub title: String,
    pub status: TaskStatus,
    pub assignee: Option<String>,
    pub priority: Option<Priority>,
    /// The task's deadline.
    pub deadline: DateTime<Utc>,
    /// Signed hours remaining at evaluation time (negative when overdue).
    pub hours_left: f64,
    /// The threshold that fired.
    pub threshold: Threshold,
    /// Deep link to the task on the board frontend.
    pub url: String,
}

impl DeadlineAlert {
    /// Build an alert for `task` crossing `threshold`.
    ///
    /// The deep link is `<base_url>/tasks/<id>`; a trailing slash on the
    /// base URL is tolerated.
    pub fn new(
        task: &Task,
        deadline: DateTime<Utc>,
        threshold: Threshold,
        hours_left: f64,
        base_url: &str,
    ) -> Self {
        Self {
            task_id: task.id.clone(),
            title: task.title.clone(),
            status: task.status,
            assignee: task.assignee.clone(),
            priority: task.priority,
            deadline,
            hours_left,
            threshold,
            url: format!("{}/tasks/{}", base_url.trim_end_matches('/'), task.id),
        }
    }

    /// Whether the deadline had already passed at evaluation time.
    pub fn is_overdue(&self) -> bool {
        self.hours_left < 0.0
    }
}
