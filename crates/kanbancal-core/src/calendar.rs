//! Calendar projection of tasks.
//!
//! Pure data plumbing for the board's calendar view: tasks are mapped to
//! colored events, with the deadline standing in for a missing end date.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::task::{Task, TaskStatus};

/// A task rendered as a calendar event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: TaskStatus,
    pub color: String,
}

impl CalendarEvent {
    /// Project a task onto the calendar.
    ///
    /// Start falls back to `now`, end falls back to the deadline and then
    /// to one day after start.
    pub fn from_task(task: &Task, now: DateTime<Utc>) -> Self {
        let color = match task.status {
            TaskStatus::Done => "#28a745",
            TaskStatus::InProgress => "#ffc107",
            TaskStatus::Open => "#3174ad",
        };

        let start = task.start_date.unwrap_or(now);
        let end = task
            .end_date
            .or(task.deadline)
            .unwrap_or_else(|| start + Duration::hours(24));

        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
            start,
            end,
            status: task.status,
            color: color.to_string(),
        }
    }

    /// Whether the event overlaps a time range.
    pub fn overlaps(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> bool {
        self.start < to && self.end > from
    }
}
