//! SQLite-based task storage and notification audit log.
//!
//! Owns the notification watermark: the `last_notified_hours` column is
//! written only here, either by a conditional advance after a confirmed
//! delivery or by an explicit reset when a task's deadline changes or the
//! task is reopened.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

use super::data_dir;
use crate::error::DatabaseError;
use crate::notify::{TaskSource, Threshold, Watermark, WatermarkUpdate};
use crate::task::{Priority, Task, TaskStatus};

// === Helper Functions ===

/// Parse task status from database string
fn parse_status(status_str: &str) -> TaskStatus {
    match status_str {
        "in_progress" => TaskStatus::InProgress,
        "done" => TaskStatus::Done,
        _ => TaskStatus::Open,
    }
}

/// Format task status for database storage
fn format_status(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Open => "open",
        TaskStatus::InProgress => "in_progress",
        TaskStatus::Done => "done",
    }
}

/// Parse priority from database string
fn parse_priority(priority_str: Option<&str>) -> Option<Priority> {
    match priority_str {
        Some("low") => Some(Priority::Low),
        Some("medium") => Some(Priority::Medium),
        Some("high") => Some(Priority::High),
        _ => None,
    }
}

/// Format priority for database storage
fn format_priority(priority: Option<Priority>) -> Option<&'static str> {
    priority.map(|p| p.label())
}

/// Parse datetime from RFC3339 string with fallback to current time
fn parse_datetime_fallback(dt_str: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(dt_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|err| {
            warn!("falling back to now for malformed timestamp '{dt_str}': {err}");
            Utc::now()
        })
}

/// Parse an optional datetime column. Malformed values are dropped with a
/// warning instead of aborting the row -- a bad deadline just exempts the
/// task from notifications for this read.
fn parse_datetime_opt(dt_str: Option<String>) -> Option<DateTime<Utc>> {
    let dt_str = dt_str?;
    match DateTime::parse_from_rfc3339(&dt_str) {
        Ok(dt) => Some(dt.with_timezone(&Utc)),
        Err(err) => {
            warn!("dropping malformed timestamp '{dt_str}': {err}");
            None
        }
    }
}

/// Build a Task from a database row (column order of `TASK_COLUMNS`).
fn row_to_task(row: &rusqlite::Row) -> Result<Task, rusqlite::Error> {
    let status_str: String = row.get(3)?;
    let priority_str: Option<String> = row.get(4)?;
    let tags_json: String = row.get(6)?;
    let created_at_str: String = row.get(11)?;
    let updated_at_str: String = row.get(12)?;

    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        status: parse_status(&status_str),
        priority: parse_priority(priority_str.as_deref()),
        assignee: row.get(5)?,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        deadline: parse_datetime_opt(row.get(7)?),
        start_date: parse_datetime_opt(row.get(8)?),
        end_date: parse_datetime_opt(row.get(9)?),
        last_notified: Watermark::from_hours(row.get(10)?),
        created_at: parse_datetime_fallback(&created_at_str),
        updated_at: parse_datetime_fallback(&updated_at_str),
    })
}

const TASK_COLUMNS: &str = "id, title, description, status, priority, assignee, tags, \
     deadline, start_date, end_date, last_notified_hours, created_at, updated_at";

/// A row in the best-effort notification audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: i64,
    pub task_id: String,
    pub kind: String,
    pub message: String,
    pub sent_at: DateTime<Utc>,
}

/// SQLite database for tasks.
///
/// The connection sits behind a mutex so the scheduler loop can share the
/// database with CLI commands through `Arc<TaskDb>`.
pub struct TaskDb {
    conn: Mutex<Connection>,
}

impl TaskDb {
    /// Open the task database at `~/.config/kanbancal/kanbancal.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, Box<dyn std::error::Error>> {
        let path = data_dir()?.join("kanbancal.db");
        let conn = Connection::open(&path)
            .map_err(|source| DatabaseError::OpenFailed { path, source })?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database (for tests and tooling).
    pub fn open_memory() -> Result<Self, Box<dyn std::error::Error>> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, DatabaseError> {
        self.conn.lock().map_err(|_| DatabaseError::Locked)
    }

    fn migrate(&self) -> Result<(), DatabaseError> {
        let conn = self.lock()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tasks (
                id                  TEXT PRIMARY KEY,
                title               TEXT NOT NULL,
                description         TEXT,
                status              TEXT NOT NULL DEFAULT 'open',
                priority            TEXT,
                assignee            TEXT,
                tags                TEXT NOT NULL DEFAULT '[]',
                deadline            TEXT,
                start_date          TEXT,
                end_date            TEXT,
                last_notified_hours INTEGER NOT NULL DEFAULT 100,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id      INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id TEXT NOT NULL,
                kind    TEXT NOT NULL DEFAULT 'deadline',
                message TEXT NOT NULL,
                sent_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
            CREATE INDEX IF NOT EXISTS idx_tasks_deadline ON tasks(deadline);
            CREATE INDEX IF NOT EXISTS idx_notifications_task ON notifications(task_id);",
        )
        .map_err(|e| DatabaseError::MigrationFailed(e.to_string()))?;
        Ok(())
    }

    /// Insert a new task. The watermark is forced to the sentinel.
    pub fn insert_task(&self, task: &Task) -> Result<(), DatabaseError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO tasks
                (id, title, description, status, priority, assignee, tags,
                 deadline, start_date, end_date, last_notified_hours, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
            params![
                task.id,
                task.title,
                task.description,
                format_status(task.status),
                format_priority(task.priority),
                task.assignee,
                serde_json::to_string(&task.tags).unwrap_or_else(|_| "[]".to_string()),
                task.deadline.map(|d| d.to_rfc3339()),
                task.start_date.map(|d| d.to_rfc3339()),
                task.end_date.map(|d| d.to_rfc3339()),
                Watermark::sentinel().hours(),
                task.created_at.to_rfc3339(),
                task.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Fetch one task by id.
    pub fn get_task(&self, id: &str) -> Result<Option<Task>, DatabaseError> {
        let conn = self.lock()?;
        let task = conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                row_to_task,
            )
            .optional()?;
        Ok(task)
    }

    /// List all tasks, newest first.
    pub fn list_tasks(&self) -> Result<Vec<Task>, DatabaseError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks ORDER BY created_at DESC"
        ))?;
        let tasks = stmt
            .query_map([], row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    /// Update a task's user-editable fields.
    ///
    /// The watermark is owned by this layer: it is reset to the sentinel
    /// when the deadline changed or the task was reopened from done, and
    /// preserved otherwise, regardless of what the caller passed in. The
    /// reset decision happens inside the UPDATE against the stored row, so
    /// a watermark advance racing the update is never overwritten by a
    /// stale read. Returns the stored task.
    pub fn update_task(&self, task: &Task) -> Result<Task, DatabaseError> {
        let updated_at = Utc::now();

        let conn = self.lock()?;
        let updated = conn.execute(
            "UPDATE tasks SET
                title = ?1, description = ?2, status = ?3, priority = ?4,
                assignee = ?5, tags = ?6,
                last_notified_hours = CASE
                    WHEN IFNULL(deadline, '') != IFNULL(?7, '')
                      OR (status = 'done' AND ?3 != 'done')
                    THEN ?10 ELSE last_notified_hours END,
                deadline = ?7, start_date = ?8, end_date = ?9, updated_at = ?11
             WHERE id = ?12",
            params![
                task.title,
                task.description,
                format_status(task.status),
                format_priority(task.priority),
                task.assignee,
                serde_json::to_string(&task.tags).unwrap_or_else(|_| "[]".to_string()),
                task.deadline.map(|d| d.to_rfc3339()),
                task.start_date.map(|d| d.to_rfc3339()),
                task.end_date.map(|d| d.to_rfc3339()),
                Watermark::sentinel().hours(),
                updated_at.to_rfc3339(),
                task.id,
            ],
        )?;
        drop(conn);

        if updated == 0 {
            return Err(DatabaseError::TaskNotFound(task.id.clone()));
        }
        self.get_task(&task.id)?
            .ok_or_else(|| DatabaseError::TaskNotFound(task.id.clone()))
    }

    /// Change only a task's status, applying the reopen watermark reset.
    pub fn set_status(&self, id: &str, status: TaskStatus) -> Result<Task, DatabaseError> {
        let current = self
            .get_task(id)?
            .ok_or_else(|| DatabaseError::TaskNotFound(id.to_string()))?;
        let mut updated = current;
        updated.status = status;
        self.update_task(&updated)
    }

    /// Delete a task. Returns whether a row was removed.
    pub fn delete_task(&self, id: &str) -> Result<bool, DatabaseError> {
        let conn = self.lock()?;
        let deleted = conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
        Ok(deleted > 0)
    }

    /// Recent entries from the notification audit log.
    pub fn recent_notifications(&self, limit: usize) -> Result<Vec<NotificationRecord>, DatabaseError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, task_id, kind, message, sent_at FROM notifications
             ORDER BY id DESC LIMIT ?1",
        )?;
        let records = stmt
            .query_map(params![limit as i64], |row| {
                let sent_at_str: String = row.get(4)?;
                Ok(NotificationRecord {
                    id: row.get(0)?,
                    task_id: row.get(1)?,
                    kind: row.get(2)?,
                    message: row.get(3)?,
                    sent_at: parse_datetime_fallback(&sent_at_str),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}

impl TaskSource for TaskDb {
    fn fetch_notifiable(&self) -> Result<Vec<Task>, DatabaseError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE status != 'done'"
        ))?;
        let tasks = stmt
            .query_map([], row_to_task)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tasks)
    }

    fn advance_watermark(
        &self,
        task_id: &str,
        to: Threshold,
        expected: Watermark,
    ) -> Result<WatermarkUpdate, DatabaseError> {
        let conn = self.lock()?;
        // Conditional on the previously read value, and strictly tightening:
        // a reset or concurrent advance leaves zero rows touched.
        let updated = conn.execute(
            "UPDATE tasks SET last_notified_hours = ?1, updated_at = ?2
             WHERE id = ?3 AND last_notified_hours = ?4 AND last_notified_hours > ?1",
            params![
                to.hours(),
                Utc::now().to_rfc3339(),
                task_id,
                expected.hours(),
            ],
        )?;
        if updated == 1 {
            Ok(WatermarkUpdate::Applied)
        } else {
            Ok(WatermarkUpdate::Conflict)
        }
    }

    fn record_notification(&self, task_id: &str, message: &str) -> Result<(), DatabaseError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO notifications (task_id, kind, message, sent_at)
             VALUES (?1, 'deadline', ?2, ?3)",
            params![task_id, message, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}
