//! Task management commands for CLI.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use clap::Subcommand;
use kanbancal_core::storage::TaskDb;
use kanbancal_core::task::{Priority, Task, TaskStatus};

#[derive(Subcommand)]
pub enum TaskAction {
    /// Create a new task
    Add {
        /// Task title
        title: String,
        /// Task description
        #[arg(long)]
        description: Option<String>,
        /// Deadline (RFC 3339, "YYYY-MM-DD HH:MM" or "YYYY-MM-DD", UTC)
        #[arg(long)]
        deadline: Option<String>,
        /// Assignee name
        #[arg(long)]
        assignee: Option<String>,
        /// Priority: low, medium or high
        #[arg(long)]
        priority: Option<String>,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
    },
    /// List tasks
    List {
        /// Filter by status (open, in_progress, done)
        #[arg(long)]
        status: Option<String>,
        /// Filter by assignee
        #[arg(long)]
        assignee: Option<String>,
    },
    /// Get task details
    Show {
        /// Task ID
        id: String,
    },
    /// Update a task
    Update {
        /// Task ID
        id: String,
        /// New title
        #[arg(long)]
        title: Option<String>,
        /// New description
        #[arg(long)]
        description: Option<String>,
        /// New deadline (moving it restarts the notification countdown)
        #[arg(long)]
        deadline: Option<String>,
        /// Remove the deadline
        #[arg(long)]
        clear_deadline: bool,
        /// New status (open, in_progress, done)
        #[arg(long)]
        status: Option<String>,
        /// New assignee
        #[arg(long)]
        assignee: Option<String>,
        /// New priority
        #[arg(long)]
        priority: Option<String>,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
    },
    /// Mark a task done (stops its notifications)
    Done {
        /// Task ID
        id: String,
    },
    /// Reopen a done task (restarts its notification countdown)
    Reopen {
        /// Task ID
        id: String,
    },
    /// Delete a task
    Delete {
        /// Task ID
        id: String,
    },
}

fn parse_deadline(s: &str) -> Result<DateTime<Utc>, Box<dyn std::error::Error>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(format!("cannot parse '{s}' as a deadline (expected RFC 3339, 'YYYY-MM-DD HH:MM' or 'YYYY-MM-DD')").into())
}

fn parse_status(s: &str) -> Result<TaskStatus, Box<dyn std::error::Error>> {
    match s {
        "open" => Ok(TaskStatus::Open),
        "in_progress" => Ok(TaskStatus::InProgress),
        "done" => Ok(TaskStatus::Done),
        other => Err(format!("unknown status: {other} (expected open, in_progress or done)").into()),
    }
}

fn parse_priority(s: &str) -> Result<Priority, Box<dyn std::error::Error>> {
    match s {
        "low" => Ok(Priority::Low),
        "medium" => Ok(Priority::Medium),
        "high" => Ok(Priority::High),
        other => Err(format!("unknown priority: {other} (expected low, medium or high)").into()),
    }
}

fn parse_tags(s: &str) -> Vec<String> {
    s.split(',')
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

pub fn run(action: TaskAction) -> Result<(), Box<dyn std::error::Error>> {
    let db = TaskDb::open()?;

    match action {
        TaskAction::Add {
            title,
            description,
            deadline,
            assignee,
            priority,
            tags,
        } => {
            let mut task = Task::new(title);
            task.description = description;
            task.deadline = deadline.as_deref().map(parse_deadline).transpose()?;
            task.assignee = assignee;
            task.priority = priority.as_deref().map(parse_priority).transpose()?;
            task.tags = tags.as_deref().map(parse_tags).unwrap_or_default();

            db.insert_task(&task)?;
            println!("Task created: {}", task.id);
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        TaskAction::List { status, assignee } => {
            let status = status.as_deref().map(parse_status).transpose()?;
            let all_tasks = db.list_tasks()?;
            let filtered: Vec<_> = all_tasks
                .into_iter()
                .filter(|task| {
                    if let Some(s) = status {
                        if task.status != s {
                            return false;
                        }
                    }
                    if let Some(ref a) = assignee {
                        if task.assignee.as_ref() != Some(a) {
                            return false;
                        }
                    }
                    true
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&filtered)?);
        }
        TaskAction::Show { id } => match db.get_task(&id)? {
            Some(task) => println!("{}", serde_json::to_string_pretty(&task)?),
            None => println!("Task not found: {id}"),
        },
        TaskAction::Update {
            id,
            title,
            description,
            deadline,
            clear_deadline,
            status,
            assignee,
            priority,
            tags,
        } => {
            let mut task = db
                .get_task(&id)?
                .ok_or(format!("Task not found: {id}"))?;

            if let Some(t) = title {
                task.title = t;
            }
            if let Some(d) = description {
                task.description = Some(d);
            }
            if clear_deadline {
                task.deadline = None;
            } else if let Some(d) = deadline {
                task.deadline = Some(parse_deadline(&d)?);
            }
            if let Some(s) = status {
                task.status = parse_status(&s)?;
            }
            if let Some(a) = assignee {
                task.assignee = Some(a);
            }
            if let Some(p) = priority {
                task.priority = Some(parse_priority(&p)?);
            }
            if let Some(t) = tags {
                task.tags = parse_tags(&t);
            }

            let stored = db.update_task(&task)?;
            println!("Task updated:");
            println!("{}", serde_json::to_string_pretty(&stored)?);
        }
        TaskAction::Done { id } => {
            let task = db.set_status(&id, TaskStatus::Done)?;
            println!("Task done: {} ({})", task.id, task.title);
        }
        TaskAction::Reopen { id } => {
            let task = db.set_status(&id, TaskStatus::Open)?;
            println!("Task reopened: {} ({})", task.id, task.title);
        }
        TaskAction::Delete { id } => {
            if db.delete_task(&id)? {
                println!("Task deleted: {id}");
            } else {
                println!("Task not found: {id}");
            }
        }
    }
    Ok(())
}
