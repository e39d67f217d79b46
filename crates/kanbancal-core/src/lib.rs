//! # Kanbancal Core Library
//!
//! Core business logic for Kanbancal, a kanban board with deadline
//! notifications. All operations are available through the standalone CLI
//! binary; any future HTTP surface would be a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Notify**: the deadline-threshold engine -- a pure evaluator decides
//!   which threshold a task has just crossed, a watermark per task prevents
//!   duplicate sends, and a periodic scheduler sequences
//!   evaluate -> deliver -> advance
//! - **Storage**: SQLite task storage (which owns the watermark column) and
//!   TOML-based configuration
//! - **Integrations**: Telegram Bot API delivery
//! - **Calendar**: calendar projection of tasks
//!
//! ## Key Components
//!
//! - [`DeadlineScheduler`]: the evaluation loop
//! - [`TaskDb`]: task and watermark persistence
//! - [`TelegramSink`]: notification delivery
//! - [`Config`]: application configuration management

pub mod calendar;
pub mod error;
pub mod integrations;
pub mod notify;
pub mod storage;
pub mod task;

pub use calendar::CalendarEvent;
pub use error::{ConfigError, CoreError, DatabaseError, DeliveryError, ValidationError};
pub use integrations::TelegramSink;
pub use notify::{
    CycleReport, DeadlineAlert, DeadlineScheduler, NotificationSink, SchedulerSettings,
    TaskSource, Threshold, ThresholdSet, Watermark,
};
pub use storage::{Config, TaskDb};
pub use task::{Priority, Task, TaskStatus};
