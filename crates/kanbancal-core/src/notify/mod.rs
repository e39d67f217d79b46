//! Deadline notification engine.
//!
//! Decides, once per threshold per task, that a deadline notification is
//! due, and drives delivery with an idempotency watermark:
//!
//! - [`threshold`]: threshold set and watermark types
//! - [`evaluator`]: the pure crossed-threshold decision
//! - [`scheduler`]: the periodic evaluate -> deliver -> advance loop
//! - [`sink`] / [`alert`]: the delivery boundary and its payload
//! - [`clock`]: injectable time source

pub mod alert;
pub mod clock;
pub mod evaluator;
pub mod scheduler;
pub mod sink;
pub mod threshold;

pub use alert::DeadlineAlert;
pub use clock::{Clock, FixedClock, SystemClock};
pub use evaluator::{evaluate, hours_until, OVERDUE_GRACE_HOURS};
pub use scheduler::{
    CycleReport, DeadlineScheduler, SchedulerSettings, TaskSource, WatermarkUpdate,
};
pub use sink::NotificationSink;
pub use threshold::{Threshold, ThresholdSet, Watermark, SENTINEL_HOURS};
