//! Periodic deadline evaluation loop.
//!
//! Wakes on a fixed interval, pulls every non-done task from the task
//! source, and for each task runs evaluate -> deliver -> advance in that
//! order. The watermark is only advanced after the sink confirms delivery,
//! so a failed send is naturally retried on the next cycle -- there is no
//! separate retry machinery.
//!
//! Cycles never overlap: a tick that arrives while the previous cycle is
//! still running is skipped (single atomic guard). One task's failure never
//! aborts the cycle; a failure to fetch the task list aborts the whole
//! cycle and the next tick retries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::alert::DeadlineAlert;
use super::clock::{Clock, SystemClock};
use super::evaluator::{evaluate, hours_until};
use super::sink::NotificationSink;
use super::threshold::{Threshold, ThresholdSet, Watermark};
use crate::error::DatabaseError;
use crate::task::Task;

/// Outcome of a conditional watermark advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkUpdate {
    /// The watermark was advanced.
    Applied,
    /// The stored value no longer matched the expected one -- someone else
    /// advanced or reset the task between read and write. Not an error; the
    /// next cycle re-evaluates from the fresh value.
    Conflict,
}

/// Read/write boundary between the notifier and task storage.
///
/// `advance_watermark` must be conditional on the previously read value
/// (optimistic concurrency) so a reset that raced the cycle is never
/// silently overwritten.
pub trait TaskSource: Send + Sync {
    /// All non-done tasks, with or without deadlines (the notifier filters).
    fn fetch_notifiable(&self) -> Result<Vec<Task>, DatabaseError>;

    /// Tighten the watermark of `task_id` to `to`, only if it still equals
    /// `expected`.
    fn advance_watermark(
        &self,
        task_id: &str,
        to: Threshold,
        expected: Watermark,
    ) -> Result<WatermarkUpdate, DatabaseError>;

    /// Best-effort audit record of a delivered notification.
    fn record_notification(&self, task_id: &str, message: &str) -> Result<(), DatabaseError>;
}

/// Tunables for the deadline scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    /// Poll interval in minutes. A tunable, not a correctness property.
    pub interval_minutes: u64,
    /// Notification thresholds, descending.
    pub thresholds: ThresholdSet,
    /// Base URL for deep links in alerts.
    pub frontend_url: String,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 5,
            thresholds: ThresholdSet::default(),
            frontend_url: "http://localhost:3000".to_string(),
        }
    }
}

/// Counters for one evaluation cycle.
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CycleReport {
    /// Tasks pulled from the source.
    pub evaluated: usize,
    /// Notifications delivered and acknowledged.
    pub notified: usize,
    /// Sink failures (retried next cycle).
    pub delivery_failures: usize,
    /// Watermark writes that failed with a storage error.
    pub storage_failures: usize,
    /// Optimistic-concurrency conflicts (skipped, not failures).
    pub conflicts: usize,
}

/// Drives periodic deadline evaluation across all tasks.
///
/// Dependencies are injected: task source, notification sink and clock all
/// come in through the constructor, so cycles can be replayed in tests with
/// a fixed clock and in-memory collaborators.
pub struct DeadlineScheduler {
    source: Arc<dyn TaskSource>,
    sink: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    settings: SchedulerSettings,
    cycle_running: AtomicBool,
}

impl DeadlineScheduler {
    pub fn new(
        source: Arc<dyn TaskSource>,
        sink: Arc<dyn NotificationSink>,
        settings: SchedulerSettings,
    ) -> Self {
        Self::with_clock(source, sink, Arc::new(SystemClock), settings)
    }

    /// Construct with an explicit clock (used by tests).
    pub fn with_clock(
        source: Arc<dyn TaskSource>,
        sink: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            source,
            sink,
            clock,
            settings,
            cycle_running: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> &SchedulerSettings {
        &self.settings
    }

    fn interval(&self) -> Duration {
        Duration::from_secs(self.settings.interval_minutes.max(1) * 60)
    }

    /// Run one evaluation pass over all tasks.
    ///
    /// # Errors
    /// Returns an error only when the task list itself cannot be fetched;
    /// per-task delivery and storage failures are counted in the report.
    pub fn run_cycle(&self) -> Result<CycleReport, DatabaseError> {
        let now = self.clock.now();
        let tasks = self.source.fetch_notifiable()?;

        let mut report = CycleReport::default();
        for task in tasks {
            report.evaluated += 1;
            self.process_task(&task, now, &mut report);
        }
        Ok(report)
    }

    fn process_task(&self, task: &Task, now: chrono::DateTime<chrono::Utc>, report: &mut CycleReport) {
        let Some(threshold) = evaluate(
            now,
            task.deadline,
            task.status,
            task.last_notified,
            &self.settings.thresholds,
        ) else {
            return;
        };
        // evaluate() returned Some, so the deadline is present.
        let Some(deadline) = task.deadline else {
            return;
        };

        let hours_left = hours_until(now, deadline);
        let alert = DeadlineAlert::new(task, deadline, threshold, hours_left, &self.settings.frontend_url);

        if let Err(err) = self.sink.deliver(&alert) {
            warn!(
                task_id = %task.id,
                threshold = %threshold,
                sink = self.sink.name(),
                "delivery failed, will retry next cycle: {err}"
            );
            report.delivery_failures += 1;
            return;
        }

        match self
            .source
            .advance_watermark(&task.id, threshold, task.last_notified)
        {
            Ok(WatermarkUpdate::Applied) => {
                info!(
                    task_id = %task.id,
                    title = %task.title,
                    threshold = %threshold,
                    hours_left = format!("{hours_left:.1}"),
                    "deadline notification sent"
                );
                report.notified += 1;

                let message = format!(
                    "threshold {threshold} crossed for '{}' ({hours_left:.1}h left)",
                    task.title
                );
                if let Err(err) = self.source.record_notification(&task.id, &message) {
                    warn!(task_id = %task.id, "failed to record notification: {err}");
                }
            }
            Ok(WatermarkUpdate::Conflict) => {
                // Task was reset or advanced underneath us; the fresh value
                // is re-evaluated next cycle.
                debug!(task_id = %task.id, threshold = %threshold, "watermark changed, skipping advance");
                report.conflicts += 1;
            }
            Err(err) => {
                warn!(task_id = %task.id, "watermark advance failed: {err}");
                report.storage_failures += 1;
            }
        }
    }

    /// Run the loop until the host process stops it.
    ///
    /// The first check fires immediately on start; after that the loop
    /// wakes every `interval_minutes`. Missed ticks are skipped, and a tick
    /// that arrives while a cycle is still in flight is dropped rather than
    /// overlapped.
    pub async fn run(self: Arc<Self>) {
        info!(
            interval_minutes = self.settings.interval_minutes,
            thresholds = ?self.settings.thresholds.hours(),
            sink = self.sink.name(),
            "deadline scheduler started"
        );

        let mut ticker = tokio::time::interval(self.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            if self.cycle_running.swap(true, Ordering::SeqCst) {
                debug!("previous cycle still running, skipping tick");
                continue;
            }

            let this = Arc::clone(&self);
            tokio::task::spawn_blocking(move || {
                match this.run_cycle() {
                    Ok(report) if report.notified > 0
                        || report.delivery_failures > 0
                        || report.storage_failures > 0 =>
                    {
                        info!(
                            evaluated = report.evaluated,
                            notified = report.notified,
                            delivery_failures = report.delivery_failures,
                            storage_failures = report.storage_failures,
                            conflicts = report.conflicts,
                            "cycle finished"
                        );
                    }
                    Ok(report) => {
                        debug!(evaluated = report.evaluated, "cycle finished, nothing due");
                    }
                    Err(err) => {
                        warn!("cycle aborted, retrying on next tick: {err}");
                    }
                }
                this.cycle_running.store(false, Ordering::SeqCst);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeliveryError;
    use crate::notify::clock::FixedClock;
    use crate::task::TaskStatus;
    use chrono::{Duration as ChronoDuration, Utc};
    use std::sync::Mutex;

    /// In-memory task source mirroring the SQLite advance semantics.
    #[derive(Default)]
    struct MemorySource {
        tasks: Mutex<Vec<Task>>,
        recorded: Mutex<Vec<(String, String)>>,
        fail_fetch: AtomicBool,
    }

    impl MemorySource {
        fn with_tasks(tasks: Vec<Task>) -> Self {
            Self {
                tasks: Mutex::new(tasks),
                ..Default::default()
            }
        }

        fn watermark_of(&self, task_id: &str) -> Watermark {
            self.tasks
                .lock()
                .unwrap()
                .iter()
                .find(|t| t.id == task_id)
                .map(|t| t.last_notified)
                .unwrap()
        }

        fn reset_watermark(&self, task_id: &str) {
            let mut tasks = self.tasks.lock().unwrap();
            let task = tasks.iter_mut().find(|t| t.id == task_id).unwrap();
            task.last_notified = Watermark::sentinel();
        }
    }

    impl TaskSource for MemorySource {
        fn fetch_notifiable(&self) -> Result<Vec<Task>, DatabaseError> {
            if self.fail_fetch.load(Ordering::SeqCst) {
                return Err(DatabaseError::QueryFailed("simulated outage".to_string()));
            }
            Ok(self
                .tasks
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.status != TaskStatus::Done)
                .cloned()
                .collect())
        }

        fn advance_watermark(
            &self,
            task_id: &str,
            to: Threshold,
            expected: Watermark,
        ) -> Result<WatermarkUpdate, DatabaseError> {
            let mut tasks = self.tasks.lock().unwrap();
            let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) else {
                return Ok(WatermarkUpdate::Conflict);
            };
            if task.last_notified != expected {
                return Ok(WatermarkUpdate::Conflict);
            }
            task.last_notified = to.into();
            Ok(WatermarkUpdate::Applied)
        }

        fn record_notification(&self, task_id: &str, message: &str) -> Result<(), DatabaseError> {
            self.recorded
                .lock()
                .unwrap()
                .push((task_id.to_string(), message.to_string()));
            Ok(())
        }
    }

    /// Sink that records alerts; can be told to fail, globally or per title.
    #[derive(Default)]
    struct RecordingSink {
        delivered: Mutex<Vec<DeadlineAlert>>,
        fail_all: AtomicBool,
        fail_title: Mutex<Option<String>>,
    }

    impl NotificationSink for RecordingSink {
        fn name(&self) -> &str {
            "recording"
        }

        fn deliver(&self, alert: &DeadlineAlert) -> Result<(), DeliveryError> {
            let fail_title = self.fail_title.lock().unwrap();
            if self.fail_all.load(Ordering::SeqCst)
                || fail_title.as_deref() == Some(alert.title.as_str())
            {
                return Err(DeliveryError::Rejected {
                    status: 502,
                    body: "simulated failure".to_string(),
                });
            }
            drop(fail_title);
            self.delivered.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    fn task_due_in(hours: i64, now: chrono::DateTime<Utc>) -> Task {
        let mut task = Task::new(format!("due in {hours}h"));
        task.deadline = Some(now + ChronoDuration::hours(hours));
        task
    }

    fn scheduler(
        source: Arc<MemorySource>,
        sink: Arc<RecordingSink>,
        clock: Arc<FixedClock>,
    ) -> DeadlineScheduler {
        DeadlineScheduler::with_clock(source, sink, clock, SchedulerSettings::default())
    }

    #[test]
    fn cycle_notifies_once_and_advances_watermark() {
        let now = Utc::now();
        let task = task_due_in(25, now);
        let task_id = task.id.clone();

        let source = Arc::new(MemorySource::with_tasks(vec![task]));
        let sink = Arc::new(RecordingSink::default());
        let clock = Arc::new(FixedClock::new(now));
        let sched = scheduler(Arc::clone(&source), Arc::clone(&sink), clock);

        let report = sched.run_cycle().unwrap();
        assert_eq!(report.notified, 1);
        assert_eq!(source.watermark_of(&task_id), Watermark::from_hours(48));

        let delivered = sink.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].threshold.hours(), 48);
        assert!(delivered[0].url.ends_with(&format!("/tasks/{task_id}")));
        drop(delivered);

        // Same instant, watermark advanced: nothing new fires.
        let report = sched.run_cycle().unwrap();
        assert_eq!(report.notified, 0);
        assert_eq!(sink.delivered.lock().unwrap().len(), 1);
        assert_eq!(source.recorded.lock().unwrap().len(), 1);
    }

    #[test]
    fn clock_advance_walks_thresholds_one_per_cycle() {
        let now = Utc::now();
        let task = task_due_in(25, now);
        let task_id = task.id.clone();

        let source = Arc::new(MemorySource::with_tasks(vec![task]));
        let sink = Arc::new(RecordingSink::default());
        let clock = Arc::new(FixedClock::new(now));
        let sched = scheduler(Arc::clone(&source), Arc::clone(&sink), Arc::clone(&clock));

        sched.run_cycle().unwrap();
        assert_eq!(source.watermark_of(&task_id), Watermark::from_hours(48));

        // Two hours later, 23h remain: the 24h window fires.
        clock.advance(ChronoDuration::hours(2));
        let report = sched.run_cycle().unwrap();
        assert_eq!(report.notified, 1);
        assert_eq!(source.watermark_of(&task_id), Watermark::from_hours(24));

        let delivered = sink.delivered.lock().unwrap();
        assert_eq!(delivered.last().unwrap().threshold.hours(), 24);
    }

    #[test]
    fn failed_delivery_keeps_watermark_and_retries_same_threshold() {
        let now = Utc::now();
        let mut task = task_due_in(23, now);
        task.last_notified = Watermark::from_hours(48);
        let task_id = task.id.clone();

        let source = Arc::new(MemorySource::with_tasks(vec![task]));
        let sink = Arc::new(RecordingSink::default());
        sink.fail_all.store(true, Ordering::SeqCst);
        let clock = Arc::new(FixedClock::new(now));
        let sched = scheduler(Arc::clone(&source), Arc::clone(&sink), clock);

        let report = sched.run_cycle().unwrap();
        assert_eq!(report.delivery_failures, 1);
        assert_eq!(report.notified, 0);
        assert_eq!(source.watermark_of(&task_id), Watermark::from_hours(48));

        // Sink recovers: the same 24h threshold is re-attempted.
        sink.fail_all.store(false, Ordering::SeqCst);
        let report = sched.run_cycle().unwrap();
        assert_eq!(report.notified, 1);
        assert_eq!(source.watermark_of(&task_id), Watermark::from_hours(24));
        assert_eq!(
            sink.delivered.lock().unwrap().last().unwrap().threshold.hours(),
            24
        );
    }

    #[test]
    fn concurrent_reset_surfaces_as_conflict_not_failure() {
        let now = Utc::now();
        let mut task = task_due_in(2, now);
        task.last_notified = Watermark::from_hours(48);
        let task_id = task.id.clone();

        struct ResettingSink {
            inner: RecordingSink,
            source: Arc<MemorySource>,
            task_id: String,
        }
        impl NotificationSink for ResettingSink {
            fn name(&self) -> &str {
                "resetting"
            }
            fn deliver(&self, alert: &DeadlineAlert) -> Result<(), DeliveryError> {
                // Simulate a reopen/reset racing the cycle between the read
                // and the watermark write.
                self.source.reset_watermark(&self.task_id);
                self.inner.deliver(alert)
            }
        }

        let source = Arc::new(MemorySource::with_tasks(vec![task]));
        let sink = Arc::new(ResettingSink {
            inner: RecordingSink::default(),
            source: Arc::clone(&source),
            task_id: task_id.clone(),
        });
        let clock = Arc::new(FixedClock::new(now));
        let sched = DeadlineScheduler::with_clock(
            Arc::clone(&source) as Arc<dyn TaskSource>,
            sink,
            clock,
            SchedulerSettings::default(),
        );

        let report = sched.run_cycle().unwrap();
        assert_eq!(report.conflicts, 1);
        assert_eq!(report.notified, 0);
        assert_eq!(report.storage_failures, 0);
        // The reset value was not overwritten.
        assert_eq!(source.watermark_of(&task_id), Watermark::sentinel());
    }

    #[test]
    fn fetch_outage_aborts_the_cycle() {
        let now = Utc::now();
        let source = Arc::new(MemorySource::with_tasks(vec![task_due_in(2, now)]));
        source.fail_fetch.store(true, Ordering::SeqCst);
        let sink = Arc::new(RecordingSink::default());
        let clock = Arc::new(FixedClock::new(now));
        let sched = scheduler(Arc::clone(&source), Arc::clone(&sink), clock);

        assert!(sched.run_cycle().is_err());
        assert!(sink.delivered.lock().unwrap().is_empty());
    }

    #[test]
    fn done_and_deadline_less_tasks_are_exempt() {
        let now = Utc::now();
        let mut done = task_due_in(2, now);
        done.status = TaskStatus::Done;
        let no_deadline = Task::new("no deadline");
        let due = task_due_in(2, now);
        let due_id = due.id.clone();

        let source = Arc::new(MemorySource::with_tasks(vec![done, no_deadline, due]));
        let sink = Arc::new(RecordingSink::default());
        let clock = Arc::new(FixedClock::new(now));
        let sched = scheduler(Arc::clone(&source), Arc::clone(&sink), clock);

        let report = sched.run_cycle().unwrap();
        assert_eq!(report.notified, 1);
        let delivered = sink.delivered.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].task_id, due_id);
    }

    #[test]
    fn one_failing_task_does_not_abort_the_cycle() {
        let now = Utc::now();
        let mut bad = task_due_in(2, now);
        bad.title = "bad".to_string();
        let good = task_due_in(2, now);
        let good_id = good.id.clone();

        let source = Arc::new(MemorySource::with_tasks(vec![bad, good]));
        let sink = Arc::new(RecordingSink::default());
        *sink.fail_title.lock().unwrap() = Some("bad".to_string());
        let clock = Arc::new(FixedClock::new(now));
        let sched = scheduler(Arc::clone(&source), Arc::clone(&sink), clock);

        let report = sched.run_cycle().unwrap();
        assert_eq!(report.delivery_failures, 1);
        assert_eq!(report.notified, 1);
        assert_eq!(source.watermark_of(&good_id), Watermark::from_hours(3));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn loop_skips_tick_while_cycle_is_running() {
        // Guard semantics only: a second tick while the flag is held must
        // not start another cycle.
        let now = Utc::now();
        let source = Arc::new(MemorySource::with_tasks(vec![task_due_in(25, now)]));
        let sink = Arc::new(RecordingSink::default());
        let clock = Arc::new(FixedClock::new(now));
        let sched = Arc::new(scheduler(Arc::clone(&source), Arc::clone(&sink), clock));

        sched.cycle_running.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(Arc::clone(&sched).run());
        tokio::time::sleep(Duration::from_millis(200)).await;
        handle.abort();

        // The guard was never released, so no cycle ran.
        assert!(sink.delivered.lock().unwrap().is_empty());
    }
}
