//! Deadline threshold evaluation.
//!
//! Pure decision function at the heart of the notifier: given a task's
//! deadline, status and watermark, pick the single threshold (if any) that
//! has just been crossed. No hidden state, no wall clock -- identical inputs
//! always produce identical output.

use chrono::{DateTime, Utc};

use super::threshold::{Threshold, ThresholdSet, Watermark};
use crate::task::TaskStatus;

/// Once a deadline is overdue by more than this many hours, no further
/// notifications are generated for it. Stops stale tasks from being
/// re-announced forever.
pub const OVERDUE_GRACE_HOURS: f64 = 1.0;

/// Signed fractional hours from `now` until `deadline`. Negative when the
/// deadline has passed.
pub fn hours_until(now: DateTime<Utc>, deadline: DateTime<Utc>) -> f64 {
    (deadline - now).num_seconds() as f64 / 3600.0
}

/// Decide whether a notification is due.
///
/// Returns the most urgent threshold `t` with `hours_left <= t` that the
/// watermark still permits, or `None` when nothing is due:
/// - done tasks and tasks without a deadline are exempt,
/// - tasks overdue beyond the grace window are silenced,
/// - a threshold at or looser than the watermark never fires again.
///
/// When the poll interval lets the remaining time jump past several
/// thresholds at once, only the tightest crossed one fires; the looser
/// ones are superseded, never queued.
pub fn evaluate(
    now: DateTime<Utc>,
    deadline: Option<DateTime<Utc>>,
    status: TaskStatus,
    watermark: Watermark,
    thresholds: &ThresholdSet,
) -> Option<Threshold> {
    if status == TaskStatus::Done {
        return None;
    }
    let deadline = deadline?;

    let hours_left = hours_until(now, deadline);
    if hours_left < -OVERDUE_GRACE_HOURS {
        return None;
    }

    // Tightest first: the first threshold that covers the remaining time
    // and is still permitted wins.
    thresholds
        .iter()
        .rev()
        .find(|&t| hours_left <= t.hours() as f64 && watermark.permits(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn hours(h: f64) -> Duration {
        Duration::seconds((h * 3600.0) as i64)
    }

    fn eval(
        hours_left: f64,
        status: TaskStatus,
        watermark: Watermark,
    ) -> Option<i64> {
        let now = Utc::now();
        evaluate(
            now,
            Some(now + hours(hours_left)),
            status,
            watermark,
            &ThresholdSet::default(),
        )
        .map(|t| t.hours())
    }

    #[test]
    fn done_tasks_are_exempt() {
        assert_eq!(eval(2.0, TaskStatus::Done, Watermark::sentinel()), None);
    }

    #[test]
    fn missing_deadline_is_exempt() {
        let now = Utc::now();
        assert_eq!(
            evaluate(
                now,
                None,
                TaskStatus::Open,
                Watermark::sentinel(),
                &ThresholdSet::default()
            ),
            None
        );
    }

    #[test]
    fn first_crossing_fires_loosest_covering_threshold() {
        // 25h remaining: only the 48h window covers it.
        assert_eq!(eval(25.0, TaskStatus::Open, Watermark::sentinel()), Some(48));
    }

    #[test]
    fn jump_past_several_thresholds_fires_only_the_tightest() {
        // From 50h (nothing due) straight to 2h remaining: 48, 24, 12, 6
        // and 3 are all crossed, only 3 fires.
        assert_eq!(eval(50.0, TaskStatus::Open, Watermark::sentinel()), None);
        assert_eq!(eval(2.0, TaskStatus::Open, Watermark::sentinel()), Some(3));
    }

    #[test]
    fn acknowledged_threshold_does_not_refire() {
        let now = Utc::now();
        let deadline = Some(now + hours(25.0));
        let set = ThresholdSet::default();

        let first = evaluate(now, deadline, TaskStatus::Open, Watermark::sentinel(), &set);
        assert_eq!(first.map(|t| t.hours()), Some(48));

        // Watermark advanced to 48: same instant yields nothing.
        let after = evaluate(
            now,
            deadline,
            TaskStatus::Open,
            Watermark::from_hours(48),
            &set,
        );
        assert_eq!(after, None);

        // Two hours later (23h remaining) the 24h window fires.
        let later = evaluate(
            now + hours(2.0),
            deadline,
            TaskStatus::Open,
            Watermark::from_hours(48),
            &set,
        );
        assert_eq!(later.map(|t| t.hours()), Some(24));
    }

    #[test]
    fn evaluation_is_repeatable() {
        let now = Utc::now();
        let deadline = Some(now + hours(11.5));
        let set = ThresholdSet::default();
        let a = evaluate(now, deadline, TaskStatus::InProgress, Watermark::sentinel(), &set);
        let b = evaluate(now, deadline, TaskStatus::InProgress, Watermark::sentinel(), &set);
        assert_eq!(a, b);
        assert_eq!(a.map(|t| t.hours()), Some(12));
    }

    #[test]
    fn overdue_within_grace_fires_zero_threshold() {
        assert_eq!(eval(-0.5, TaskStatus::Open, Watermark::sentinel()), Some(0));
    }

    #[test]
    fn overdue_beyond_grace_is_silenced() {
        assert_eq!(eval(-2.0, TaskStatus::Open, Watermark::sentinel()), None);
        assert_eq!(eval(-1.01, TaskStatus::Open, Watermark::sentinel()), None);
    }

    #[test]
    fn overdue_zero_threshold_fires_once() {
        assert_eq!(eval(-0.5, TaskStatus::Open, Watermark::from_hours(3)), Some(0));
        assert_eq!(eval(-0.5, TaskStatus::Open, Watermark::from_hours(0)), None);
    }

    proptest! {
        /// Any returned threshold is eligible (covers the remaining time and
        /// is permitted) and is the tightest such threshold.
        #[test]
        fn returned_threshold_is_minimal_eligible(
            hours_left in -5.0f64..60.0,
            watermark_hours in 0i64..=100,
        ) {
            let now = Utc::now();
            let deadline = now + hours(hours_left);
            let watermark = Watermark::from_hours(watermark_hours);
            let set = ThresholdSet::default();

            // Recompute remaining hours the way the evaluator sees them.
            let hl = hours_until(now, deadline);

            if let Some(t) = evaluate(now, Some(deadline), TaskStatus::Open, watermark, &set) {
                prop_assert!(hl <= t.hours() as f64);
                prop_assert!(watermark.permits(t));
                prop_assert!(hl >= -OVERDUE_GRACE_HOURS);
                // No tighter threshold was also eligible.
                for other in set.iter().rev() {
                    if other.hours() < t.hours() {
                        prop_assert!(
                            hl > other.hours() as f64 || !watermark.permits(other)
                        );
                    }
                }
            }
        }
    }
}
