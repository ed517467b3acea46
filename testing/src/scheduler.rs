//! Virtual-time scheduler for deterministic replay tests.

use crate::mocks::test_epoch;
use chrono::{DateTime, Duration, Utc};
use composable_http_core::environment::{Clock, ScheduledTask, Scheduler};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Scheduler whose clock only moves when the test says so.
///
/// Tasks run synchronously inside [`advance_to`](Self::advance_to),
/// [`advance_by`](Self::advance_by) or [`run`](Self::run), ordered by their
/// due time and then by scheduling order. The clock reads each task's due
/// time while it runs and never goes backwards. Tasks may schedule further
/// tasks; those run in the same call if they fall due within it.
///
/// Cloning is cheap; clones share the clock and the queue.
///
/// # Example
///
/// ```
/// use composable_http_core::environment::{Clock, Scheduler};
/// use composable_http_testing::VirtualScheduler;
/// use std::sync::{Arc, Mutex};
///
/// let scheduler = VirtualScheduler::default();
/// let fired = Arc::new(Mutex::new(Vec::new()));
///
/// for (delay, label) in [(20, "b"), (10, "a")] {
///     let fired = Arc::clone(&fired);
///     scheduler.schedule_at(
///         scheduler.now() + chrono::Duration::milliseconds(delay),
///         Box::new(move || fired.lock().unwrap().push(label)),
///     );
/// }
///
/// scheduler.advance_by(chrono::Duration::milliseconds(15));
/// assert_eq!(*fired.lock().unwrap(), vec!["a"]);
///
/// scheduler.run();
/// assert_eq!(*fired.lock().unwrap(), vec!["a", "b"]);
/// ```
#[derive(Clone)]
pub struct VirtualScheduler {
    state: Arc<Mutex<State>>,
}

struct State {
    now: DateTime<Utc>,
    next_seq: u64,
    queue: BTreeMap<(DateTime<Utc>, u64), ScheduledTask>,
}

impl VirtualScheduler {
    /// Create a scheduler whose clock starts at `start`
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                now: start,
                next_seq: 0,
                queue: BTreeMap::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of tasks waiting to run
    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Run every task due at or before `at`, then move the clock to `at`.
    ///
    /// Returns the number of tasks run. The clock never moves backwards, so
    /// an `at` in the past only runs overdue tasks.
    pub fn advance_to(&self, at: DateTime<Utc>) -> usize {
        let mut ran = 0;
        while let Some(task) = self.pop_due(Some(at)) {
            task();
            ran += 1;
        }
        let mut state = self.lock();
        state.now = state.now.max(at);
        ran
    }

    /// Advance the clock by `delta`, running every task that falls due
    pub fn advance_by(&self, delta: Duration) -> usize {
        let now = self.now();
        self.advance_to(now.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    /// Run every queued task, advancing the clock to the last due time
    pub fn run(&self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.pop_due(None) {
            task();
            ran += 1;
        }
        ran
    }

    /// Take the earliest task due at or before `limit`, moving the clock to
    /// its due time. The lock is released before the task runs.
    fn pop_due(&self, limit: Option<DateTime<Utc>>) -> Option<ScheduledTask> {
        let mut state = self.lock();
        let (&(due, seq), _) = state.queue.first_key_value()?;
        if limit.is_some_and(|limit| due > limit) {
            return None;
        }
        state.now = state.now.max(due);
        state.queue.remove(&(due, seq))
    }
}

impl Default for VirtualScheduler {
    fn default() -> Self {
        Self::new(test_epoch())
    }
}

impl Clock for VirtualScheduler {
    fn now(&self) -> DateTime<Utc> {
        self.lock().now
    }
}

impl Scheduler for VirtualScheduler {
    fn schedule_at(&self, at: DateTime<Utc>, task: ScheduledTask) {
        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.queue.insert((at, seq), task);
    }
}

impl std::fmt::Debug for VirtualScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("VirtualScheduler")
            .field("now", &state.now)
            .field("pending", &state.queue.len())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> ScheduledTask) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        (log, move |label| -> ScheduledTask {
            let sink = Arc::clone(&sink);
            Box::new(move || sink.lock().unwrap().push(label))
        })
    }

    #[test]
    fn equal_times_run_in_scheduling_order() {
        let scheduler = VirtualScheduler::default();
        let (log, task) = recorder();
        let at = scheduler.now() + Duration::seconds(1);

        scheduler.schedule_at(at, task("first"));
        scheduler.schedule_at(at, task("second"));
        scheduler.schedule_at(at - Duration::milliseconds(1), task("earlier"));

        assert_eq!(scheduler.pending(), 3);
        assert_eq!(scheduler.advance_to(at), 3);
        assert_eq!(*log.lock().unwrap(), vec!["earlier", "first", "second"]);
        assert_eq!(scheduler.now(), at);
    }

    #[test]
    fn clock_never_goes_backwards() {
        let scheduler = VirtualScheduler::default();
        let start = scheduler.now();
        scheduler.advance_by(Duration::seconds(5));
        scheduler.advance_to(start);
        assert_eq!(scheduler.now(), start + Duration::seconds(5));
    }

    #[test]
    fn clock_reads_due_time_while_task_runs() {
        let scheduler = VirtualScheduler::default();
        let seen = Arc::new(Mutex::new(None));
        let at = scheduler.now() + Duration::milliseconds(250);

        let clock = scheduler.clone();
        let slot = Arc::clone(&seen);
        scheduler.schedule_at(at, Box::new(move || *slot.lock().unwrap() = Some(clock.now())));

        scheduler.advance_by(Duration::seconds(1));
        assert_eq!(*seen.lock().unwrap(), Some(at));
    }

    #[test]
    fn tasks_can_schedule_more_tasks() {
        let scheduler = VirtualScheduler::default();
        let (log, task) = recorder();
        let inner = task("inner");

        let nested = scheduler.clone();
        let at = scheduler.now() + Duration::seconds(1);
        scheduler.schedule_at(
            at,
            Box::new(move || nested.schedule_at(at + Duration::seconds(1), inner)),
        );

        assert_eq!(scheduler.run(), 2);
        assert_eq!(*log.lock().unwrap(), vec!["inner"]);
    }
}
