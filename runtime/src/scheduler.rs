//! Real-time [`Scheduler`] backed by Tokio timers.

use composable_http_core::environment::{Clock, ScheduledTask, Scheduler};
use composable_http_core::{DateTime, Utc};
use std::time::Duration;

/// Scheduler that runs each task on its own Tokio task once the wall clock
/// reaches the requested instant.
///
/// Instants in the past run immediately. Tasks due at the same instant are
/// not guaranteed to run in scheduling order; use a virtual scheduler when
/// ordering matters.
///
/// # Panics
///
/// [`schedule_at`](Scheduler::schedule_at) panics if called outside a Tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

impl Clock for TokioScheduler {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl Scheduler for TokioScheduler {
    fn schedule_at(&self, at: DateTime<Utc>, task: ScheduledTask) {
        let delay = (at - self.now()).to_std().unwrap_or(Duration::ZERO);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn past_instants_run_immediately() {
        let fired = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&fired);
        let scheduler = TokioScheduler;

        scheduler.schedule_at(
            scheduler.now() - chrono::Duration::seconds(1),
            Box::new(move || flag.store(true, Ordering::SeqCst)),
        );

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(fired.load(Ordering::SeqCst));
    }
}
