//! History Log.
//!
//! Every driver instance owns one append-only [`HistoryLog`] of completed
//! exchanges and one [`ReplayGate`]. Together with [`replay`] they let a test
//! harness capture a session and play it back against a virtual clock without
//! touching the network.
//!
//! # Replay
//!
//! ```text
//! HistoryEntry { time: t, .. } ──schedule_at(t)──▶ Scheduler
//!                                                      │ at t
//!                                                      ▼
//!                         ResponseStream::settled(..) ──▶ driver output
//! ```
//!
//! The log never evicts entries. It is a diagnostic and testing facility,
//! not a response cache.

use crate::response_stream::ResponseStream;
use composable_http_core::environment::Scheduler;
use composable_http_core::HistoryEntry;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Append-only ledger of completed exchanges.
///
/// Cloning is cheap; clones share the same ledger. Entries are kept in the
/// order they were recorded.
///
/// # Example
///
/// ```
/// use composable_http_core::{HistoryEntry, RequestInput, RequestOptions, Response, Utc};
/// use composable_http_runtime::history::HistoryLog;
///
/// let log = HistoryLog::new();
/// log.record(HistoryEntry::new(
///     Utc::now(),
///     RequestInput::from("http://localhost/hello"),
///     RequestOptions::new("http://localhost/hello"),
///     Ok(Response::new(200, "OK", "Hello World")),
/// ));
///
/// assert_eq!(log.len(), 1);
/// assert_eq!(log.entries()[0].options.url, "http://localhost/hello");
/// ```
#[derive(Clone, Debug, Default)]
pub struct HistoryLog {
    entries: Arc<Mutex<Vec<HistoryEntry>>>,
}

impl HistoryLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<HistoryEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an entry
    pub fn record(&self, entry: HistoryEntry) {
        let mut entries = self.lock();
        tracing::trace!(
            url = %entry.options.url,
            ok = entry.response.is_ok(),
            "Recording history entry"
        );
        entries.push(entry);
        metrics::counter!("http_driver.history.recorded").increment(1);
    }

    /// Snapshot of every entry, oldest first
    #[must_use]
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.lock().clone()
    }

    /// Number of recorded entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether nothing has been recorded yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Driver-wide switch that drops live requests while history is replayed.
///
/// Suppression is global: while it is on, every incoming live request is
/// discarded before it reaches the transport, not just the ones being
/// replayed.
#[derive(Clone, Debug, Default)]
pub struct ReplayGate {
    suppressed: Arc<AtomicBool>,
}

impl ReplayGate {
    /// Create an open gate
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start dropping live requests
    pub fn about_to_replay(&self) {
        tracing::info!("Suppressing live requests for history replay");
        self.suppressed.store(true, Ordering::Release);
    }

    /// Let live requests through again
    pub fn replay_finished(&self) {
        tracing::info!("History replay finished, live requests resumed");
        self.suppressed.store(false, Ordering::Release);
    }

    /// Whether live requests are currently dropped
    #[must_use]
    pub fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::Acquire)
    }
}

/// Schedule every entry's outcome for re-emission at its recorded time.
///
/// For each entry, a settled [`ResponseStream`] tagged with the entry's
/// options is handed to `sink` when `scheduler` reaches `entry.time`. Entries
/// fire in time order; entries with equal times fire in the order given.
/// Nothing is issued on the network and nothing is re-recorded.
pub fn replay<S, F>(scheduler: &S, entries: Vec<HistoryEntry>, sink: F)
where
    S: Scheduler + ?Sized,
    F: Fn(ResponseStream) + Clone + Send + Sync + 'static,
{
    tracing::info!(entries = entries.len(), "Scheduling history replay");

    for entry in entries {
        let sink = sink.clone();
        let at = entry.time;
        scheduler.schedule_at(
            at,
            Box::new(move || {
                tracing::debug!(url = %entry.options.url, time = %entry.time, "Replaying history entry");
                metrics::counter!("http_driver.history.replayed").increment(1);
                sink(ResponseStream::settled(Arc::new(entry.options), entry.response));
            }),
        );
    }
}
