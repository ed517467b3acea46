//! The driver's output: a multicast stream of response streams.

use crate::history::{self, HistoryLog, ReplayGate};
use crate::isolation;
use crate::response_stream::ResponseStream;
use composable_http_core::environment::Scheduler;
use composable_http_core::{HistoryEntry, RequestInput};
use futures::channel::mpsc;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::sync::{Arc, Mutex, PoisonError};

/// Multicast point that live requests and replayed history both feed.
///
/// Every subscriber owns an unbounded queue, so a slow subscriber delays
/// nothing and misses nothing. Until the first subscriber attaches, published
/// streams are held in a backlog and handed to that subscriber in order.
/// Later subscribers start from the most recent stream.
pub(crate) struct Hub {
    state: Mutex<HubState>,
}

struct HubState {
    subscribers: Vec<mpsc::UnboundedSender<ResponseStream>>,
    backlog: Option<Vec<ResponseStream>>,
    latest: Option<ResponseStream>,
}

impl Hub {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(HubState {
                subscribers: Vec::new(),
                backlog: Some(Vec::new()),
                latest: None,
            }),
        }
    }

    pub(crate) fn publish(&self, stream: ResponseStream) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.latest = Some(stream.clone());
        if let Some(backlog) = state.backlog.as_mut() {
            backlog.push(stream);
            return;
        }
        // Dropped subscribers are pruned here.
        state
            .subscribers
            .retain(|subscriber| subscriber.unbounded_send(stream.clone()).is_ok());
    }

    fn subscribe(&self) -> (Vec<ResponseStream>, mpsc::UnboundedReceiver<ResponseStream>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let initial = match state.backlog.take() {
            Some(backlog) => {
                tracing::debug!(buffered = backlog.len(), "First subscriber attached");
                backlog
            }
            None => state.latest.iter().cloned().collect(),
        };
        let (sender, receiver) = mpsc::unbounded();
        state.subscribers.push(sender);
        (initial, receiver)
    }
}

pub(crate) struct SourceCore {
    pub(crate) hub: Hub,
    pub(crate) history: HistoryLog,
    pub(crate) gate: ReplayGate,
}

/// Stream of response streams returned by
/// [`HttpDriver::run`](crate::HttpDriver::run).
///
/// Cloning is cheap; every clone observes the same traffic. The first call to
/// [`subscribe`](Self::subscribe) receives every response stream emitted so
/// far; later calls start with the most recently emitted one. Either way the
/// subscriber then follows new ones in the order their requests were
/// submitted. Streams outside this source's scopes are skipped.
///
/// A source narrowed with [`isolate_source`](Self::isolate_source) only
/// yields response streams whose request crossed every scope it was narrowed
/// to.
///
/// # Example
///
/// ```ignore
/// let source = HttpDriver::new(DriverConfig::default(), transport)
///     .run(futures::stream::iter(["http://localhost/hello"]));
///
/// let mut responses = source.subscribe();
/// while let Some(response) = responses.next().await {
///     println!("{} -> {:?}", response.request().url, response.outcome().await);
/// }
/// ```
#[derive(Clone)]
pub struct HttpSource {
    core: Arc<SourceCore>,
    scopes: Vec<String>,
}

impl HttpSource {
    pub(crate) fn new(core: Arc<SourceCore>) -> Self {
        Self {
            core,
            scopes: Vec::new(),
        }
    }

    /// Scopes this source has been narrowed to, outermost first
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Subscribe to the response streams visible from this source.
    ///
    /// The returned stream never ends on its own: replayed history can arrive
    /// after the request stream is exhausted.
    #[must_use]
    pub fn subscribe(&self) -> BoxStream<'static, ResponseStream> {
        let (initial, mut receiver) = self.core.hub.subscribe();
        let scopes = self.scopes.clone();

        let streams = async_stream::stream! {
            for stream in initial {
                if isolation::is_visible(stream.request().namespace(), &scopes) {
                    yield stream;
                }
            }
            while let Some(stream) = receiver.next().await {
                if isolation::is_visible(stream.request().namespace(), &scopes) {
                    yield stream;
                }
            }
        };
        streams.boxed()
    }

    /// Narrow this source to requests tagged with `scope`.
    ///
    /// The narrowed source keeps every operation of the original, so
    /// isolation composes to any depth.
    #[must_use]
    pub fn isolate_source(&self, scope: impl Into<String>) -> Self {
        let mut scopes = self.scopes.clone();
        scopes.push(scope.into());
        Self {
            core: Arc::clone(&self.core),
            scopes,
        }
    }

    /// Tag every request of `requests` with `scope`.
    ///
    /// See [`isolation::isolate_sink`].
    pub fn isolate_sink<S, T>(&self, requests: S, scope: T) -> impl Stream<Item = RequestInput> + use<S, T>
    where
        S: Stream,
        S::Item: Into<RequestInput>,
        T: Into<String>,
    {
        isolation::isolate_sink(requests, scope)
    }

    /// Snapshot of every completed exchange, oldest first.
    ///
    /// The log is shared by every source of one driver, scoped or not.
    #[must_use]
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.core.history.entries()
    }

    /// The driver's history log
    #[must_use]
    pub fn history_log(&self) -> &HistoryLog {
        &self.core.history
    }

    /// Start dropping live requests (see [`ReplayGate`])
    pub fn about_to_replay(&self) {
        self.core.gate.about_to_replay();
    }

    /// Let live requests through again
    pub fn replay_finished(&self) {
        self.core.gate.replay_finished();
    }

    /// Whether live requests are currently dropped
    #[must_use]
    pub fn is_suppressed(&self) -> bool {
        self.core.gate.is_suppressed()
    }

    /// Re-emit `entries` into this driver's output at their recorded times.
    ///
    /// Replayed streams are already settled; they issue no network calls and
    /// are not recorded again.
    pub fn replay_history<S>(&self, scheduler: &S, entries: Vec<HistoryEntry>)
    where
        S: Scheduler + ?Sized,
    {
        let core = Arc::clone(&self.core);
        history::replay(scheduler, entries, move |stream| core.hub.publish(stream));
    }
}

impl std::fmt::Debug for HttpSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSource")
            .field("scopes", &self.scopes)
            .field("history_len", &self.core.history.len())
            .field("suppressed", &self.core.gate.is_suppressed())
            .finish_non_exhaustive()
    }
}
