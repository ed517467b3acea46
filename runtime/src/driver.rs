//! Driver Entry Point.
//!
//! [`HttpDriver::run`] is the whole pipeline:
//!
//! ```text
//! requests ──▶ suppression gate ──▶ normalize ──▶ policy ──▶ ResponseStream ──▶ HttpSource
//!                                      │                         │
//!                                      └─ invalid shape ─▶ settled failure
//!                                                                │ on execution
//!                                                                ▼
//!                                                invoke ──▶ HistoryLog
//! ```
//!
//! Each driver run owns its own history log and replay gate, so two drivers
//! (or two runs of one configuration) never see each other's traffic.

use crate::history::{HistoryLog, ReplayGate};
use crate::invoker;
use crate::policy::ExecutionPolicy;
use crate::response_stream::ResponseStream;
use crate::source::{HttpSource, Hub, SourceCore};
use crate::DriverConfig;
use composable_http_core::environment::{Clock, SystemClock};
use composable_http_core::{
    normalize, CancellationToken, DriverError, HistoryEntry, RequestInput, RequestOptions,
    Transport,
};
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::sync::Arc;

/// The HTTP driver
///
/// Holds the configuration and the collaborators; [`run`](Self::run) wires
/// them to a request stream.
///
/// # Type Parameters
///
/// - `T`: the [`Transport`] that issues network calls
///
/// # Example
///
/// ```ignore
/// let driver = HttpDriver::new(DriverConfig::default(), MockTransport::pet_store());
/// let source = driver.run(futures::stream::iter(["http://localhost/hello"]));
/// ```
pub struct HttpDriver<T> {
    config: DriverConfig,
    transport: Arc<T>,
    clock: Arc<dyn Clock>,
}

impl<T: Transport> HttpDriver<T> {
    /// Create a driver that timestamps history with the system clock
    #[must_use]
    pub fn new(config: DriverConfig, transport: T) -> Self {
        Self {
            config,
            transport: Arc::new(transport),
            clock: Arc::new(SystemClock),
        }
    }

    /// Timestamp history entries with `clock` instead of the system clock
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The driver's configuration
    #[must_use]
    pub const fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// The driver's transport
    #[must_use]
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Consume `requests` and return the stream of response streams.
    ///
    /// Requests are handled in arrival order, one response stream each. While
    /// the source is suppressed (see [`HttpSource::about_to_replay`]) incoming
    /// requests are dropped without a response stream.
    ///
    /// Requests are read as soon as the driver runs. Response streams emitted
    /// before anyone subscribes are held for the first subscriber, so none
    /// are lost to a late `subscribe()`.
    ///
    /// The returned source never completes, even after `requests` ends.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn run<S, I>(self, requests: S) -> HttpSource
    where
        S: Stream<Item = I> + Send + 'static,
        I: Into<RequestInput> + Send + 'static,
    {
        let core = Arc::new(SourceCore {
            hub: Hub::new(),
            history: HistoryLog::new(),
            gate: ReplayGate::new(),
        });

        let pipeline = Pipeline {
            policy: ExecutionPolicy::from_config(&self.config),
            transport: self.transport,
            clock: self.clock,
            history: core.history.clone(),
        };

        tracing::debug!(
            eager = self.config.eager,
            prefix = ?self.config.prefix,
            "HTTP driver started"
        );

        let pump_core = Arc::clone(&core);
        tokio::spawn(async move {
            let mut requests = std::pin::pin!(requests);
            while let Some(request) = requests.next().await {
                let input: RequestInput = request.into();
                if pump_core.gate.is_suppressed() {
                    tracing::warn!("Dropping live request while history is replayed");
                    metrics::counter!("http_driver.requests.suppressed").increment(1);
                    continue;
                }
                pump_core.hub.publish(pipeline.response_stream(input));
            }
            tracing::debug!("Request stream ended");
        });

        HttpSource::new(core)
    }
}

impl<T> std::fmt::Debug for HttpDriver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpDriver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Per-run state shared by every response stream the driver creates
struct Pipeline<T> {
    policy: ExecutionPolicy,
    transport: Arc<T>,
    clock: Arc<dyn Clock>,
    history: HistoryLog,
}

impl<T: Transport> Pipeline<T> {
    fn response_stream(&self, input: RequestInput) -> ResponseStream {
        let options = match normalize(input.clone()) {
            Ok(options) => self.policy.resolve(options),
            Err(error) => {
                tracing::debug!(%error, "Rejecting malformed request");
                return ResponseStream::settled(Arc::new(fallback_tag(&input)), Err(error));
            }
        };

        let transport = Arc::clone(&self.transport);
        let clock = Arc::clone(&self.clock);
        let history = self.history.clone();
        let request = Arc::clone(&options);

        self.policy.response_stream(options, move |cancel: CancellationToken| {
            let transport = Arc::clone(&transport);
            let clock = Arc::clone(&clock);
            let history = history.clone();
            let request = Arc::clone(&request);
            let input = input.clone();
            async move {
                let outcome = invoker::invoke(transport.as_ref(), &request, cancel).await;
                if !matches!(outcome, Err(DriverError::Cancelled)) {
                    history.record(HistoryEntry::new(
                        clock.now(),
                        input,
                        RequestOptions::clone(&request),
                        outcome.clone(),
                    ));
                }
                outcome
            }
        })
    }
}

/// Tag for a request that could not be normalized: default options carrying
/// whatever scope tokens the raw input had, so scoped sources still see it.
fn fallback_tag(input: &RequestInput) -> RequestOptions {
    let mut options = RequestOptions::default();
    if let RequestInput::Json(Value::Object(record)) = input {
        if let Some(Value::Array(scopes)) = record.get("_namespace") {
            for scope in scopes.iter().filter_map(Value::as_str) {
                options.push_scope(scope);
            }
        }
    }
    options
}
