//! Response-Stream Factory.
//!
//! A [`ResponseStream`] pairs the immutable options of one request with a
//! shared, single-outcome execution. Subscribing yields a [`Subscription`]: a
//! stream that produces exactly one `Ok(response)` or one `Err(failure)` and
//! then ends.
//!
//! # Lifecycle
//!
//! ```text
//!            subscribe (lazy)            outcome
//!   Idle ─────────────────────▶ Running ─────────▶ Settled
//!    ▲                            │
//!    └────────────────────────────┘
//!      last subscriber dropped
//!      (lazy only: call cancelled)
//! ```
//!
//! - Every subscriber of a stream shares one execution, so one request costs
//!   at most one network call at a time.
//! - A lazy stream starts on its first subscription. If every subscriber goes
//!   away before the outcome arrives, the in-flight call is cancelled through
//!   its [`CancellationToken`] and the stream returns to idle.
//! - An eager stream starts as soon as it is created and runs to completion
//!   whether or not anyone is subscribed. Its outcome is buffered for late
//!   subscribers.
//! - A settled stream replays its buffered outcome to every new subscriber.
//!
//! Starting an execution spawns a task, so streams must be subscribed (or
//! created eagerly) from within a Tokio runtime.

use composable_http_core::{CancellationToken, DriverError, Outcome, RequestOptions};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, Stream, StreamExt};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use tokio::sync::watch;

type Execute = Arc<dyn Fn(CancellationToken) -> BoxFuture<'static, Outcome> + Send + Sync>;

/// A stream-of-one carrying the outcome of a single request, tagged with the
/// options that produced it.
///
/// Cloning is cheap; clones share the same execution and the same tag. The tag
/// is read-only: [`request`](Self::request) hands out a shared reference and
/// there is no way to replace it, so filters keyed on it (see
/// [`isolation`](crate::isolation)) see the same value for the stream's whole
/// life.
#[derive(Clone)]
pub struct ResponseStream {
    request: Arc<RequestOptions>,
    shared: Arc<Shared>,
}

struct Shared {
    execute: Execute,
    eager: bool,
    lifecycle: Mutex<Lifecycle>,
}

struct Lifecycle {
    phase: Phase,
    generation: u64,
}

enum Phase {
    Idle,
    Running {
        outcome: watch::Receiver<Option<Outcome>>,
        cancel: CancellationToken,
        subscribers: usize,
    },
    Settled(Outcome),
}

impl Phase {
    const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running { .. } => "running",
            Self::Settled(_) => "settled",
        }
    }
}

impl ResponseStream {
    /// Create a stream that executes on its first subscription.
    ///
    /// `execute` is called once per execution with the token that cancels it.
    /// It is called again only if a previous execution was cancelled because
    /// every subscriber left.
    pub fn lazy<F, Fut>(request: Arc<RequestOptions>, execute: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        Self::with_execute(request, Arc::new(move |cancel| execute(cancel).boxed()), false)
    }

    /// Create a stream and start executing it immediately.
    ///
    /// The execution is not tied to subscribers: it runs to completion and its
    /// outcome is buffered for anyone who subscribes later.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn eager<F, Fut>(request: Arc<RequestOptions>, execute: F) -> Self
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        let stream =
            Self::with_execute(request, Arc::new(move |cancel| execute(cancel).boxed()), true);
        {
            let mut lifecycle = stream.shared.lock();
            Shared::start(&stream.shared, &mut lifecycle, 0);
        }
        stream
    }

    /// Create a stream whose outcome is already known.
    ///
    /// Used for requests that failed before reaching the transport and for
    /// outcomes replayed from history.
    #[must_use]
    pub fn settled(request: Arc<RequestOptions>, outcome: Outcome) -> Self {
        let replay = outcome.clone();
        let execute: Execute = Arc::new(move |_| futures::future::ready(replay.clone()).boxed());
        Self {
            request,
            shared: Arc::new(Shared {
                execute,
                eager: true,
                lifecycle: Mutex::new(Lifecycle {
                    phase: Phase::Settled(outcome),
                    generation: 0,
                }),
            }),
        }
    }

    fn with_execute(request: Arc<RequestOptions>, execute: Execute, eager: bool) -> Self {
        Self {
            request,
            shared: Arc::new(Shared {
                execute,
                eager,
                lifecycle: Mutex::new(Lifecycle {
                    phase: Phase::Idle,
                    generation: 0,
                }),
            }),
        }
    }

    /// The options this stream was created for
    #[must_use]
    pub fn request(&self) -> &RequestOptions {
        &self.request
    }

    /// Shared handle to the options this stream was created for
    #[must_use]
    pub fn request_handle(&self) -> Arc<RequestOptions> {
        Arc::clone(&self.request)
    }

    /// Whether the stream executes independently of its subscribers
    #[must_use]
    pub fn is_eager(&self) -> bool {
        self.shared.eager
    }

    /// Whether an execution is currently in flight
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self.shared.lock().phase, Phase::Running { .. })
    }

    /// The buffered outcome, if the stream has settled
    #[must_use]
    pub fn settled_outcome(&self) -> Option<Outcome> {
        match &self.shared.lock().phase {
            Phase::Settled(outcome) => Some(outcome.clone()),
            _ => None,
        }
    }

    /// Subscribe to the stream's outcome.
    ///
    /// Starts the execution if the stream is lazy and idle. Dropping the
    /// returned subscription before it yields unsubscribes.
    ///
    /// # Panics
    ///
    /// Panics if an execution has to be started outside a Tokio runtime.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        let mut guard = self.shared.lock();
        let lifecycle = &mut *guard;
        if let Phase::Settled(outcome) = &lifecycle.phase {
            return Subscription::ready(outcome.clone());
        }
        let receiver = if let Phase::Running {
            outcome,
            subscribers,
            ..
        } = &mut lifecycle.phase
        {
            *subscribers += 1;
            outcome.clone()
        } else {
            Shared::start(&self.shared, lifecycle, 1)
        };
        let generation = lifecycle.generation;
        drop(guard);

        let guard = SubscriberGuard {
            shared: Arc::clone(&self.shared),
            generation,
        };
        Subscription::waiting(receiver, guard)
    }

    /// Subscribe and wait for the outcome.
    ///
    /// # Errors
    ///
    /// Returns the request's failure, or [`DriverError::Cancelled`] if the
    /// execution was torn down without producing an outcome.
    pub async fn outcome(&self) -> Outcome {
        self.subscribe()
            .next()
            .await
            .unwrap_or(Err(DriverError::Cancelled))
    }
}

impl fmt::Debug for ResponseStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseStream")
            .field("request", &self.request)
            .field("eager", &self.shared.eager)
            .field("phase", &self.shared.lock().phase.name())
            .finish()
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn a new execution. Caller holds the lifecycle lock.
    fn start(
        this: &Arc<Self>,
        lifecycle: &mut Lifecycle,
        subscribers: usize,
    ) -> watch::Receiver<Option<Outcome>> {
        lifecycle.generation += 1;
        let generation = lifecycle.generation;
        let (sender, receiver) = watch::channel(None);
        let cancel = CancellationToken::new();

        let execution = (this.execute)(cancel.clone());
        let shared = Arc::clone(this);
        let cancelled = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancelled.cancelled() => {
                    tracing::debug!(generation, "Response stream execution cancelled");
                    metrics::counter!("http_driver.requests.cancelled").increment(1);
                }
                outcome = execution => {
                    shared.settle(generation, outcome, &sender);
                }
            }
        });

        lifecycle.phase = Phase::Running {
            outcome: receiver.clone(),
            cancel,
            subscribers,
        };
        receiver
    }

    fn settle(&self, generation: u64, outcome: Outcome, sender: &watch::Sender<Option<Outcome>>) {
        let mut lifecycle = self.lock();
        if lifecycle.generation != generation || !matches!(lifecycle.phase, Phase::Running { .. }) {
            return;
        }
        if outcome.is_err() {
            metrics::counter!("http_driver.responses.failed").increment(1);
        }
        lifecycle.phase = Phase::Settled(outcome.clone());
        sender.send_replace(Some(outcome));
    }

    /// One subscriber of `generation` left.
    fn release(&self, generation: u64) {
        let mut lifecycle = self.lock();
        if lifecycle.generation != generation {
            return;
        }
        let Phase::Running {
            subscribers,
            cancel,
            ..
        } = &mut lifecycle.phase
        else {
            return;
        };

        *subscribers = subscribers.saturating_sub(1);
        if *subscribers == 0 && !self.eager {
            cancel.cancel();
            lifecycle.phase = Phase::Idle;
        }
    }
}

/// RAII guard that unsubscribes on drop
struct SubscriberGuard {
    shared: Arc<Shared>,
    generation: u64,
}

impl Drop for SubscriberGuard {
    fn drop(&mut self) {
        self.shared.release(self.generation);
    }
}

/// One subscriber's view of a [`ResponseStream`].
///
/// Yields at most one item, then ends. Dropping it unsubscribes.
#[must_use = "subscriptions do nothing unless polled"]
pub struct Subscription {
    inner: BoxStream<'static, Outcome>,
}

impl Subscription {
    fn ready(outcome: Outcome) -> Self {
        Self {
            inner: stream::once(futures::future::ready(outcome)).boxed(),
        }
    }

    fn waiting(mut receiver: watch::Receiver<Option<Outcome>>, guard: SubscriberGuard) -> Self {
        let inner = async_stream::stream! {
            let _guard = guard;
            loop {
                let current = receiver.borrow_and_update().clone();
                if let Some(outcome) = current {
                    yield outcome;
                    break;
                }
                if receiver.changed().await.is_err() {
                    break;
                }
            }
        };
        Self {
            inner: inner.boxed(),
        }
    }
}

impl Stream for Subscription {
    type Item = Outcome;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use composable_http_core::Response;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn counting(calls: &Arc<AtomicUsize>) -> impl Fn(CancellationToken) -> BoxFuture<'static, Outcome> + Send + Sync + 'static {
        let calls = Arc::clone(calls);
        move |_cancel| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok(Response::new(200, "OK", "Hello World")) }.boxed()
        }
    }

    #[tokio::test]
    async fn lazy_stream_waits_for_subscription() {
        let calls = Arc::new(AtomicUsize::new(0));
        let stream = ResponseStream::lazy(Arc::new(RequestOptions::new("/hello")), counting(&calls));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let outcome = stream.outcome().await.unwrap();
        assert_eq!(outcome.text, "Hello World");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscribers_share_one_execution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let stream = ResponseStream::lazy(Arc::new(RequestOptions::new("/hello")), counting(&calls));

        let first = stream.subscribe();
        let second = stream.subscribe();
        let (a, b) = tokio::join!(first.collect::<Vec<_>>(), second.collect::<Vec<_>>());

        assert_eq!(a.len(), 1);
        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // Late subscribers get the buffered outcome without a new call.
        assert!(stream.outcome().await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn eager_stream_starts_without_subscribers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let stream = ResponseStream::eager(Arc::new(RequestOptions::new("/hello")), counting(&calls));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(stream.settled_outcome().is_some());
        assert!(stream.outcome().await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn settled_stream_replays_to_every_subscriber() {
        let stream = ResponseStream::settled(
            Arc::new(RequestOptions::default()),
            Err(DriverError::MissingUrl),
        );
        assert_eq!(stream.outcome().await, Err(DriverError::MissingUrl));
        assert_eq!(stream.subscribe().collect::<Vec<_>>().await, vec![Err(DriverError::MissingUrl)]);
    }

    #[tokio::test]
    async fn dropping_last_subscriber_cancels_lazy_execution() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let stream = ResponseStream::lazy(
            Arc::new(RequestOptions::new("/slow")),
            move |cancel: CancellationToken| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    cancel.cancelled().await;
                    Err(DriverError::Cancelled)
                }
            },
        );

        let mut subscription = stream.subscribe();
        let pending = tokio::time::timeout(Duration::from_millis(10), subscription.next()).await;
        assert!(pending.is_err());
        assert!(stream.is_running());

        drop(subscription);
        assert!(!stream.is_running());
        assert!(stream.settled_outcome().is_none());

        // A new subscriber after a cancellation starts a fresh execution.
        let _again = stream.subscribe();
        assert!(stream.is_running());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
