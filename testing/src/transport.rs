//! In-memory [`Transport`] with scripted routes.
//!
//! Routes are matched on method and URL path (scheme, host and query string
//! are ignored). Unmatched calls answer `404 Not Found`. Every call is
//! recorded, and calls torn down before they answered are counted as aborted,
//! so tests can assert on network traffic and on cancellation.

use composable_http_core::{
    CancellationToken, Method, Response, Transport, TransportCall, TransportError,
};
use serde_json::{Map, Value, json};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Route handler: computes the answer for one call
pub type Handler = Arc<dyn Fn(&TransportCall) -> Result<Response, TransportError> + Send + Sync>;

#[derive(Clone)]
struct Route {
    method: Option<Method>,
    path: String,
    handler: Handler,
}

impl Route {
    fn matches(&self, call: &TransportCall) -> bool {
        self.method.is_none_or(|method| method == call.method) && self.path == path_of(&call.url)
    }
}

/// Mock transport for tests
///
/// Cloning is cheap; clones share routes, the call log and the counters, so a
/// test can keep one clone for assertions and hand another to the driver.
///
/// # Example
///
/// ```
/// use composable_http_core::{Method, Response};
/// use composable_http_testing::MockTransport;
///
/// let transport = MockTransport::new()
///     .respond(Method::Get, "/hello", Response::new(200, "OK", "Hello World"));
/// assert_eq!(transport.call_count(), 0);
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    routes: Arc<Vec<Route>>,
    latency: Option<Duration>,
    calls: Arc<Mutex<Vec<TransportCall>>>,
    completed: Arc<AtomicUsize>,
    aborted: Arc<AtomicUsize>,
}

impl MockTransport {
    /// Create a transport with no routes
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer calls to `path` with `handler`. `None` matches every method.
    #[must_use]
    pub fn route<F>(mut self, method: Option<Method>, path: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&TransportCall) -> Result<Response, TransportError> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.routes).push(Route {
            method,
            path: path.into(),
            handler: Arc::new(handler),
        });
        self
    }

    /// Answer `method` calls to `path` with a fixed response
    #[must_use]
    pub fn respond(self, method: Method, path: impl Into<String>, response: Response) -> Self {
        self.route(Some(method), path, move |_| Ok(response.clone()))
    }

    /// Fail every call to `path` with a network error
    #[must_use]
    pub fn fail(self, path: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        self.route(None, path, move |_| Err(TransportError::Network(message.clone())))
    }

    /// Delay every answer by `latency`. Cancellation is honored while waiting.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Routes of the small pet-store server the driver's tests run against.
    ///
    /// | Route               | Answer                                      |
    /// |---------------------|---------------------------------------------|
    /// | `GET /hello`        | `200`, text `Hello World`                   |
    /// | `POST /pet`         | `200`, text `added {name} the {species}`    |
    /// | `GET /querystring`  | `200`, the query as a JSON object           |
    /// | `DELETE /delete`    | `200`, body `{"deleted": true}`             |
    /// | `* /error`          | `500 Internal Server Error`, text `boom`    |
    /// | `GET /json`         | `200`, a JSON body                          |
    #[must_use]
    pub fn pet_store() -> Self {
        Self::new()
            .respond(Method::Get, "/hello", Response::new(200, "OK", "Hello World"))
            .route(Some(Method::Post), "/pet", |call| {
                let field = |name: &str| {
                    call.body
                        .as_ref()
                        .and_then(|body| body.get(name))
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                };
                Ok(Response::new(
                    200,
                    "OK",
                    format!("added {} the {}", field("name"), field("species")),
                ))
            })
            .route(Some(Method::Get), "/querystring", |call| {
                let query: Map<String, Value> = call
                    .query
                    .iter()
                    .map(|(key, value)| (key.clone(), Value::String(value.clone())))
                    .collect();
                Ok(json_response(Value::Object(query)))
            })
            .route(Some(Method::Delete), "/delete", |_| {
                Ok(json_response(json!({"deleted": true})))
            })
            .route(None, "/error", |_| {
                Ok(Response::new(500, "Internal Server Error", "boom"))
            })
            .route(Some(Method::Get), "/json", |_| {
                Ok(json_response(json!({"pets": ["Woof", "Meow"]})))
            })
    }

    /// Every call issued so far, in issue order
    #[must_use]
    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of calls issued so far
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of calls that produced an answer
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    /// Number of calls torn down before they answered
    #[must_use]
    pub fn aborted_count(&self) -> usize {
        self.aborted.load(Ordering::SeqCst)
    }

    fn answer(&self, call: &TransportCall) -> Result<Response, TransportError> {
        self.routes
            .iter()
            .find(|route| route.matches(call))
            .map_or_else(
                || Ok(Response::new(404, "Not Found", "")),
                |route| (route.handler)(call),
            )
    }
}

impl Transport for MockTransport {
    fn issue(
        &self,
        call: TransportCall,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Response, TransportError>> + Send {
        let transport = self.clone();
        async move {
            tracing::debug!(method = %call.method, url = %call.url, "Mock transport call");
            transport
                .calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(call.clone());

            let mut in_flight = InFlightGuard {
                aborted: Arc::clone(&transport.aborted),
                answered: false,
            };

            if let Some(latency) = transport.latency {
                tokio::select! {
                    () = cancel.cancelled() => return Err(TransportError::Aborted),
                    () = tokio::time::sleep(latency) => {}
                }
            }

            in_flight.answered = true;
            transport.completed.fetch_add(1, Ordering::SeqCst);
            transport.answer(&call)
        }
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("routes", &self.routes.len())
            .field("latency", &self.latency)
            .field("calls", &self.call_count())
            .field("aborted", &self.aborted_count())
            .finish()
    }
}

/// Counts the call as aborted unless it answered before being dropped
struct InFlightGuard {
    aborted: Arc<AtomicUsize>,
    answered: bool,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if !self.answered {
            self.aborted.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn json_response(body: Value) -> Response {
    Response::new(200, "OK", body.to_string())
        .with_header("Content-Type", "application/json")
        .with_body(body)
}

/// Path component of `url`, without scheme, authority or query string
fn path_of(url: &str) -> &str {
    let rest = url.split_once("://").map_or(url, |(_, rest)| {
        rest.find('/').map_or("/", |index| &rest[index..])
    });
    rest.split(['?', '#']).next().unwrap_or(rest)
}
