//! Isolation Layer.
//!
//! Lets independently written components share one driver without seeing each
//! other's traffic. A component's outgoing requests are tagged with a scope
//! token ([`isolate_sink`]); its view of the responses keeps only streams whose
//! request carries that token ([`isolate_source`]).
//!
//! Scopes nest: tokens are appended to a request's namespace, never removed,
//! and visibility is a membership test rather than a prefix match. A request
//! tagged `["app", "list"]` is visible to both the `app` scope and the `list`
//! scope.
//!
//! # Example
//!
//! ```ignore
//! let source = driver.run(requests);
//!
//! // Inside the component scoped to "todos":
//! let scoped_requests = source.isolate_sink(component_requests, "todos");
//! let scoped_source = source.isolate_source("todos");
//! ```

use crate::source::HttpSource;
use composable_http_core::{RequestInput, RequestOptions};
use futures::{Stream, StreamExt};
use serde_json::Value;

/// Tag every request of `requests` with `scope`.
///
/// Bare URLs are wrapped into options records first. JSON objects get the
/// token appended to their `_namespace` array. Other JSON values are passed
/// through untouched; the normalizer rejects them downstream.
pub fn isolate_sink<S>(requests: S, scope: impl Into<String>) -> impl Stream<Item = RequestInput>
where
    S: Stream,
    S::Item: Into<RequestInput>,
{
    let scope = scope.into();
    requests.map(move |request| scope_request(request.into(), &scope))
}

/// Append `scope` to one request's namespace.
///
/// # Examples
///
/// ```
/// use composable_http_core::RequestInput;
/// use composable_http_runtime::isolation::scope_request;
///
/// let scoped = scope_request(RequestInput::from("http://localhost/hello"), "foo");
/// let RequestInput::Options(options) = scoped else { unreachable!() };
/// assert_eq!(options.url, "http://localhost/hello");
/// assert_eq!(options.namespace(), ["foo".to_string()]);
/// ```
#[must_use]
pub fn scope_request(request: RequestInput, scope: &str) -> RequestInput {
    match request {
        RequestInput::Url(url) | RequestInput::Json(Value::String(url)) => {
            let mut options = RequestOptions::new(url);
            options.push_scope(scope);
            RequestInput::Options(options)
        }
        RequestInput::Options(mut options) => {
            options.push_scope(scope);
            RequestInput::Options(options)
        }
        RequestInput::Json(Value::Object(mut record)) => {
            let namespace = record
                .entry("_namespace")
                .or_insert_with(|| Value::Array(Vec::new()));
            if !namespace.is_array() {
                *namespace = Value::Array(Vec::new());
            }
            if let Value::Array(scopes) = namespace {
                scopes.push(Value::String(scope.to_string()));
            }
            RequestInput::Json(Value::Object(record))
        }
        other @ RequestInput::Json(_) => other,
    }
}

/// Narrow `source` to the response streams of requests tagged with `scope`.
///
/// Equivalent to [`HttpSource::isolate_source`].
#[must_use]
pub fn isolate_source(source: &HttpSource, scope: impl Into<String>) -> HttpSource {
    source.isolate_source(scope)
}

/// Whether a request carrying `namespace` is visible inside every scope of `scopes`.
#[must_use]
pub fn is_visible(namespace: &[String], scopes: &[String]) -> bool {
    scopes.iter().all(|scope| namespace.contains(scope))
}
