//! Boundary with the network transport collaborator.
//!
//! The driver never touches the network itself. For each request it assembles
//! a [`TransportCall`] and hands it to a [`Transport`] together with a
//! [`CancellationToken`]. The transport issues exactly one network call and
//! reports exactly one outcome.
//!
//! # Implementations
//!
//! - `ReqwestTransport` (crate `composable-http-reqwest`) - For production
//! - `MockTransport` (crate `composable-http-testing`) - For tests (scripted routes)

use crate::error::TransportError;
use crate::request::{Attachment, Method};
use crate::response::Response;
use serde_json::Value;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Content type used when a request does not name one.
pub const DEFAULT_CONTENT_TYPE: &str = "json";

/// Everything a transport needs to issue one call.
///
/// Built by the transport invoker from a request's options; `url` is already
/// resolved against the request's prefix.
#[derive(Clone, Debug, PartialEq)]
pub struct TransportCall {
    /// HTTP method
    pub method: Method,
    /// Effective URL
    pub url: String,
    /// Maximum number of redirects to follow
    pub redirects: u32,
    /// Request content type (`json`, `form`, or a full MIME type)
    pub content_type: String,
    /// Accepted response content type
    pub accept: Option<String>,
    /// Request body
    pub body: Option<Value>,
    /// Query parameters, in order
    pub query: Vec<(String, String)>,
    /// Basic-auth user and password
    pub credentials: Option<(String, String)>,
    /// Send cookies with cross-origin requests
    pub with_credentials: bool,
    /// Headers, in order
    pub headers: Vec<(String, String)>,
    /// Multipart form fields, in order
    pub fields: Vec<(String, String)>,
    /// Multipart file attachments, in the order they are applied
    pub attachments: Vec<Attachment>,
}

impl TransportCall {
    /// A bare call with every option at its default
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            redirects: crate::request::DEFAULT_REDIRECTS,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            accept: None,
            body: None,
            query: Vec::new(),
            credentials: None,
            with_credentials: false,
            headers: Vec::new(),
            fields: Vec::new(),
            attachments: Vec::new(),
        }
    }

    /// Whether the call carries multipart fields or attachments
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        !self.fields.is_empty() || !self.attachments.is_empty()
    }
}

/// Transport trait - issues one network call per invocation
///
/// Implementations must:
/// - issue at most one network operation per call to [`issue`](Transport::issue)
///   (no retries, no caching)
/// - resolve with the response for every HTTP status, including errors; the
///   driver decides which statuses are failures
/// - stop work and resolve with [`TransportError::Aborted`] once `cancel` fires
///
/// # Example
///
/// ```ignore
/// struct Canned;
///
/// impl Transport for Canned {
///     async fn issue(
///         &self,
///         call: TransportCall,
///         _cancel: CancellationToken,
///     ) -> Result<Response, TransportError> {
///         Ok(Response::new(200, "OK", format!("you asked for {}", call.url)))
///     }
/// }
/// ```
pub trait Transport: Send + Sync + 'static {
    /// Issue `call` and report its outcome
    fn issue(
        &self,
        call: TransportCall,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Response, TransportError>> + Send;
}
