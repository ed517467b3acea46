//! # Composable HTTP reqwest
//!
//! Production [`Transport`] for the composable HTTP driver, backed by
//! [`reqwest`].
//!
//! ## Example
//!
//! ```ignore
//! use composable_http_reqwest::ReqwestTransport;
//! use composable_http_runtime::{DriverConfig, HttpDriver};
//!
//! let driver = HttpDriver::new(DriverConfig::from_env(), ReqwestTransport::new());
//! let source = driver.run(requests);
//! ```
//!
//! ## Request mapping
//!
//! | Option            | reqwest                                               |
//! |-------------------|-------------------------------------------------------|
//! | `query`           | `RequestBuilder::query`                               |
//! | `user`/`password` | `RequestBuilder::basic_auth`                          |
//! | `headers`         | `RequestBuilder::header`, in order                    |
//! | `accept`          | `Accept` header (`json`, `form`... expand to MIME types) |
//! | `send` + `type`   | `json` body, urlencoded `form` body, or raw body with the given MIME type |
//! | `field`/`attach`  | `multipart/form-data` body, files read from disk      |
//! | `redirects`       | `redirect::Policy::limited`, one client per limit     |
//!
//! `withCredentials` only has meaning for browser transports and is ignored.

use composable_http_core::{
    Attachment, CancellationToken, Method, Response, Transport, TransportCall, TransportError,
};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, redirect};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// [`Transport`] that issues calls with a `reqwest` client
///
/// Cloning is cheap; clones share their clients.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    fixed: Option<Client>,
    clients: Arc<Mutex<HashMap<u32, Client>>>,
}

impl ReqwestTransport {
    /// Create a transport that builds one client per redirect limit
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transport that sends every call through `client`.
    ///
    /// The client's own redirect policy applies; per-request redirect limits
    /// are ignored.
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self {
            fixed: Some(client),
            clients: Arc::default(),
        }
    }

    fn client_for(&self, redirects: u32) -> Result<Client, TransportError> {
        if let Some(client) = &self.fixed {
            return Ok(client.clone());
        }

        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(&redirects) {
            return Ok(client.clone());
        }

        let policy = if redirects == 0 {
            redirect::Policy::none()
        } else {
            redirect::Policy::limited(redirects as usize)
        };
        let client = Client::builder()
            .redirect(policy)
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to build HTTP client: {e}")))?;
        tracing::debug!(redirects, "Built HTTP client");
        clients.insert(redirects, client.clone());
        Ok(client)
    }

    async fn exchange(&self, call: TransportCall) -> Result<Response, TransportError> {
        let client = self.client_for(call.redirects)?;
        let request = build_request(&client, &call).await?;
        let response = request.send().await.map_err(network)?;
        into_response(response).await
    }
}

impl Transport for ReqwestTransport {
    fn issue(
        &self,
        call: TransportCall,
        cancel: CancellationToken,
    ) -> impl Future<Output = Result<Response, TransportError>> + Send {
        let transport = self.clone();
        async move {
            let url = call.url.clone();
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::debug!(%url, "HTTP request aborted");
                    Err(TransportError::Aborted)
                }
                result = transport.exchange(call) => result,
            }
        }
    }
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("fixed_client", &self.fixed.is_some())
            .finish_non_exhaustive()
    }
}

async fn build_request(client: &Client, call: &TransportCall) -> Result<RequestBuilder, TransportError> {
    let mut request = client.request(reqwest_method(call.method), &call.url);

    if !call.query.is_empty() {
        request = request.query(&call.query);
    }
    if let Some((user, password)) = &call.credentials {
        request = request.basic_auth(user, Some(password));
    }
    for (name, value) in &call.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    if let Some(accept) = &call.accept {
        request = request.header(ACCEPT, mime_type(accept));
    }

    if call.is_multipart() {
        if call.body.is_some() {
            tracing::debug!(url = %call.url, "Multipart request, ignoring `send` body");
        }
        return Ok(request.multipart(multipart(call).await?));
    }

    let Some(body) = &call.body else {
        return Ok(request);
    };
    Ok(match call.content_type.as_str() {
        "json" => request.json(body),
        "form" => match body {
            Value::Object(record) => {
                let pairs: Vec<(&str, String)> = record
                    .iter()
                    .map(|(key, value)| (key.as_str(), raw_text(value)))
                    .collect();
                request.form(&pairs)
            }
            other => request
                .header(CONTENT_TYPE, mime_type("form"))
                .body(raw_text(other)),
        },
        other => request
            .header(CONTENT_TYPE, mime_type(other))
            .body(raw_text(body)),
    })
}

async fn multipart(call: &TransportCall) -> Result<Form, TransportError> {
    let mut form = Form::new();
    for (name, value) in &call.fields {
        form = form.text(name.clone(), value.clone());
    }
    for attachment in &call.attachments {
        let bytes = tokio::fs::read(&attachment.path).await.map_err(|e| {
            TransportError::Network(format!("Cannot read attachment {}: {e}", attachment.path))
        })?;
        let part = Part::bytes(bytes).file_name(file_name(attachment));
        form = form.part(attachment.name.clone(), part);
    }
    Ok(form)
}

async fn into_response(response: reqwest::Response) -> Result<Response, TransportError> {
    let status = response.status();
    let headers: Vec<(String, String)> = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    let text = response.text().await.map_err(network)?;

    let mut converted = Response::new(status.as_u16(), status.canonical_reason().unwrap_or_default(), text);
    converted.headers = headers;
    if converted.header("content-type").is_some_and(|kind| kind.contains("json")) {
        converted.body = serde_json::from_str(&converted.text).ok();
    }
    Ok(converted)
}

const fn reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

/// Expand the short content type names requests may use
fn mime_type(kind: &str) -> &str {
    match kind {
        "json" => "application/json",
        "form" | "urlencoded" | "form-data" => "application/x-www-form-urlencoded",
        "xml" => "application/xml",
        "html" => "text/html",
        "text" => "text/plain",
        other => other,
    }
}

fn raw_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn file_name(attachment: &Attachment) -> String {
    attachment
        .filename
        .clone()
        .or_else(|| {
            Path::new(&attachment.path)
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| attachment.name.clone())
}

#[allow(clippy::needless_pass_by_value)]
fn network(error: reqwest::Error) -> TransportError {
    TransportError::Network(error.to_string())
}
