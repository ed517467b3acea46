//! Transport-agnostic response values.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A completed HTTP exchange as reported by the transport.
///
/// `body` holds the parsed payload when the transport could decode one
/// (JSON responses); `text` always holds the raw body.
///
/// # Examples
///
/// ```
/// use composable_http_core::Response;
/// use serde_json::json;
///
/// let response = Response::new(200, "OK", r#"{"deleted":true}"#)
///     .with_header("Content-Type", "application/json")
///     .with_body(json!({"deleted": true}));
///
/// assert_eq!(response.header("content-type"), Some("application/json"));
/// assert!(!response.is_error());
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    /// HTTP status code
    pub status: u16,

    /// Reason phrase for `status`
    #[serde(default)]
    pub status_text: String,

    /// Response headers, in the order the transport reported them
    #[serde(default, with = "crate::pairs")]
    pub headers: Vec<(String, String)>,

    /// Parsed body, when the transport could decode one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,

    /// Raw body text
    #[serde(default)]
    pub text: String,
}

impl Response {
    /// Create a response with a status, reason phrase and body text
    #[must_use]
    pub fn new(status: u16, status_text: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            status,
            status_text: status_text.into(),
            headers: Vec::new(),
            body: None,
            text: text.into(),
        }
    }

    /// Append a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a parsed body
    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// First header named `name`, compared case-insensitively
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Whether `status` is 400 or above
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.status >= 400
    }
}
