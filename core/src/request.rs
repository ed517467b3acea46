//! Canonical request descriptors.
//!
//! A [`RequestOptions`] record describes one HTTP call in a transport-agnostic
//! way. Components emit either a bare URL or a full options record; the two
//! shapes (plus dynamically-typed JSON input) are captured by [`RequestInput`]
//! and resolved once by the [Request Normalizer](crate::normalize).
//!
//! # Examples
//!
//! ```
//! use composable_http_core::{Method, RequestOptions};
//! use serde_json::json;
//!
//! let options = RequestOptions::get("/querystring")
//!     .query("foo", 102030)
//!     .query("bar", "Pub")
//!     .header("X-Trace", "abc");
//!
//! assert_eq!(options.method, Method::Get);
//! assert_eq!(options.query[0], ("foo".to_string(), "102030".to_string()));
//! assert_eq!(options.redirects, 5);
//! ```

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default redirect limit for a request.
pub const DEFAULT_REDIRECTS: u32 = 5;

/// Error type for [`Method`] parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unsupported HTTP method: {0}")]
pub struct ParseMethodError(String);

/// HTTP method of a request.
///
/// Parsing is case-insensitive, and `"del"` is accepted as a synonym for
/// [`Method::Delete`] (some clients cannot use `delete` as an identifier).
///
/// # Examples
///
/// ```
/// use composable_http_core::Method;
///
/// assert_eq!("post".parse::<Method>().unwrap(), Method::Post);
/// assert_eq!("DEL".parse::<Method>().unwrap(), Method::Delete);
/// assert_eq!(Method::Patch.as_str(), "PATCH");
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`
    #[default]
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
    /// `HEAD`
    Head,
    /// `OPTIONS`
    Options,
}

impl Method {
    /// The upper-case verb.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = ParseMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Self::Get),
            "post" => Ok(Self::Post),
            "put" => Ok(Self::Put),
            "patch" => Ok(Self::Patch),
            "delete" | "del" => Ok(Self::Delete),
            "head" => Ok(Self::Head),
            "options" => Ok(Self::Options),
            _ => Err(ParseMethodError(s.to_string())),
        }
    }
}

impl Serialize for Method {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Method {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let verb = String::deserialize(deserializer)?;
        verb.parse().map_err(serde::de::Error::custom)
    }
}

/// A multipart file attachment.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Form field name
    pub name: String,
    /// Path of the file to upload
    pub path: String,
    /// File name announced to the server (defaults to the path's file name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl Attachment {
    /// Create an attachment for the file at `path`
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            filename: None,
        }
    }

    /// Override the announced file name
    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// Canonical request descriptor.
///
/// Field names on the wire follow the request-options record hosts already
/// speak (`send`, `type`, `withCredentials`, `field`, `attach`, `_namespace`).
///
/// Once a request has been turned into a response stream, its options are
/// frozen behind an `Arc`. The only mutations that happen before that point are
/// scope appends by the isolation layer and prefix defaulting by the execution
/// policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RequestOptions {
    /// Target URL, absolute or relative to `prefix`.
    ///
    /// A non-string `url` deserializes as empty, so the invoker reports it
    /// as missing.
    #[serde(deserialize_with = "lenient_url")]
    pub url: String,

    /// HTTP method
    pub method: Method,

    /// Request body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send: Option<Value>,

    /// Query parameters, in insertion order
    #[serde(with = "crate::pairs", skip_serializing_if = "Vec::is_empty")]
    pub query: Vec<(String, String)>,

    /// Request headers, in insertion order
    #[serde(with = "crate::pairs", skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,

    /// Accepted response content type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept: Option<String>,

    /// Request content type (`json` when absent)
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Basic-auth user
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,

    /// Basic-auth password
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,

    /// Send cookies with cross-origin requests
    pub with_credentials: bool,

    /// Maximum number of redirects to follow
    pub redirects: u32,

    /// Multipart form fields, in insertion order
    #[serde(
        rename = "field",
        with = "crate::pairs",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub fields: Vec<(String, String)>,

    /// Multipart file attachments
    #[serde(rename = "attach", skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,

    /// Per-request override of the driver's eagerness
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eager: Option<bool>,

    /// Base URL prepended to scheme-less `url`s
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Isolation scopes this request has crossed, outermost first
    #[serde(rename = "_namespace", skip_serializing_if = "Vec::is_empty")]
    pub namespace: Vec<String>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            url: String::new(),
            method: Method::Get,
            send: None,
            query: Vec::new(),
            headers: Vec::new(),
            accept: None,
            content_type: None,
            user: None,
            password: None,
            with_credentials: false,
            redirects: DEFAULT_REDIRECTS,
            fields: Vec::new(),
            attachments: Vec::new(),
            eager: None,
            prefix: None,
            namespace: Vec::new(),
        }
    }
}

impl RequestOptions {
    /// Create a `GET` request for `url`
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Create a `GET` request for `url`
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url)
    }

    /// Create a `POST` request for `url`
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(url).method(Method::Post)
    }

    /// Create a `PUT` request for `url`
    #[must_use]
    pub fn put(url: impl Into<String>) -> Self {
        Self::new(url).method(Method::Put)
    }

    /// Create a `DELETE` request for `url`
    #[must_use]
    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(url).method(Method::Delete)
    }

    /// Set the method
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the request body
    #[must_use]
    pub fn send(mut self, body: impl Into<Value>) -> Self {
        self.send = Some(body.into());
        self
    }

    /// Append a query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Append a header
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the accepted response content type
    #[must_use]
    pub fn accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    /// Set the request content type
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set basic-auth credentials
    #[must_use]
    pub fn auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// Send cookies with cross-origin requests
    #[must_use]
    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    /// Set the redirect limit
    #[must_use]
    pub fn redirects(mut self, redirects: u32) -> Self {
        self.redirects = redirects;
        self
    }

    /// Append a multipart form field
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.fields.push((name.into(), value.to_string()));
        self
    }

    /// Append a multipart file attachment
    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Override the driver's eagerness for this request
    #[must_use]
    pub fn eager(mut self, eager: bool) -> Self {
        self.eager = Some(eager);
        self
    }

    /// Set the base URL for a scheme-less `url`
    #[must_use]
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Record that this request crossed the isolation boundary `scope`.
    ///
    /// Scopes are only ever appended; a request never leaves a scope it entered.
    pub fn push_scope(&mut self, scope: impl Into<String>) {
        self.namespace.push(scope.into());
    }

    /// Isolation scopes crossed so far, outermost first
    #[must_use]
    pub fn namespace(&self) -> &[String] {
        &self.namespace
    }

    /// Whether `scope` is one of the scopes this request crossed
    #[must_use]
    pub fn in_scope(&self, scope: &str) -> bool {
        self.namespace.iter().any(|s| s == scope)
    }
}

fn lenient_url<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(url) => Ok(url),
        _ => Ok(String::new()),
    }
}

/// Raw item from the request stream.
///
/// Components may emit a bare URL, a typed options record, or a JSON value
/// describing either (for hosts that assemble requests dynamically). Only the
/// JSON variant can be malformed; see [`normalize`](crate::normalize).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestInput {
    /// A URL to `GET`
    Url(String),
    /// A full options record
    Options(RequestOptions),
    /// Dynamically-shaped input, resolved by the normalizer
    Json(Value),
}

impl From<&str> for RequestInput {
    fn from(url: &str) -> Self {
        Self::Url(url.to_string())
    }
}

impl From<String> for RequestInput {
    fn from(url: String) -> Self {
        Self::Url(url)
    }
}

impl From<RequestOptions> for RequestInput {
    fn from(options: RequestOptions) -> Self {
        Self::Options(options)
    }
}

impl From<Value> for RequestInput {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}
