//! Request Normalizer.
//!
//! Resolves a raw [`RequestInput`] into a canonical [`RequestOptions`] record.
//! Typed input always normalizes; only dynamically-shaped JSON can be rejected.

use crate::error::DriverError;
use crate::request::{RequestInput, RequestOptions};
use serde_json::Value;

/// Coerce raw request input into canonical request options.
///
/// - A URL becomes `{url}` with every other field at its default
/// - An options record passes through unchanged
/// - A JSON string is treated as a URL, a JSON object as an options record
///
/// An options record without a `url` is *not* rejected here; the transport
/// invoker reports [`DriverError::MissingUrl`] when the request executes, so
/// the failure reaches subscribers through the response stream.
///
/// # Errors
///
/// Returns [`DriverError::InvalidRequestShape`] for JSON input that is neither
/// a string nor an object, or an object whose fields have the wrong types.
///
/// # Examples
///
/// ```
/// use composable_http_core::{normalize, DriverError, RequestInput};
/// use serde_json::json;
///
/// let options = normalize(RequestInput::from(json!({"url": "/pet", "method": "POST"}))).unwrap();
/// assert_eq!(options.url, "/pet");
///
/// let error = normalize(RequestInput::from(json!(123))).unwrap_err();
/// assert!(matches!(error, DriverError::InvalidRequestShape(_)));
/// ```
pub fn normalize(input: RequestInput) -> Result<RequestOptions, DriverError> {
    match input {
        RequestInput::Url(url) | RequestInput::Json(Value::String(url)) => {
            Ok(RequestOptions::new(url))
        }
        RequestInput::Options(options) => Ok(options),
        RequestInput::Json(value @ Value::Object(_)) => serde_json::from_value(value)
            .map_err(|e| DriverError::InvalidRequestShape(e.to_string())),
        RequestInput::Json(other) => Err(DriverError::InvalidRequestShape(format!(
            "got {}",
            kind_of(&other)
        ))),
    }
}

const fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
