//! Recorded request/response pairs.

use crate::error::DriverError;
use crate::request::{RequestInput, RequestOptions};
use crate::response::Response;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One completed exchange, as captured by the driver's history log.
///
/// Entries serialize to JSON so a captured session can be stored as a test
/// fixture and replayed later.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// When the outcome was observed
    pub time: DateTime<Utc>,

    /// The raw item the request stream emitted.
    ///
    /// Stored with its variant name so a dynamic record comes back as
    /// dynamic input, not as options.
    #[serde(with = "TaggedInput")]
    pub request: RequestInput,

    /// The options the response stream was tagged with
    #[serde(rename = "reqOptions")]
    pub options: RequestOptions,

    /// The outcome delivered to subscribers
    pub response: Result<Response, DriverError>,
}

#[allow(dead_code)] // only used through `serde(with)`
#[derive(Serialize, Deserialize)]
#[serde(remote = "RequestInput", tag = "kind", content = "value", rename_all = "snake_case")]
enum TaggedInput {
    Url(String),
    Options(RequestOptions),
    Json(Value),
}

impl HistoryEntry {
    /// Create an entry
    #[must_use]
    pub const fn new(
        time: DateTime<Utc>,
        request: RequestInput,
        options: RequestOptions,
        response: Result<Response, DriverError>,
    ) -> Self {
        Self {
            time,
            request,
            options,
            response,
        }
    }
}
