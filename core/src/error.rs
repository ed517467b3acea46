//! Error types for the HTTP driver.
//!
//! Every failure is local to the response stream it belongs to: it is delivered
//! as that stream's single item and never terminates the outer stream of
//! response streams.

use crate::response::Response;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure outcome of one request.
///
/// `Clone` so that one outcome can be delivered to every subscriber of a
/// shared response stream and recorded in the history log.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DriverError {
    /// The request stream emitted something that is neither a URL string nor
    /// a request-options record
    #[error(
        "Requests given to the HTTP driver must be either URL strings or request-options records: {0}"
    )]
    InvalidRequestShape(String),

    /// The request options carry no `url`
    #[error("Please provide a `url` property in the request options")]
    MissingUrl,

    /// The transport could not complete the exchange
    #[error("Network failure: {0}")]
    Network(String),

    /// The server answered with a status of 400 or above
    #[error("{message}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
        /// Reason phrase reported by the transport
        message: String,
        /// The full response, for inspection
        response: Box<Response>,
    },

    /// The exchange was aborted before it produced an outcome
    #[error("Request was cancelled before completing")]
    Cancelled,
}

impl DriverError {
    /// Build an [`HttpStatus`](Self::HttpStatus) failure from an error response
    #[must_use]
    pub fn from_status(response: Response) -> Self {
        Self::HttpStatus {
            status: response.status,
            message: response.status_text.clone(),
            response: Box::new(response),
        }
    }

    /// HTTP status carried by the failure, if any
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The error response carried by the failure, if any
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::HttpStatus { response, .. } => Some(response.as_ref()),
            _ => None,
        }
    }
}

/// Failure reported by a [`Transport`](crate::Transport).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Connection refused, DNS failure, timeout, unreadable body...
    #[error("Network failure: {0}")]
    Network(String),

    /// The cancellation token fired before the exchange completed
    #[error("Request aborted")]
    Aborted,
}

impl From<TransportError> for DriverError {
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Network(message) => Self::Network(message),
            TransportError::Aborted => Self::Cancelled,
        }
    }
}
