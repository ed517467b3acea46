//! # Composable HTTP Core
//!
//! Core types and collaborator traits for the composable HTTP driver.
//!
//! The driver turns a stream of request descriptors into a stream of response
//! streams. This crate holds everything that is independent of how that
//! transformation is executed:
//!
//! - **Request model**: [`RequestOptions`], [`RequestInput`], [`Method`], [`Attachment`]
//! - **Request Normalizer**: [`normalize`] resolves raw input into canonical options
//! - **Outcomes**: [`Response`] and the [`DriverError`] taxonomy
//! - **History**: [`HistoryEntry`], one recorded (request, response, time) triple
//! - **Collaborators**: the [`Transport`] that issues network calls, and the
//!   [`Clock`](environment::Clock) / [`Scheduler`](environment::Scheduler) pair
//!   used to timestamp and replay history
//!
//! ## Architecture Principles
//!
//! - Unidirectional data flow: requests in, response streams out
//! - Explicit collaborators injected by the host (no hidden I/O)
//! - One request, at most one network call (unless replayed)
//!
//! ## Example
//!
//! ```
//! use composable_http_core::{normalize, Method, RequestInput, RequestOptions};
//! use serde_json::json;
//!
//! let options = RequestOptions::post("/pet").send(json!({"name": "Woof"}));
//! let normalized = normalize(RequestInput::from(options)).unwrap();
//! assert_eq!(normalized.method, Method::Post);
//!
//! let from_url = normalize(RequestInput::from("http://localhost/hello")).unwrap();
//! assert_eq!(from_url.url, "http://localhost/hello");
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use tokio_util::sync::CancellationToken;

/// Error taxonomy shared by every component of the driver
pub mod error;

/// Recorded request/response pairs
pub mod history;

/// Request Normalizer
pub mod normalize;

/// Canonical request descriptors
pub mod request;

/// Transport-agnostic response values
pub mod response;

/// Boundary with the network transport collaborator
pub mod transport;

mod pairs;

pub use error::{DriverError, TransportError};
pub use history::HistoryEntry;
pub use normalize::normalize;
pub use request::{Attachment, Method, ParseMethodError, RequestInput, RequestOptions};
pub use response::Response;
pub use transport::{Transport, TransportCall};

/// Outcome of one request: a response, or the failure that replaced it.
pub type Outcome = Result<Response, DriverError>;

/// Environment module - Time collaborators
///
/// Timestamps for the history log come from a [`Clock`](environment::Clock);
/// replaying history needs a [`Scheduler`](environment::Scheduler) that can run
/// a task at an absolute instant. Both are injected so tests can substitute a
/// virtual clock.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```
    /// use composable_http_core::environment::{Clock, SystemClock};
    ///
    /// let clock = SystemClock;
    /// let earlier = clock.now();
    /// assert!(clock.now() >= earlier);
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time from the operating system
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }

    /// A unit of work handed to a [`Scheduler`]
    pub type ScheduledTask = Box<dyn FnOnce() + Send + 'static>;

    /// Scheduler trait - runs tasks at absolute instants
    ///
    /// The scheduler's own notion of "now" is exposed through [`Clock`], so a
    /// virtual scheduler can drive both the timestamps it reports and the order
    /// in which scheduled tasks fire.
    ///
    /// Tasks scheduled for the same instant run in the order they were scheduled.
    /// Tasks scheduled in the past run as soon as the scheduler next gets a
    /// chance to run anything.
    pub trait Scheduler: Clock {
        /// Schedule `task` to run at `at`
        fn schedule_at(&self, at: DateTime<Utc>, task: ScheduledTask);
    }
}
