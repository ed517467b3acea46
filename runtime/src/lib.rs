//! # Composable HTTP Runtime
//!
//! Stream runtime for the composable HTTP driver.
//!
//! [`HttpDriver::run`] consumes a stream of request descriptors and returns an
//! [`HttpSource`]: a multicast stream of [`ResponseStream`]s, one per request,
//! each tagged with the options that produced it.
//!
//! ## Core Components
//!
//! - **Transport Invoker** ([`invoker`]): turns canonical options into one transport call
//! - **Response-Stream Factory** ([`response_stream`]): shared, cancellable, single-outcome streams
//! - **Execution Policy** ([`policy`]): eager vs lazy start, driver-level defaults
//! - **History Log** ([`history`]): append-only ledger, virtual-time replay, suppression
//! - **Isolation Layer** ([`isolation`]): scope tokens on requests, scoped views of responses
//! - **Driver** ([`driver`]): wires the above into the request → response-stream pipeline
//!
//! ## Example
//!
//! ```ignore
//! use composable_http_runtime::{DriverConfig, HttpDriver};
//! use composable_http_reqwest::ReqwestTransport;
//! use futures::StreamExt;
//!
//! let driver = HttpDriver::new(
//!     DriverConfig::default().with_prefix("http://localhost:8080"),
//!     ReqwestTransport::new(),
//! );
//! let source = driver.run(futures::stream::iter(["/hello"]));
//!
//! let mut responses = source.subscribe();
//! let stream = responses.next().await.unwrap();
//! let response = stream.outcome().await?;
//! assert_eq!(response.text, "Hello World");
//! ```

use std::env;

/// Driver Entry Point
pub mod driver;

/// Append-only exchange ledger and history replay
pub mod history;

/// Request scoping for composed components
pub mod isolation;

/// Transport Invoker
pub mod invoker;

/// Eager vs lazy execution and driver-level defaults
pub mod policy;

/// Shared single-outcome response streams
pub mod response_stream;

/// Real-time scheduler for history replay
pub mod scheduler;

/// The driver's multicast output
pub mod source;

pub use driver::HttpDriver;
pub use history::{HistoryLog, ReplayGate};
pub use policy::ExecutionPolicy;
pub use response_stream::{ResponseStream, Subscription};
pub use scheduler::TokioScheduler;
pub use source::HttpSource;

/// Environment variable enabling eager execution by default
pub const EAGER_ENV: &str = "HTTP_DRIVER_EAGER";

/// Environment variable holding the driver-level URL prefix
pub const PREFIX_ENV: &str = "HTTP_DRIVER_PREFIX";

/// Configuration for [`HttpDriver`] instances
///
/// # Example
///
/// ```
/// use composable_http_runtime::DriverConfig;
///
/// let config = DriverConfig::default()
///     .with_eager(true)
///     .with_prefix("http://localhost:8080");
///
/// assert!(config.eager);
/// assert_eq!(config.prefix.as_deref(), Some("http://localhost:8080"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Start requests without waiting for a subscriber, unless the request says otherwise
    pub eager: bool,
    /// Prefix joined to scheme-less URLs, unless the request names its own
    pub prefix: Option<String>,
}

impl DriverConfig {
    /// Create a new configuration with custom values
    #[must_use]
    pub const fn new(eager: bool, prefix: Option<String>) -> Self {
        Self { eager, prefix }
    }

    /// Set the default execution mode
    #[must_use]
    pub const fn with_eager(mut self, eager: bool) -> Self {
        self.eager = eager;
        self
    }

    /// Set the driver-level URL prefix
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Read the configuration from the process environment.
    ///
    /// - `HTTP_DRIVER_EAGER`: `1`, `true` or `yes` (any case) enables eager
    ///   execution; `0`, `false`, `no` or unset keeps it off. Other values are
    ///   ignored with a warning.
    /// - `HTTP_DRIVER_PREFIX`: driver-level prefix, ignored when empty.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(EAGER_ENV) {
            match parse_flag(&raw) {
                Some(eager) => config.eager = eager,
                None => tracing::warn!(
                    value = %raw,
                    "Ignoring invalid {} value, expected true or false",
                    EAGER_ENV
                ),
            }
        }

        if let Some(prefix) = lookup(PREFIX_ENV).filter(|prefix| !prefix.is_empty()) {
            config.prefix = Some(prefix);
        }

        config
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::new(false, None)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" | "" => Some(false),
        _ => None,
    }
}
