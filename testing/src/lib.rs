//! # Composable HTTP Testing
//!
//! Testing utilities for the composable HTTP driver.
//!
//! This crate provides:
//! - [`MockTransport`]: scripted routes, recorded calls, cancellation tracking
//! - [`VirtualScheduler`]: manually advanced clock for deterministic history replay
//! - [`FixedClock`]: deterministic timestamps
//! - Property-based strategies for scope tokens and request options
//!
//! ## Example
//!
//! ```ignore
//! use composable_http_runtime::{DriverConfig, HttpDriver};
//! use composable_http_testing::MockTransport;
//!
//! #[tokio::test]
//! async fn hello() {
//!     let transport = MockTransport::pet_store();
//!     let source = HttpDriver::new(DriverConfig::default(), transport.clone())
//!         .run(futures::stream::iter(["http://localhost/hello"]));
//!
//!     let stream = source.subscribe().next().await.unwrap();
//!     assert_eq!(stream.outcome().await.unwrap().text, "Hello World");
//!     assert_eq!(transport.call_count(), 1);
//! }
//! ```

use chrono::{DateTime, Utc};
use composable_http_core::environment::Clock;

/// Scripted [`Transport`](composable_http_core::Transport) implementation
pub mod transport;

/// Virtual-time [`Scheduler`](composable_http_core::environment::Scheduler)
pub mod scheduler;

/// Mock implementations of environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use composable_http_testing::mocks::FixedClock;
    /// use composable_http_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Instant every test clock starts at: 2025-01-01 00:00:00 UTC
    #[must_use]
    pub fn test_epoch() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_epoch())
    }
}

/// Test helpers and utilities
pub mod helpers {
    use std::sync::Once;

    static TRACING: Once = Once::new();

    /// Install a `tracing` subscriber that writes to the test harness.
    ///
    /// Honors `RUST_LOG`; defaults to `debug` for the driver crates. Safe to
    /// call from every test.
    pub fn init_tracing() {
        TRACING.call_once(|| {
            let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("composable_http_runtime=debug,composable_http_testing=debug")
            });
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_test_writer()
                .try_init();
        });
    }
}

/// Property-based testing utilities
pub mod properties {
    use composable_http_core::{Method, RequestOptions};
    use proptest::prelude::*;

    /// A single scope token
    pub fn scope() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_-]{0,7}"
    }

    /// An ordered list of up to `max` scope tokens
    pub fn namespace(max: usize) -> impl Strategy<Value = Vec<String>> {
        proptest::collection::vec(scope(), 0..=max)
    }

    /// Any HTTP method
    pub fn method() -> impl Strategy<Value = Method> {
        prop_oneof![
            Just(Method::Get),
            Just(Method::Post),
            Just(Method::Put),
            Just(Method::Patch),
            Just(Method::Delete),
            Just(Method::Head),
            Just(Method::Options),
        ]
    }

    /// Request options with a relative URL, a method and a namespace
    pub fn request_options() -> impl Strategy<Value = RequestOptions> {
        ("/[a-z]{1,8}", method(), namespace(3)).prop_map(|(url, method, namespace)| {
            let mut options = RequestOptions::new(url).method(method);
            for scope in namespace {
                options.push_scope(scope);
            }
            options
        })
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, test_clock, test_epoch};
pub use scheduler::VirtualScheduler;
pub use transport::{Handler, MockTransport};
