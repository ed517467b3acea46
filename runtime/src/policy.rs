//! Execution Policy.
//!
//! Decides, per request, whether its response stream starts right away or
//! waits for a subscriber, and fills in driver-level defaults before the
//! request's options are frozen into the stream's tag.

use crate::response_stream::ResponseStream;
use crate::DriverConfig;
use composable_http_core::{CancellationToken, Outcome, RequestOptions};
use std::future::Future;
use std::sync::Arc;

/// Driver-level execution defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionPolicy {
    eager: bool,
    prefix: Option<String>,
}

impl ExecutionPolicy {
    /// Create a policy from explicit defaults
    #[must_use]
    pub const fn new(eager: bool, prefix: Option<String>) -> Self {
        Self { eager, prefix }
    }

    /// Create a policy from a driver configuration
    #[must_use]
    pub fn from_config(config: &DriverConfig) -> Self {
        Self::new(config.eager, config.prefix.clone())
    }

    /// Whether `options` should execute eagerly.
    ///
    /// The request's own `eager` flag wins over the driver default.
    #[must_use]
    pub fn is_eager(&self, options: &RequestOptions) -> bool {
        options.eager.unwrap_or(self.eager)
    }

    /// Apply driver defaults and freeze the options.
    ///
    /// A request-level prefix wins over the driver-level one.
    #[must_use]
    pub fn resolve(&self, mut options: RequestOptions) -> Arc<RequestOptions> {
        if options.prefix.is_none() {
            options.prefix.clone_from(&self.prefix);
        }
        Arc::new(options)
    }

    /// Wrap `execute` in a response stream tagged with `request`, started
    /// according to the policy.
    pub fn response_stream<F, Fut>(&self, request: Arc<RequestOptions>, execute: F) -> ResponseStream
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Outcome> + Send + 'static,
    {
        if self.is_eager(&request) {
            tracing::debug!(url = %request.url, "Starting request eagerly");
            ResponseStream::eager(request, execute)
        } else {
            ResponseStream::lazy(request, execute)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_flag_overrides_driver_default() {
        let lazy = ExecutionPolicy::new(false, None);
        let eager = ExecutionPolicy::new(true, None);

        assert!(!lazy.is_eager(&RequestOptions::new("/a")));
        assert!(lazy.is_eager(&RequestOptions::new("/a").eager(true)));
        assert!(eager.is_eager(&RequestOptions::new("/a")));
        assert!(!eager.is_eager(&RequestOptions::new("/a").eager(false)));
    }

    #[test]
    fn driver_prefix_fills_in_missing_prefix() {
        let policy = ExecutionPolicy::new(false, Some("http://x".to_string()));

        let defaulted = policy.resolve(RequestOptions::new("/pet"));
        assert_eq!(defaulted.prefix.as_deref(), Some("http://x"));

        let overridden = policy.resolve(RequestOptions::new("/pet").prefix("http://y"));
        assert_eq!(overridden.prefix.as_deref(), Some("http://y"));
    }

    #[test]
    fn no_prefix_without_defaults() {
        let policy = ExecutionPolicy::default();
        assert!(policy.resolve(RequestOptions::new("/pet")).prefix.is_none());
    }
}
