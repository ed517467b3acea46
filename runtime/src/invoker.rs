//! Transport Invoker.
//!
//! Turns canonical request options into one [`TransportCall`], issues it on the
//! injected [`Transport`], and classifies the result: statuses of 400 and above
//! become [`DriverError::HttpStatus`] failures carrying the full response.

use composable_http_core::transport::DEFAULT_CONTENT_TYPE;
use composable_http_core::{
    CancellationToken, DriverError, RequestOptions, Response, Transport, TransportCall,
};

/// Whether `url` starts with a `scheme://` component.
///
/// A scheme is an ASCII letter followed by letters, digits, `+`, `-` or `.`.
///
/// # Examples
///
/// ```
/// use composable_http_runtime::invoker::has_scheme;
///
/// assert!(has_scheme("http://localhost/pet"));
/// assert!(has_scheme("git+ssh://host/repo"));
/// assert!(!has_scheme("/pet"));
/// assert!(!has_scheme("/redirect?to=http://elsewhere"));
/// ```
#[must_use]
pub fn has_scheme(url: &str) -> bool {
    let Some((scheme, _)) = url.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Resolve the URL a request is actually sent to.
///
/// The prefix is prepended only when it is non-empty and `url` has no scheme of
/// its own.
#[must_use]
pub fn effective_url(options: &RequestOptions) -> String {
    match options.prefix.as_deref() {
        Some(prefix) if !prefix.is_empty() && !has_scheme(&options.url) => {
            format!("{prefix}{}", options.url)
        }
        _ => options.url.clone(),
    }
}

/// Assemble the transport call for `options`.
///
/// Headers, query parameters and fields keep their insertion order.
/// Attachments are applied in **reverse** input order; existing consumers of
/// the multipart wire format depend on that ordering.
///
/// # Errors
///
/// Returns [`DriverError::MissingUrl`] if `options.url` is empty.
pub fn build_call(options: &RequestOptions) -> Result<TransportCall, DriverError> {
    if options.url.is_empty() {
        return Err(DriverError::MissingUrl);
    }

    let credentials = match (&options.user, &options.password) {
        (Some(user), Some(password)) => Some((user.clone(), password.clone())),
        _ => None,
    };

    Ok(TransportCall {
        method: options.method,
        url: effective_url(options),
        redirects: options.redirects,
        content_type: options
            .content_type
            .clone()
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string()),
        accept: options.accept.clone(),
        body: options.send.clone(),
        query: options.query.clone(),
        credentials,
        with_credentials: options.with_credentials,
        headers: options.headers.clone(),
        fields: options.fields.clone(),
        attachments: options.attachments.iter().rev().cloned().collect(),
    })
}

/// Issue exactly one call for `options` and classify its outcome.
///
/// Precondition failures are returned without touching the transport.
///
/// # Errors
///
/// - [`DriverError::MissingUrl`] if the options carry no URL
/// - [`DriverError::Network`] if the transport failed
/// - [`DriverError::HttpStatus`] if the server answered with a status ≥ 400
/// - [`DriverError::Cancelled`] if the transport reported an abort
#[tracing::instrument(skip_all, fields(method = %options.method, url = %options.url))]
pub async fn invoke<T: Transport>(
    transport: &T,
    options: &RequestOptions,
    cancel: CancellationToken,
) -> Result<Response, DriverError> {
    let call = build_call(options)?;

    tracing::debug!(target_url = %call.url, "Issuing HTTP request");
    metrics::counter!("http_driver.requests.issued", "method" => call.method.as_str())
        .increment(1);

    let response = transport.issue(call, cancel).await?;

    if response.is_error() {
        tracing::debug!(status = response.status, "Request failed with error status");
        return Err(DriverError::from_status(response));
    }

    tracing::debug!(status = response.status, "Request completed");
    Ok(response)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use composable_http_core::{Attachment, Method, RequestOptions};
    use serde_json::json;

    #[test]
    fn prefix_applies_to_relative_urls() {
        let options = RequestOptions::post("/pet").prefix("http://localhost:5000");
        assert_eq!(effective_url(&options), "http://localhost:5000/pet");
    }

    #[test]
    fn prefix_is_ignored_when_url_has_scheme() {
        let options = RequestOptions::new("http://x/pet").prefix("unused");
        assert_eq!(effective_url(&options), "http://x/pet");
    }

    #[test]
    fn empty_prefix_is_ignored() {
        let options = RequestOptions::new("/pet").prefix("");
        assert_eq!(effective_url(&options), "/pet");
    }

    #[test]
    fn missing_url_is_rejected() {
        let options = RequestOptions::default().method(Method::Post);
        assert_eq!(build_call(&options), Err(DriverError::MissingUrl));
    }

    #[test]
    fn call_carries_defaults() {
        let call = build_call(&RequestOptions::new("http://x/hello")).unwrap();
        assert_eq!(call.method, Method::Get);
        assert_eq!(call.redirects, 5);
        assert_eq!(call.content_type, "json");
        assert!(call.credentials.is_none());
        assert!(!call.is_multipart());
    }

    #[test]
    fn call_carries_every_option() {
        let options = RequestOptions::put("http://x/pet")
            .send(json!({"name": "Woof"}))
            .query("foo", 102030)
            .header("X-B", "2")
            .header("X-A", "1")
            .accept("json")
            .content_type("form")
            .auth("user", "secret")
            .with_credentials(true)
            .redirects(2)
            .field("kind", "dog");

        let call = build_call(&options).unwrap();
        assert_eq!(call.method, Method::Put);
        assert_eq!(call.body, Some(json!({"name": "Woof"})));
        assert_eq!(call.query, vec![("foo".to_string(), "102030".to_string())]);
        assert_eq!(call.headers[0].0, "X-B");
        assert_eq!(call.headers[1].0, "X-A");
        assert_eq!(call.accept.as_deref(), Some("json"));
        assert_eq!(call.content_type, "form");
        assert_eq!(call.credentials, Some(("user".to_string(), "secret".to_string())));
        assert!(call.with_credentials);
        assert_eq!(call.redirects, 2);
        assert!(call.is_multipart());
    }

    #[test]
    fn credentials_need_both_halves() {
        let mut options = RequestOptions::new("http://x/a");
        options.user = Some("user".to_string());
        assert!(build_call(&options).unwrap().credentials.is_none());
    }

    #[test]
    fn attachments_are_applied_in_reverse_order() {
        let options = RequestOptions::post("http://x/upload")
            .attach(Attachment::new("first", "/tmp/1.txt"))
            .attach(Attachment::new("second", "/tmp/2.txt"))
            .attach(Attachment::new("third", "/tmp/3.txt").with_filename("three.txt"));

        let call = build_call(&options).unwrap();
        let names: Vec<_> = call.attachments.iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, ["third", "second", "first"]);
        assert_eq!(call.attachments[0].filename.as_deref(), Some("three.txt"));
    }
}
