//! Integration tests for request scoping across one shared driver

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use composable_http_core::{DriverError, RequestInput, RequestOptions};
use composable_http_runtime::isolation::{isolate_sink, isolate_source};
use composable_http_runtime::{DriverConfig, HttpDriver, HttpSource, ResponseStream};
use composable_http_testing::MockTransport;
use futures::channel::mpsc;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use serde_json::json;
use std::time::Duration;

fn start() -> (mpsc::UnboundedSender<RequestInput>, HttpSource) {
    let (requests, request_stream) = mpsc::unbounded();
    let source = HttpDriver::new(
        DriverConfig::default().with_prefix("http://localhost:5000"),
        MockTransport::pet_store(),
    )
    .run(request_stream);
    (requests, source)
}

async fn forward(requests: &mpsc::UnboundedSender<RequestInput>, tagged: impl futures::Stream<Item = RequestInput>) {
    let mut tagged = std::pin::pin!(tagged);
    while let Some(request) = tagged.next().await {
        requests.unbounded_send(request).unwrap();
    }
}

async fn next_stream(responses: &mut BoxStream<'static, ResponseStream>) -> ResponseStream {
    tokio::time::timeout(Duration::from_secs(1), responses.next())
        .await
        .expect("timed out waiting for a response stream")
        .expect("source ended")
}

async fn assert_quiet(responses: &mut BoxStream<'static, ResponseStream>) {
    let next = tokio::time::timeout(Duration::from_millis(50), responses.next()).await;
    assert!(next.is_err(), "expected no more response streams");
}

#[tokio::test]
async fn scoped_source_hides_responses_from_outside_the_scope() {
    let (requests, source) = start();
    let scoped = source.isolate_source("foo");
    let mut scoped_responses = scoped.subscribe();
    let mut all_responses = source.subscribe();

    requests.unbounded_send("/json".into()).unwrap();
    forward(&requests, source.isolate_sink(stream::iter(["/hello"]), "foo")).await;

    let stream = next_stream(&mut scoped_responses).await;
    assert_eq!(stream.request().url, "/hello");
    assert_eq!(stream.request().namespace(), ["foo".to_string()]);
    assert_eq!(stream.outcome().await.unwrap().text, "Hello World");
    assert_quiet(&mut scoped_responses).await;

    // The unscoped source sees everything.
    assert_eq!(next_stream(&mut all_responses).await.request().url, "/json");
    assert_eq!(next_stream(&mut all_responses).await.request().url, "/hello");
}

#[tokio::test]
async fn scoped_sources_keep_every_operation() {
    let (requests, source) = start();
    let scoped = isolate_source(&source, "foo");

    let nested = scoped.isolate_source("bar");
    assert_eq!(nested.scopes(), ["foo".to_string(), "bar".to_string()]);

    let mut nested_responses = nested.subscribe();
    let tagged = nested.isolate_sink(scoped.isolate_sink(stream::iter(["/hello"]), "bar"), "foo");
    forward(&requests, tagged).await;

    let stream = next_stream(&mut nested_responses).await;
    assert_eq!(stream.request().namespace(), ["bar".to_string(), "foo".to_string()]);
    assert!(stream.outcome().await.is_ok());
    assert!(!scoped.history().is_empty());
}

#[tokio::test]
async fn nested_scopes_are_visible_in_each_scope() {
    let (requests, source) = start();
    let mut a = source.isolate_source("a").subscribe();
    let mut b = source.isolate_source("b").subscribe();
    let mut a_b = source.isolate_source("a").isolate_source("b").subscribe();
    let mut c = source.isolate_source("c").subscribe();

    let inner = isolate_sink(stream::iter([RequestOptions::new("/hello")]), "b");
    forward(&requests, isolate_sink(inner, "a")).await;

    for responses in [&mut a, &mut b, &mut a_b] {
        let stream = next_stream(responses).await;
        assert_eq!(stream.request().namespace(), ["b".to_string(), "a".to_string()]);
    }
    assert_quiet(&mut c).await;
}

#[tokio::test]
async fn sibling_scopes_partition_traffic() {
    let (requests, source) = start();
    let mut left = source.isolate_source("left").subscribe();
    let mut right = source.isolate_source("right").subscribe();

    forward(&requests, isolate_sink(stream::iter(["/hello"]), "left")).await;
    forward(&requests, isolate_sink(stream::iter(["/json"]), "right")).await;

    assert_eq!(next_stream(&mut left).await.request().url, "/hello");
    assert_eq!(next_stream(&mut right).await.request().url, "/json");
    assert_quiet(&mut left).await;
    assert_quiet(&mut right).await;
}

#[tokio::test]
async fn dynamic_records_are_scoped() {
    let (requests, source) = start();
    let mut scoped = source.isolate_source("foo").subscribe();

    let records = stream::iter([
        json!({"url": "/hello", "_namespace": ["outer"]}),
        json!(42),
    ]);
    forward(&requests, isolate_sink(records, "foo")).await;

    let hello = next_stream(&mut scoped).await;
    assert_eq!(hello.request().namespace(), ["outer".to_string(), "foo".to_string()]);
    assert_eq!(hello.outcome().await.unwrap().text, "Hello World");

    // A bare number cannot carry a scope, so no scoped source sees its failure.
    assert_quiet(&mut scoped).await;
}

#[tokio::test]
async fn malformed_scoped_records_fail_inside_their_scope() {
    let (requests, source) = start();
    let mut scoped = source.isolate_source("foo").subscribe();

    forward(&requests, isolate_sink(stream::iter([json!({"url": "/hello", "method": "brew"})]), "foo")).await;

    let stream = next_stream(&mut scoped).await;
    assert!(stream.request().in_scope("foo"));
    assert!(matches!(
        stream.outcome().await,
        Err(DriverError::InvalidRequestShape(_))
    ));
}
