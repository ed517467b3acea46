//! Integration tests for `ReqwestTransport` against an in-process server
//! serving the pet-store routes.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use composable_http_core::{
    Attachment, CancellationToken, DriverError, Method, RequestOptions, Transport, TransportCall,
    TransportError,
};
use composable_http_reqwest::ReqwestTransport;
use composable_http_runtime::{DriverConfig, HttpDriver};
use futures::StreamExt;
use serde_json::{Map, Value, json};
use std::io::Write;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

struct AddPet;

impl Respond for AddPet {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let pet: Value = request.body_json().unwrap_or_default();
        let field = |name: &str| pet[name].as_str().unwrap_or_default().to_string();
        ResponseTemplate::new(200)
            .set_body_string(format!("added {} the {}", field("name"), field("species")))
    }
}

struct EchoQuery;

impl Respond for EchoQuery {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let query: Map<String, Value> = request
            .url
            .query_pairs()
            .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
            .collect();
        ResponseTemplate::new(200).set_body_json(Value::Object(query))
    }
}

async fn pet_store() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/hello"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Hello World"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/pet"))
        .respond_with(AddPet)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/querystring"))
        .and(query_param("bar", "Pub"))
        .respond_with(EchoQuery)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/delete"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"deleted": true})))
        .mount(&server)
        .await;
    Mock::given(path("/error"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"pets": ["Woof", "Meow"]})))
        .mount(&server)
        .await;

    server
}

fn call(method: Method, server: &MockServer, route: &str) -> TransportCall {
    TransportCall::new(method, format!("{}{route}", server.uri()))
}

#[tokio::test]
async fn hello_returns_text() {
    let server = pet_store().await;
    let response = tokio_test::assert_ok!(
        ReqwestTransport::new()
            .issue(call(Method::Get, &server, "/hello"), CancellationToken::new())
            .await
    );

    assert_eq!(response.status, 200);
    assert_eq!(response.status_text, "OK");
    assert_eq!(response.text, "Hello World");
}

#[tokio::test]
async fn post_sends_json_body() {
    let server = pet_store().await;
    let mut pet = call(Method::Post, &server, "/pet");
    pet.body = Some(json!({"name": "Woof", "species": "Dog"}));

    let response = ReqwestTransport::new()
        .issue(pet, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.text, "added Woof the Dog");
}

#[tokio::test]
async fn query_is_sent_and_json_body_parsed() {
    let server = pet_store().await;
    let mut query = call(Method::Get, &server, "/querystring");
    query.query = vec![
        ("foo".to_string(), "102030".to_string()),
        ("bar".to_string(), "Pub".to_string()),
    ];

    let response = ReqwestTransport::new()
        .issue(query, CancellationToken::new())
        .await
        .unwrap();
    let body = response.body.unwrap();
    assert_eq!(body["foo"], "102030");
    assert_eq!(body["bar"], "Pub");
}

#[tokio::test]
async fn server_errors_are_answers_not_failures() {
    let server = pet_store().await;
    let response = ReqwestTransport::new()
        .issue(call(Method::Get, &server, "/error"), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.status, 500);
    assert_eq!(response.status_text, "Internal Server Error");
    assert_eq!(response.text, "boom");
}

#[tokio::test]
async fn connection_failures_are_network_errors() {
    let result = ReqwestTransport::new()
        .issue(
            TransportCall::new(Method::Get, "http://127.0.0.1:1/hello"),
            CancellationToken::new(),
        )
        .await;
    assert!(matches!(result, Err(TransportError::Network(_))));
}

#[tokio::test]
async fn headers_accept_and_credentials_are_sent() {
    let server = MockServer::start().await;
    Mock::given(path("/secure"))
        .and(header("x-trace", "abc"))
        .and(header("accept", "application/json"))
        .and(header("authorization", "Basic dXNlcjpzZWNyZXQ="))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let mut secure = call(Method::Get, &server, "/secure");
    secure.headers = vec![("x-trace".to_string(), "abc".to_string())];
    secure.accept = Some("json".to_string());
    secure.credentials = Some(("user".to_string(), "secret".to_string()));

    let response = ReqwestTransport::new()
        .issue(secure, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.status, 204);
}

#[tokio::test]
async fn form_bodies_are_urlencoded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/login"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut login = call(Method::Post, &server, "/login");
    login.content_type = "form".to_string();
    login.body = Some(json!({"user": "woof", "remember": true}));

    let response = ReqwestTransport::new()
        .issue(login, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.status, 200);

    let received = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&received[0].body).into_owned();
    assert!(body.contains("user=woof"));
    assert!(body.contains("remember=true"));
}

#[tokio::test]
async fn multipart_sends_fields_and_files() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "pet photo bytes").unwrap();

    let mut upload = call(Method::Post, &server, "/upload");
    upload.fields = vec![("caption".to_string(), "Woof".to_string())];
    upload.attachments = vec![
        Attachment::new("photo", file.path().to_string_lossy()).with_filename("woof.jpg"),
    ];

    let response = ReqwestTransport::new()
        .issue(upload, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(response.status, 201);

    let received = server.received_requests().await.unwrap();
    let content_type = received[0].headers.get("content-type").unwrap().to_str().unwrap();
    assert!(content_type.starts_with("multipart/form-data"));
    let body = String::from_utf8_lossy(&received[0].body).into_owned();
    assert!(body.contains("name=\"caption\""));
    assert!(body.contains("filename=\"woof.jpg\""));
    assert!(body.contains("pet photo bytes"));
}

#[tokio::test]
async fn multipart_takes_precedence_over_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let mut upload = call(Method::Post, &server, "/upload");
    upload.fields = vec![("caption".to_string(), "Woof".to_string())];
    upload.body = Some(json!({"note": "left out"}));

    let response = tokio_test::assert_ok!(
        ReqwestTransport::new()
            .issue(upload, CancellationToken::new())
            .await
    );
    assert_eq!(response.status, 201);

    let received = server.received_requests().await.unwrap();
    let body = String::from_utf8_lossy(&received[0].body).into_owned();
    assert!(body.contains("name=\"caption\""));
    assert!(!body.contains("left out"));
}

#[tokio::test]
async fn missing_attachment_is_a_network_error() {
    let server = MockServer::start().await;
    let mut upload = call(Method::Post, &server, "/upload");
    upload.attachments = vec![Attachment::new("photo", "/definitely/not/here.jpg")];

    let result = ReqwestTransport::new()
        .issue(upload, CancellationToken::new())
        .await;
    assert!(matches!(result, Err(TransportError::Network(message)) if message.contains("here.jpg")));
}

#[tokio::test]
async fn redirect_limit_is_honored() {
    let server = pet_store().await;
    Mock::given(path("/old-hello"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/hello"))
        .mount(&server)
        .await;

    let transport = ReqwestTransport::new();

    let followed = transport
        .issue(call(Method::Get, &server, "/old-hello"), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(followed.text, "Hello World");

    let mut no_redirects = call(Method::Get, &server, "/old-hello");
    no_redirects.redirects = 0;
    let stopped = transport
        .issue(no_redirects, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(stopped.status, 302);
}

#[tokio::test]
async fn cancellation_aborts_in_flight_call() {
    let server = MockServer::start().await;
    Mock::given(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        ReqwestTransport::new().issue(call(Method::Get, &server, "/slow"), cancel),
    )
    .await
    .expect("cancellation should end the call promptly");
    assert_eq!(result, Err(TransportError::Aborted));
}

#[tokio::test]
async fn driver_runs_end_to_end_over_http() {
    let server = pet_store().await;
    let driver = HttpDriver::new(
        DriverConfig::default().with_prefix(server.uri()),
        ReqwestTransport::new(),
    );
    let source = driver.run(futures::stream::iter(vec![
        RequestOptions::new("/hello"),
        RequestOptions::delete("/delete"),
        RequestOptions::new("/error"),
    ]));
    let mut responses = source.subscribe();

    let hello = responses.next().await.unwrap();
    assert_eq!(hello.request().url, "/hello");
    assert_eq!(hello.outcome().await.unwrap().text, "Hello World");

    let deleted = responses.next().await.unwrap();
    assert_eq!(deleted.outcome().await.unwrap().body, Some(json!({"deleted": true})));

    let error = responses.next().await.unwrap().outcome().await.unwrap_err();
    assert_eq!(error.status(), Some(500));
    assert_eq!(error.to_string(), "Internal Server Error");
    assert_eq!(error.response().unwrap().text, "boom");
    assert!(matches!(error, DriverError::HttpStatus { .. }));

    assert_eq!(source.history().len(), 3);
}
