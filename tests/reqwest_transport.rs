//! Integration tests of the default transport, using wiremock to simulate HTTP servers.
//!
//! The caller is blocking, so every call runs on `spawn_blocking`.

mod common;

use common::gzip;
use std::time::Duration;
use webcaller::{Attachment, CallSpec, Caller, Error, ReusePolicy};
use wiremock::matchers::{body_string, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const POST_1: &str = r#"{"userId":1,"id":1,"title":"t","body":"b"}"#;

async fn blocking<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    tokio::task::spawn_blocking(f).await.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_successful_get_request() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/posts/1"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("x-request-id", "abc")
                .set_body_string(POST_1),
        )
        .mount(&mock_server)
        .await;

    let uri = mock_server.uri();
    let (status, request_id, body) = blocking(move || {
        let caller = Caller::builder().base_url(uri).unwrap().build().unwrap();
        let response = caller.get("/posts/1").unwrap();
        let request_id = response.header("x-request-id").map(str::to_owned);
        (response.status.as_u16(), request_id, response.text().unwrap())
    })
    .await;

    assert_eq!(status, 200);
    assert_eq!(request_id.as_deref(), Some("abc"));
    assert_eq!(body, POST_1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_gzip_negotiation_and_decoding() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/posts/1"))
        .and(header("accept-encoding", "gzip"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-encoding", "gzip")
                .set_body_bytes(gzip(POST_1.as_bytes())),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let uri = mock_server.uri();
    let body = blocking(move || {
        let caller = Caller::builder()
            .base_url(uri)
            .unwrap()
            .accept_gzip(true)
            .build()
            .unwrap();
        caller.get("/posts/1").unwrap().text().unwrap()
    })
    .await;

    assert_eq!(body, POST_1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_http_error_4xx() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_string("nothing here"))
        .mount(&mock_server)
        .await;

    let uri = mock_server.uri();
    let result = blocking(move || {
        let caller = Caller::builder().base_url(uri).unwrap().build().unwrap();
        caller.get("/missing").map(|r| r.status)
    })
    .await;

    match result {
        Err(Error::Status {
            status, message, ..
        }) => {
            assert_eq!(status.as_u16(), 404);
            assert_eq!(message, "Not Found");
        }
        other => panic!("Expected Status error, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_form_body() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/login"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string("user=alice&lang=en+US"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&mock_server)
        .await;

    let uri = mock_server.uri();
    let status = blocking(move || {
        let caller = Caller::builder().base_url(uri).unwrap().build().unwrap();
        let spec = CallSpec::post("/login")
            .with_form_param("user", "alice")
            .with_form_param("lang", "en US");
        caller.run(&spec).unwrap().status
    })
    .await;

    assert_eq!(status.as_u16(), 204);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_multipart_upload() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/upload"))
        .and(body_string_contains("filename=\"report.csv\""))
        .and(body_string_contains("name=\"title\""))
        .and(body_string_contains("a,b\n1,2\n"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&mock_server)
        .await;

    let uri = mock_server.uri();
    let status = blocking(move || {
        let caller = Caller::builder().base_url(uri).unwrap().build().unwrap();
        let spec = CallSpec::put("/upload")
            .with_form_param("title", "Q3")
            .with_attachment(Attachment::new("file", "report.csv", "text/csv", "a,b\n1,2\n"));
        caller.run(&spec).unwrap().status
    })
    .await;

    assert_eq!(status.as_u16(), 201);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_reused_client_serves_several_calls() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/ping"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .expect(3)
        .mount(&mock_server)
        .await;

    let uri = mock_server.uri();
    let builds = blocking(move || {
        let caller = Caller::builder()
            .base_url(uri)
            .unwrap()
            .reuse_policy(ReusePolicy::Reused)
            .build()
            .unwrap();
        for _ in 0..3 {
            assert_eq!(caller.get("/ping").unwrap().text().unwrap(), "pong");
        }
        caller.lifecycle().builds()
    })
    .await;

    assert_eq!(builds, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timeout_is_a_transport_error() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&mock_server)
        .await;

    let uri = mock_server.uri();
    let result = blocking(move || {
        let caller = Caller::builder()
            .base_url(uri)
            .unwrap()
            .read_timeout(Duration::from_millis(150))
            .write_timeout(Duration::from_millis(150))
            .build()
            .unwrap();
        caller.get("/slow").map(|r| r.status)
    })
    .await;

    assert!(matches!(result, Err(Error::Transport { .. })));
}
