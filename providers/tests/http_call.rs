//! End-to-end behavior of `HttpCall` through the call adapters, against a mock server.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use callbridge_core::{
    BodyCallAdapter, Call, CallAdapter, CallAdapterFactory, CallError, CallErrorKind,
    ResponseCallAdapter,
};
use callbridge_http::{
    Converter, HttpClient, HttpConfig, JsonConverter, RetrySettings, StringConverter,
};
use serde::Deserialize;
use wiremock::matchers::{body_string, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn body_adapter() -> BodyCallAdapter {
    let ty = "CallFuture<String>".parse().unwrap();
    match CallAdapterFactory::new().get(&ty).unwrap() {
        Some(CallAdapter::Body(adapter)) => adapter,
        other => panic!("expected body adapter, got {other:?}"),
    }
}

fn response_adapter() -> ResponseCallAdapter {
    let ty = "CallFuture<Response<String>>".parse().unwrap();
    match CallAdapterFactory::new().get(&ty).unwrap() {
        Some(CallAdapter::Response(adapter)) => adapter,
        other => panic!("expected response adapter, got {other:?}"),
    }
}

fn client(server: &MockServer) -> HttpClient {
    let config = HttpConfig {
        base_url: Some(server.uri()),
        retry: RetrySettings {
            max_retries: 2,
            initial_delay_ms: 1,
            max_delay_ms: 10,
            jitter_factor: 0.0,
        },
        ..HttpConfig::default()
    };
    HttpClient::new(config).unwrap()
}

/// A client pointed at a port with nothing listening, never retrying.
fn unreachable_client() -> HttpClient {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let config = HttpConfig {
        base_url: Some(format!("http://127.0.0.1:{port}")),
        retry: RetrySettings {
            max_retries: 0,
            ..RetrySettings::default()
        },
        ..HttpConfig::default()
    };
    HttpClient::new(config).unwrap()
}

async fn mount(server: &MockServer, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(status).set_body_string(body))
        .mount(server)
        .await;
}

fn assert_connect_failure(err: &CallError) {
    assert_eq!(err.kind(), CallErrorKind::Transport);
    let source = err
        .transport_source()
        .and_then(|source| source.downcast_ref::<reqwest::Error>())
        .expect("reqwest error");
    assert!(source.is_connect());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn body_success_200() {
    let server = MockServer::start().await;
    mount(&server, 200, "Hi").await;
    let client = client(&server);

    let call = Arc::new(client.new_call(client.get("/"), StringConverter));
    assert_eq!(body_adapter().adapt(call).await.unwrap(), "Hi");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn body_success_404() {
    let server = MockServer::start().await;
    mount(&server, 404, "Hi").await;
    let client = client(&server);

    let call = Arc::new(client.new_call(client.get("/"), StringConverter));
    let future = body_adapter().adapt(call);
    let adapted_on = line!() - 1;
    let err = future.await.unwrap_err();
    assert_eq!(err.to_string(), "HTTP 404 Not Found");
    let http = err.as_http().expect("http error");
    assert_eq!(http.error_body().unwrap().text(), "Hi");
    let site = http.call_site().expect("call site");
    assert_eq!((site.file(), site.line()), (file!(), adapted_on));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn body_failure() {
    let client = unreachable_client();
    let call = Arc::new(client.new_call(client.get("/"), StringConverter));
    let err = body_adapter().adapt(call).await.unwrap_err();
    assert_connect_failure(&err);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn response_success_200() {
    let server = MockServer::start().await;
    mount(&server, 200, "Hi").await;
    let client = client(&server);

    let call = Arc::new(client.new_call(client.get("/"), StringConverter));
    let response = response_adapter().adapt(call).await.unwrap();
    assert!(response.is_successful());
    assert_eq!(response.status(), 200);
    assert_eq!(response.body().map(String::as_str), Some("Hi"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn response_success_404() {
    let server = MockServer::start().await;
    mount(&server, 404, "Hi").await;
    let client = client(&server);

    let call = Arc::new(client.new_call(client.get("/"), StringConverter));
    let response = response_adapter().adapt(call).await.unwrap();
    assert!(!response.is_successful());
    assert_eq!(response.status(), 404);
    assert_eq!(response.reason(), "Not Found");
    assert_eq!(response.body(), None);
    assert_eq!(response.error_body().unwrap().text(), "Hi");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn response_failure() {
    let client = unreachable_client();
    let call = Arc::new(client.new_call(client.get("/"), StringConverter));
    let err = response_adapter().adapt(call).await.unwrap_err();
    assert_connect_failure(&err);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn retries_unavailable_then_succeeds() {
    let server = MockServer::start().await;
    let attempt = AtomicU32::new(0);
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(move |_: &wiremock::Request| {
            if attempt.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(503)
            } else {
                ResponseTemplate::new(200).set_body_string("recovered")
            }
        })
        .expect(2)
        .mount(&server)
        .await;
    let client = client(&server);

    let call = Arc::new(client.new_call(client.get("/flaky"), StringConverter));
    assert_eq!(body_adapter().adapt(call).await.unwrap(), "recovered");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn no_content_has_no_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/empty"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;
    let client = client(&server);

    let call = Arc::new(client.new_call(client.get("/empty"), StringConverter));
    let err = body_adapter().adapt(call).await.unwrap_err();
    assert!(matches!(err, CallError::MissingBody { status: 204 }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn json_bodies_are_decoded() {
    #[derive(Debug, Deserialize)]
    struct User {
        name: String,
    }

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/user"))
        .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"name":"ada"}"#))
        .mount(&server)
        .await;
    let client = client(&server);

    let call = Arc::new(client.new_call(client.get("/user"), JsonConverter::<User>::new()));
    let adapter = BodyCallAdapter::new("User".parse().unwrap());
    let user = adapter.adapt(call).await.unwrap();
    assert_eq!(user.name, "ada");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn sends_method_headers_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/echo"))
        .and(header("x-trace", "abc"))
        .and(body_string("payload"))
        .respond_with(ResponseTemplate::new(201).set_body_string("created"))
        .expect(1)
        .mount(&server)
        .await;
    let client = client(&server);

    let request = callbridge_types::Request::new(
        callbridge_types::Method::Post,
        client.resolve("/echo"),
    )
    .header("X-Trace", "abc")
    .body("payload");
    let call = Arc::new(client.new_call(request, StringConverter));
    let response = response_adapter().adapt(call).await.unwrap();
    assert_eq!(response.status(), 201);
    assert_eq!(response.into_body().as_deref(), Some("created"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancel_in_flight_resolves_canceled() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;
    let client = client(&server);

    let call = Arc::new(client.new_call(client.get("/slow"), StringConverter));
    let future = body_adapter().adapt(Arc::clone(&call));
    tokio::time::sleep(Duration::from_millis(50)).await;
    future.cancel();

    assert!(call.is_canceled());
    let err = tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .expect("cancel resolves promptly")
        .unwrap_err();
    assert!(err.is_canceled());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn execute_blocks_for_the_response() {
    let server = MockServer::start().await;
    mount(&server, 200, "Hi").await;
    let client = client(&server);

    let call = client.new_call(client.get("/"), StringConverter);
    let response = tokio::task::spawn_blocking(move || {
        let first = call.execute();
        let second = call.execute();
        (first, second)
    })
    .await
    .unwrap();

    assert_eq!(response.0.unwrap().into_body().as_deref(), Some("Hi"));
    assert!(matches!(
        response.1,
        Err(CallError::State(callbridge_types::CallStateError::AlreadyExecuted))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clone_call_sends_again() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Hi"))
        .expect(2)
        .mount(&server)
        .await;
    let client = client(&server);

    let original = Arc::new(client.new_call(client.get("/"), StringConverter));
    let copy: Arc<dyn Call<String>> = Arc::from(original.clone_call());

    assert_eq!(body_adapter().adapt(original).await.unwrap(), "Hi");
    assert!(!copy.is_executed());
    assert_eq!(body_adapter().adapt(copy).await.unwrap(), "Hi");
}

/// Fails the way a buggy decoder would.
struct PanickingConverter;

impl Converter<String> for PanickingConverter {
    fn convert(&self, _body: &[u8]) -> Result<String, CallError> {
        panic!("decoder bug");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_exchange_still_resolves_the_future() {
    let server = MockServer::start().await;
    mount(&server, 200, "Hi").await;
    let client = client(&server);

    let call = Arc::new(client.new_call(client.get("/"), PanickingConverter));
    let err = tokio::time::timeout(Duration::from_secs(5), body_adapter().adapt(call))
        .await
        .expect("future resolves after the task panics")
        .unwrap_err();
    assert!(matches!(err, CallError::Abandoned));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn non_finite_jitter_still_retries() {
    let server = MockServer::start().await;
    let attempt = AtomicU32::new(0);
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(move |_: &wiremock::Request| {
            if attempt.fetch_add(1, Ordering::SeqCst) == 0 {
                ResponseTemplate::new(503)
            } else {
                ResponseTemplate::new(200).set_body_string("recovered")
            }
        })
        .expect(2)
        .mount(&server)
        .await;
    let config = HttpConfig {
        base_url: Some(server.uri()),
        retry: RetrySettings {
            max_retries: 1,
            initial_delay_ms: 1,
            max_delay_ms: 10,
            jitter_factor: f64::NAN,
        },
        ..HttpConfig::default()
    };
    let client = HttpClient::new(config).unwrap();

    let call = Arc::new(client.new_call(client.get("/flaky"), StringConverter));
    let body = tokio::time::timeout(Duration::from_secs(5), body_adapter().adapt(call))
        .await
        .expect("retry completes")
        .unwrap();
    assert_eq!(body, "recovered");
}
