use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use http_loadtest::config::RunConfig;
use http_loadtest::coordinator::LoadCoordinator;
use http_loadtest::errors::ErrorCategory;
use http_loadtest::session::{ReqwestSessionFactory, SessionFactory};

fn quick_config(url: String, num_users: usize, requests_per_user: usize) -> RunConfig {
    let mut config = RunConfig::new(url);
    config.num_users = num_users;
    config.requests_per_user = requests_per_user;
    config.duration = Duration::from_secs(30);
    config.think_time_min = Duration::from_millis(1);
    config.think_time_max = Duration::from_millis(5);
    config.request_timeout = Duration::from_secs(5);
    config
}

// --- session behavior ---

#[tokio::test]
async fn session_reports_status_and_body_size() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/page"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(1234)))
        .expect(1)
        .mount(&server)
        .await;

    let session = ReqwestSessionFactory::new(Duration::from_secs(5))
        .create_session(0)
        .unwrap();
    let response = session
        .get(&format!("{}/page", server.uri()))
        .await
        .unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.content_length, 1234);
}

#[tokio::test]
async fn session_sends_browser_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(header_exists("user-agent"))
        .and(header_exists("accept-language"))
        .and(header_exists("upgrade-insecure-requests"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let session = ReqwestSessionFactory::new(Duration::from_secs(5))
        .create_session(3)
        .unwrap();
    let response = session.get(&server.uri()).await.unwrap();
    assert_eq!(response.status, 200);
}

#[tokio::test]
async fn session_follows_redirects() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(
            ResponseTemplate::new(301).insert_header("Location", format!("{}/new", server.uri())),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/new"))
        .respond_with(ResponseTemplate::new(200).set_body_string("moved"))
        .expect(1)
        .mount(&server)
        .await;

    let session = ReqwestSessionFactory::new(Duration::from_secs(5))
        .create_session(0)
        .unwrap();
    let response = session.get(&format!("{}/old", server.uri())).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.content_length, 5);
}

#[tokio::test]
async fn session_timeout_is_a_transport_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let session = ReqwestSessionFactory::new(Duration::from_millis(200))
        .create_session(0)
        .unwrap();
    let err = session.get(&server.uri()).await.unwrap_err();

    assert_eq!(err.category, ErrorCategory::TimeoutError);
    assert!(!err.message.is_empty());
}

#[tokio::test]
async fn session_connection_refused_is_network_error() {
    // Bind then drop a listener so the port is very likely closed.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let session = ReqwestSessionFactory::new(Duration::from_secs(2))
        .create_session(0)
        .unwrap();
    let err = session
        .get(&format!("http://127.0.0.1:{}/", port))
        .await
        .unwrap_err();

    assert_eq!(err.category, ErrorCategory::NetworkError);
}

// --- end to end ---

#[tokio::test]
async fn run_against_mock_server_counts_every_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hello"))
        .expect(20)
        .mount(&server)
        .await;

    let config = quick_config(format!("{}/", server.uri()), 5, 4);
    let sessions = Arc::new(ReqwestSessionFactory::from_config(&config).unwrap());
    let outcome = LoadCoordinator::new(config, sessions)
        .run(CancellationToken::new())
        .await
        .unwrap();

    let report = outcome.report().unwrap();
    assert_eq!(report.total_requests, 20);
    assert_eq!(report.successful_requests, 20);
    assert_eq!(report.bytes_received, 20 * 5);
    assert!(report.requests_per_second > 0.0);
    assert!(report.latency.is_some());
    assert!(report.errors.is_empty());
}

#[tokio::test]
async fn run_with_server_errors_reports_status_distribution() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let config = quick_config(server.uri(), 3, 2);
    let sessions = Arc::new(ReqwestSessionFactory::from_config(&config).unwrap());
    let outcome = LoadCoordinator::new(config, sessions)
        .run(CancellationToken::new())
        .await
        .unwrap();

    let report = outcome.report().unwrap();
    assert_eq!(report.failed_requests, 6);
    assert_eq!(report.status_codes.len(), 1);
    assert_eq!(report.status_codes[0].status_code, 503);
    assert_eq!(report.errors[0].message, "Unknown error");

    let text = report.to_string();
    assert!(text.contains("503 (Service Unavailable): 6 (100.0%)"), "{}", text);
}

#[tokio::test]
async fn custom_headers_reach_the_target() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(wiremock::matchers::header("x-load-test", "nightly"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let mut config = quick_config(server.uri(), 1, 2);
    config.custom_headers = Some("X-Load-Test:nightly".to_string());
    let sessions = Arc::new(ReqwestSessionFactory::from_config(&config).unwrap());
    let outcome = LoadCoordinator::new(config, sessions)
        .run(CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.records.len(), 2);
    assert!(outcome.records.iter().all(|r| r.success()));
}
