//! Integration tests for the rate-limited fetcher against a mock server.

mod support;
use support::socket_guard::start_mock_server_or_skip;

use std::time::{Duration, Instant};

use paperscrape_core::fetch::{DownloadOutcome, FetchConfig, FetchError, Fetcher};
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

fn fast_config() -> FetchConfig {
    FetchConfig {
        timeout: Duration::from_secs(5),
        max_retries: 2,
        backoff_base: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
        per_domain_delay: Duration::ZERO,
        rate_limit_delay: Duration::from_millis(10),
        ..FetchConfig::default()
    }
}

#[tokio::test]
async fn test_retry_after_header_is_honoured() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/index"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/index"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(fast_config()).unwrap();
    let start = Instant::now();
    let body = fetcher
        .fetch_text(&format!("{}/index", server.uri()))
        .await
        .unwrap();

    assert_eq!(body, "ok");
    assert!(
        start.elapsed() >= Duration::from_millis(900),
        "second request came after {:?}",
        start.elapsed()
    );
    assert_eq!(fetcher.retries(), 1);
}

#[tokio::test]
async fn test_forbidden_is_not_retried() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/secret"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(fast_config()).unwrap();
    let err = fetcher
        .fetch(&format!("{}/secret", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::HttpStatus { status: 403, .. }));
    assert_eq!(fetcher.retries(), 0);
}

#[tokio::test]
async fn test_server_error_recovers_within_budget() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(502))
        .up_to_n_times(2)
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(200).set_body_string("finally"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(fast_config()).unwrap();
    let body = fetcher
        .fetch_text(&format!("{}/flaky", server.uri()))
        .await
        .unwrap();

    assert_eq!(body, "finally");
    assert_eq!(fetcher.retries(), 2);
}

#[tokio::test]
async fn test_slow_response_times_out_and_is_retried() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .expect(2)
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(FetchConfig {
        timeout: Duration::from_millis(100),
        max_retries: 1,
        ..fast_config()
    })
    .unwrap();
    let err = fetcher
        .fetch(&format!("{}/slow", server.uri()))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Timeout { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_user_agent_is_sent() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/ua"))
        .and(header("user-agent", "paperscrape-test/1.0"))
        .respond_with(ResponseTemplate::new(200).set_body_string("hi"))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(FetchConfig {
        user_agent: "paperscrape-test/1.0".to_string(),
        ..fast_config()
    })
    .unwrap();
    assert_eq!(
        fetcher
            .fetch_text(&format!("{}/ua", server.uri()))
            .await
            .unwrap(),
        "hi"
    );
}

#[tokio::test]
async fn test_per_domain_delay_spaces_requests() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("x"))
        .expect(3)
        .mount(&server)
        .await;

    let fetcher = Fetcher::new(FetchConfig {
        per_domain_delay: Duration::from_millis(150),
        ..fast_config()
    })
    .unwrap();
    let start = Instant::now();
    for page in ["a", "b", "c"] {
        fetcher
            .fetch(&format!("{}/{page}", server.uri()))
            .await
            .unwrap();
    }

    assert!(start.elapsed() >= Duration::from_millis(280));
}

#[tokio::test]
async fn test_download_retries_then_writes_file() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    Mock::given(method("GET"))
        .and(path("/paper.pdf"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/paper.pdf"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7 body".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let dest = dir.path().join("nested").join("paper.pdf");
    let fetcher = Fetcher::new(fast_config()).unwrap();
    let outcome = fetcher
        .download_to_file(&format!("{}/paper.pdf", server.uri()), &dest)
        .await
        .unwrap();

    assert_eq!(
        outcome,
        DownloadOutcome::Downloaded {
            path: dest.clone(),
            bytes: 13,
        }
    );
    assert_eq!(std::fs::read(&dest).unwrap(), b"%PDF-1.7 body");
}
