//! Integration tests for `PageFetcher` against a local `wiremock` server.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use kabucal_ir::{FetchError, PageFetcher};

fn test_fetcher() -> PageFetcher {
    PageFetcher::new(5, "kabucal-test/0.1").expect("failed to build test PageFetcher")
}

#[tokio::test]
async fn fetch_text_returns_body_on_success() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ir/calendar/"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw("<p>決算発表</p>".as_bytes(), "text/html; charset=utf-8"),
        )
        .mount(&server)
        .await;

    let body = test_fetcher()
        .fetch_text(&format!("{}/ir/calendar/", server.uri()))
        .await
        .unwrap();
    assert_eq!(body, "<p>決算発表</p>");
}

#[tokio::test]
async fn fetch_text_maps_404_to_not_found() {
    let server = MockServer::start().await;

    let err = test_fetcher()
        .fetch_text(&format!("{}/missing/", server.uri()))
        .await
        .unwrap_err();
    assert!(matches!(err, FetchError::NotFound { .. }), "got {err:?}");
}

#[tokio::test]
async fn fetch_text_maps_other_status_to_unexpected_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = test_fetcher()
        .fetch_text(&format!("{}/ir/", server.uri()))
        .await
        .unwrap_err();
    assert!(
        matches!(err, FetchError::UnexpectedStatus { status: 503, .. }),
        "got {err:?}"
    );
}

#[tokio::test]
async fn fetch_text_rejects_unparseable_url() {
    let err = test_fetcher().fetch_text("not a url").await.unwrap_err();
    assert!(matches!(err, FetchError::InvalidUrl { .. }), "got {err:?}");
}

#[tokio::test]
async fn probe_accepts_successful_head() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/ir/"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/ir/", server.uri());
    assert_eq!(test_fetcher().probe(&url).await.as_deref(), Some(url.as_str()));
}

#[tokio::test]
async fn probe_retries_with_get_when_head_is_blocked() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/ir/"))
        .respond_with(ResponseTemplate::new(405))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/ir/"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html></html>"))
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/ir/", server.uri());
    assert!(test_fetcher().probe(&url).await.is_some());
}

#[tokio::test]
async fn probe_rejects_missing_page_without_get_retry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let url = format!("{}/investor/", server.uri());
    assert!(test_fetcher().probe(&url).await.is_none());
}

#[tokio::test]
async fn probe_follows_redirects_to_final_url() {
    let server = MockServer::start().await;
    Mock::given(method("HEAD"))
        .and(path("/ir/"))
        .respond_with(
            ResponseTemplate::new(301)
                .insert_header("Location", format!("{}/ja/ir/", server.uri()).as_str()),
        )
        .mount(&server)
        .await;
    Mock::given(method("HEAD"))
        .and(path("/ja/ir/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let final_url = test_fetcher()
        .probe(&format!("{}/ir/", server.uri()))
        .await
        .unwrap();
    assert_eq!(final_url, format!("{}/ja/ir/", server.uri()));
}
