//! Transport and cookie probe against a mocked exchange origin.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use nse_datahub::scrapers::headers::HeaderTemplate;
use nse_datahub::scrapers::transport::{HttpTransport, Transport};
use nse_datahub::session::{CookieValidator, HttpCookieValidator};
use nse_datahub::{CookieSet, EndpointRequest, FetchFailure};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const UA: &str = "Mozilla/5.0 (X11; Linux x86_64) test";

fn cookies() -> CookieSet {
    let mut cookies = BTreeMap::new();
    cookies.insert("nseappid".to_string(), "xyz".to_string());
    cookies.insert("nsit".to_string(), "abc".to_string());
    CookieSet::new(cookies, Utc::now(), Duration::from_secs(3600))
}

fn request(server: &MockServer, api_path: &str, timeout: Duration) -> EndpointRequest {
    let headers = HeaderTemplate::new(&server.uri(), UA).unwrap();
    EndpointRequest::new(
        "all_indices",
        format!("{}{}", server.uri(), api_path),
        headers.resolve(Some("market-data/live-equity-market")),
        timeout,
    )
}

fn validator(server: &MockServer, timeout: Duration) -> HttpCookieValidator {
    HttpCookieValidator::new(
        reqwest::Client::new(),
        &format!("{}/api/allIndices", server.uri()),
        "all-reports#cr_equity_archives",
        timeout,
        &HeaderTemplate::new(&server.uri(), UA).unwrap(),
    )
}

#[tokio::test]
async fn transport_sends_session_and_browser_headers() {
    let server = MockServer::start().await;
    let referer = format!("{}/market-data/live-equity-market", server.uri());
    Mock::given(method("GET"))
        .and(path("/api/allIndices"))
        .and(header("cookie", "nseappid=xyz; nsit=abc"))
        .and(header("user-agent", UA))
        .and(header("referer", referer.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [{"index": "NIFTY 50"}]})))
        .expect(1)
        .mount(&server)
        .await;

    let transport = HttpTransport::new(reqwest::Client::new());
    let body = transport
        .get(&request(&server, "/api/allIndices", Duration::from_secs(5)), &cookies())
        .await
        .unwrap();

    assert_eq!(body["data"][0]["index"], "NIFTY 50");
}

#[tokio::test]
async fn transport_reports_refusals_as_rejections() {
    let server = MockServer::start().await;
    Mock::given(path("/api/forbidden"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;
    Mock::given(path("/api/broken"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(reqwest::Client::new());
    let timeout = Duration::from_secs(5);

    let forbidden = transport
        .get(&request(&server, "/api/forbidden", timeout), &cookies())
        .await
        .unwrap_err();
    assert_eq!(forbidden, FetchFailure::Status(403));
    assert!(forbidden.is_rejection());

    let broken = transport
        .get(&request(&server, "/api/broken", timeout), &cookies())
        .await
        .unwrap_err();
    assert_eq!(broken, FetchFailure::Status(500));
    assert!(!broken.is_rejection());
}

#[tokio::test]
async fn transport_flags_non_json_bodies() {
    let server = MockServer::start().await;
    Mock::given(path("/api/allIndices"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>Access Denied</html>"))
        .mount(&server)
        .await;

    let transport = HttpTransport::new(reqwest::Client::new());
    let err = transport
        .get(&request(&server, "/api/allIndices", Duration::from_secs(5)), &cookies())
        .await
        .unwrap_err();

    assert!(matches!(err, FetchFailure::MalformedBody(_)));
}

#[tokio::test]
async fn transport_times_out_slow_endpoints() {
    let server = MockServer::start().await;
    Mock::given(path("/api/allIndices"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": []}))
                .set_delay(Duration::from_millis(800)),
        )
        .mount(&server)
        .await;

    let transport = HttpTransport::new(reqwest::Client::new());
    let err = transport
        .get(&request(&server, "/api/allIndices", Duration::from_millis(100)), &cookies())
        .await
        .unwrap_err();

    assert_eq!(err, FetchFailure::Timeout(Duration::from_millis(100)));
}

#[tokio::test]
async fn probe_accepts_success_with_cookies_attached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/allIndices"))
        .and(header("cookie", "nseappid=xyz; nsit=abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    assert!(validator(&server, Duration::from_secs(5)).validate(&cookies()).await);
}

#[tokio::test]
async fn validation_request_looks_like_a_page_fetch() {
    let server = MockServer::start().await;
    let referer = format!("{}/all-reports#cr_equity_archives", server.uri());
    Mock::given(method("GET"))
        .and(path("/api/allIndices"))
        .and(header("referer", referer.as_str()))
        .and(header("user-agent", UA))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;
    // Anything without the referer is refused, as the origin does
    Mock::given(path("/api/allIndices"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    assert!(validator(&server, Duration::from_secs(5)).validate(&cookies()).await);
}

#[tokio::test]
async fn probe_rejects_refusals_and_errors() {
    for status in [401, 403, 503] {
        let server = MockServer::start().await;
        Mock::given(path("/api/allIndices"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;

        assert!(
            !validator(&server, Duration::from_secs(5)).validate(&cookies()).await,
            "status {} should fail the probe",
            status
        );
    }
}

#[tokio::test]
async fn probe_treats_a_hung_origin_as_invalid() {
    let server = MockServer::start().await;
    Mock::given(path("/api/allIndices"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let started = std::time::Instant::now();
    assert!(!validator(&server, Duration::from_millis(100)).validate(&cookies()).await);
    assert!(started.elapsed() < Duration::from_secs(2));
}
