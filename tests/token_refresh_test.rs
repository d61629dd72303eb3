//! Token endpoint behavior against a mock server.

mod common;

use std::time::Duration;

use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

use agquota::core::oauth::{AccessToken, RefreshFailure, RefreshOutcome};
use agquota::error::AgqError;

use common::logger::TestLogger;
use common::mock::{GoogleMock, TOKEN_PATH};

#[tokio::test]
async fn refresh_returns_access_token() {
    let log = TestLogger::new("refresh_returns_access_token");
    log.phase("setup");
    let google = GoogleMock::start().await;
    google.mount_refresh("refresh-a", "access-a").await;

    log.phase("execute");
    log.http_request("POST", &google.token_url());
    let outcome = google.refresher().refresh("refresh-a").await;

    log.phase("verify");
    assert_eq!(outcome, RefreshOutcome::Refreshed(AccessToken::new("access-a")));
    log.finish_ok();
}

#[tokio::test]
async fn refresh_sends_client_credentials() {
    let google = GoogleMock::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("client_id=test-client.apps.googleusercontent.com"))
        .and(body_string_contains("client_secret=test-secret"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(agquota::test_utils::token_response("ok")))
        .expect(1)
        .mount(&google.server)
        .await;

    let outcome = google.refresher().refresh("anything").await;
    assert!(matches!(outcome, RefreshOutcome::Refreshed(_)));
}

#[tokio::test]
async fn rejected_refresh_is_a_failure_value() {
    let google = GoogleMock::start().await;
    google.mount_refresh_status("revoked", 400).await;

    let outcome = google.refresher().refresh("revoked").await;

    assert_eq!(
        outcome,
        RefreshOutcome::Failed(RefreshFailure::Rejected { status: 400 })
    );
}

#[tokio::test]
async fn missing_access_token_is_malformed() {
    let google = GoogleMock::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"expires_in": 3599})))
        .mount(&google.server)
        .await;

    let outcome = google.refresher().refresh("refresh-a").await;
    assert!(matches!(outcome, RefreshOutcome::Failed(RefreshFailure::Malformed(_))));
}

#[tokio::test]
async fn non_json_body_is_malformed() {
    let google = GoogleMock::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&google.server)
        .await;

    let outcome = google.refresher().refresh("refresh-a").await;
    assert!(matches!(outcome, RefreshOutcome::Failed(RefreshFailure::Malformed(_))));
}

#[tokio::test]
async fn unreachable_endpoint_is_transport_failure() {
    let refresher = agquota::core::oauth::TokenRefresher::new(
        agquota::test_utils::test_oauth_client(),
        "http://127.0.0.1:9/token",
    )
    .unwrap();

    let outcome = refresher.refresh("refresh-a").await;
    assert!(matches!(
        outcome,
        RefreshOutcome::Failed(RefreshFailure::Transport(_) | RefreshFailure::Timeout)
    ));
}

#[tokio::test]
async fn exchange_code_returns_refresh_token() {
    let google = GoogleMock::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth-code"))
        .and(body_string_contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "access-new",
            "refresh_token": "refresh-new",
            "expires_in": 3599
        })))
        .mount(&google.server)
        .await;

    let tokens = google
        .refresher()
        .exchange_code("auth-code", "http://localhost:8080")
        .await
        .unwrap();

    assert_eq!(tokens.access_token.as_deref(), Some("access-new"));
    assert_eq!(tokens.refresh_token.as_deref(), Some("refresh-new"));
}

#[tokio::test]
async fn exchange_code_rejection_carries_status() {
    let google = GoogleMock::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid_client"))
        .mount(&google.server)
        .await;

    let err = google
        .refresher()
        .exchange_code("auth-code", "http://localhost:8080")
        .await
        .unwrap_err();

    assert!(matches!(err, AgqError::TokenExchange { status: 401, ref body } if body.contains("invalid_client")));
}

#[tokio::test]
async fn slow_token_endpoint_times_out() {
    let google = GoogleMock::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(agquota::test_utils::token_response("late"))
                .set_delay(Duration::from_secs(12)),
        )
        .mount(&google.server)
        .await;

    let outcome = google.refresher().refresh("refresh-a").await;
    assert_eq!(outcome, RefreshOutcome::Failed(RefreshFailure::Timeout));
}
