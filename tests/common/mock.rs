//! Wiremock stand-ins for the Google endpoints.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use agquota::core::metrics::QuotaMetrics;
use agquota::core::oauth::TokenRefresher;
use agquota::core::poller::Poller;
use agquota::core::quota::QuotaFetcher;
use agquota::storage::accounts::AccountsLocation;
use agquota::storage::config::PollerSettings;
use agquota::test_utils::{test_oauth_client, token_response};

pub const TOKEN_PATH: &str = "/token";
pub const QUOTA_PATH: &str = "/v1internal:fetchAvailableModels";
pub const USERINFO_PATH: &str = "/oauth2/v2/userinfo";

pub struct GoogleMock {
    pub server: MockServer,
}

impl GoogleMock {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}{TOKEN_PATH}", self.server.uri())
    }

    pub fn quota_url(&self) -> String {
        format!("{}{QUOTA_PATH}", self.server.uri())
    }

    pub fn userinfo_url(&self) -> String {
        format!("{}{USERINFO_PATH}", self.server.uri())
    }

    pub fn refresher(&self) -> TokenRefresher {
        TokenRefresher::new(test_oauth_client(), self.token_url()).unwrap()
    }

    pub fn fetcher(&self) -> QuotaFetcher {
        QuotaFetcher::new(self.quota_url()).unwrap()
    }

    /// Poller against this mock with a fresh registry.
    pub fn poller(
        &self,
        accounts: AccountsLocation,
        settings: PollerSettings,
    ) -> (Poller, Arc<QuotaMetrics>) {
        let metrics = Arc::new(QuotaMetrics::new().unwrap());
        let poller = Poller::new(
            accounts,
            self.refresher(),
            self.fetcher(),
            Arc::clone(&metrics),
            settings,
        );
        (poller, metrics)
    }

    /// Token endpoint trades `refresh_token` for `access_token`.
    /// Tokens must be form-safe (no `/`, `+`, ...).
    pub async fn mount_refresh(&self, refresh_token: &str, access_token: &str) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains(format!("refresh_token={refresh_token}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(token_response(access_token)))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_refresh_status(&self, refresh_token: &str, status: u16) {
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains(format!("refresh_token={refresh_token}")))
            .respond_with(
                ResponseTemplate::new(status)
                    .set_body_json(serde_json::json!({"error": "invalid_grant"})),
            )
            .mount(&self.server)
            .await;
    }

    pub async fn mount_quota(&self, access_token: &str, body: Value) {
        self.mount_quota_delayed(access_token, body, Duration::ZERO)
            .await;
    }

    pub async fn mount_quota_delayed(&self, access_token: &str, body: Value, delay: Duration) {
        Mock::given(method("POST"))
            .and(path(QUOTA_PATH))
            .and(header("authorization", format!("Bearer {access_token}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body).set_delay(delay))
            .mount(&self.server)
            .await;
    }

    pub async fn mount_quota_status(&self, access_token: &str, status: u16) {
        Mock::given(method("POST"))
            .and(path(QUOTA_PATH))
            .and(header("authorization", format!("Bearer {access_token}").as_str()))
            .respond_with(ResponseTemplate::new(status).set_body_string("denied"))
            .mount(&self.server)
            .await;
    }

    /// Number of requests received on `request_path`.
    pub async fn hits(&self, request_path: &str) -> usize {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.url.path() == request_path)
            .count()
    }
}
