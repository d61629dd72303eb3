//! Google OAuth2 client identity and the token endpoint.
//!
//! The poller only ever uses the refresh-token grant; the authorization-code
//! grant is used once per account by [`crate::core::authorize`].

use std::fmt;

use reqwest::Client;
use serde::Deserialize;

use crate::core::http::{TOKEN_TIMEOUT, build_client, error_body};
use crate::error::{AgqError, Result};

/// Google token endpoint.
pub const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Environment variable holding the OAuth client id.
pub const ENV_CLIENT_ID: &str = "GOOGLE_CLIENT_ID";
/// Environment variable holding the OAuth client secret.
pub const ENV_CLIENT_SECRET: &str = "GOOGLE_CLIENT_SECRET";

/// Process-wide OAuth client identity.
#[derive(Clone)]
pub struct OAuthClient {
    client_id: String,
    client_secret: String,
}

impl OAuthClient {
    #[must_use]
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Read the client identity from `GOOGLE_CLIENT_ID` / `GOOGLE_CLIENT_SECRET`.
    ///
    /// # Errors
    /// Returns [`AgqError::EnvVarMissing`] naming the first absent or blank variable.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`OAuthClient::from_env`] with an explicit lookup.
    ///
    /// # Errors
    /// Returns [`AgqError::EnvVarMissing`] naming the first absent or blank variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AgqError::EnvVarMissing {
                    name: name.to_string(),
                })
        };
        Ok(Self::new(get(ENV_CLIENT_ID)?, get(ENV_CLIENT_SECRET)?))
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }
}

impl fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Short-lived access credential. Never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(<redacted>)")
    }
}

/// Token endpoint response body.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Why a refresh did not produce an access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshFailure {
    /// Token endpoint answered with a non-success status.
    Rejected { status: u16 },
    /// Request did not complete within the timeout.
    Timeout,
    /// Connection or protocol error.
    Transport(String),
    /// Success status but no usable `access_token`.
    Malformed(String),
}

impl fmt::Display for RefreshFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rejected { status } => write!(f, "token endpoint returned HTTP {status}"),
            Self::Timeout => write!(f, "token endpoint timed out after {}s", TOKEN_TIMEOUT.as_secs()),
            Self::Transport(msg) => write!(f, "token request failed: {msg}"),
            Self::Malformed(msg) => write!(f, "unusable token response: {msg}"),
        }
    }
}

/// Result of a refresh attempt. Failure is an ordinary value: the caller
/// skips the account for this cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum RefreshOutcome {
    Refreshed(AccessToken),
    Failed(RefreshFailure),
}

/// Exchanges refresh tokens (and authorization codes) at the token endpoint.
#[derive(Debug, Clone)]
pub struct TokenRefresher {
    http: Client,
    oauth: OAuthClient,
    token_url: String,
}

impl TokenRefresher {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(oauth: OAuthClient, token_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: build_client(TOKEN_TIMEOUT)?,
            oauth,
            token_url: token_url.into(),
        })
    }

    #[must_use]
    pub const fn oauth(&self) -> &OAuthClient {
        &self.oauth
    }

    /// Trade a refresh token for an access token.
    pub async fn refresh(&self, refresh_token: &str) -> RefreshOutcome {
        let params = [
            ("client_id", self.oauth.client_id.as_str()),
            ("client_secret", self.oauth.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = match self.http.post(&self.token_url).form(&params).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return RefreshOutcome::Failed(RefreshFailure::Timeout),
            Err(e) => return RefreshOutcome::Failed(RefreshFailure::Transport(e.to_string())),
        };

        let status = response.status();
        if !status.is_success() {
            let body = error_body(response).await;
            tracing::debug!(status = status.as_u16(), body = %body, "Token refresh rejected");
            return RefreshOutcome::Failed(RefreshFailure::Rejected {
                status: status.as_u16(),
            });
        }

        match response.json::<TokenResponse>().await {
            Ok(TokenResponse {
                access_token: Some(token),
                expires_in,
                ..
            }) if !token.trim().is_empty() => {
                tracing::debug!(expires_in = ?expires_in, "Access token refreshed");
                RefreshOutcome::Refreshed(AccessToken::new(token))
            }
            Ok(_) => RefreshOutcome::Failed(RefreshFailure::Malformed(
                "missing access_token".to_string(),
            )),
            Err(e) => RefreshOutcome::Failed(RefreshFailure::Malformed(e.to_string())),
        }
    }

    /// Exchange an authorization code from the redirect flow.
    ///
    /// # Errors
    /// Returns [`AgqError::TokenExchange`] for a non-success status, or a
    /// network/parse error.
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<TokenResponse> {
        let params = [
            ("client_id", self.oauth.client_id.as_str()),
            ("client_secret", self.oauth.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("grant_type", "authorization_code"),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| AgqError::from_reqwest(&e, TOKEN_TIMEOUT.as_secs()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AgqError::TokenExchange {
                status: status.as_u16(),
                body: error_body(response).await,
            });
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AgqError::ParseResponse(e.to_string()))
    }
}
