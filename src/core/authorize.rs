//! One-time interactive authorization of a Google account.
//!
//! A loopback listener receives the redirect, the code is exchanged for a
//! refresh token, and the account is upserted into the credential file. The
//! listener is owned by a single exchange and dropped on every exit path.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use crate::core::http::{USERINFO_TIMEOUT, build_client};
use crate::core::oauth::TokenRefresher;
use crate::error::{AgqError, Result};
use crate::storage::accounts::{AccountStore, UNKNOWN_ACCOUNT, Upsert};
use crate::storage::config::{AuthorizeSettings, EndpointsConfig};

/// Google consent screen.
pub const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
/// Returns the signed-in user's email.
pub const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";
/// Requested scopes. `cloud-platform` is what the quota API checks.
pub const SCOPES: &[&str] = &[
    "openid",
    "email",
    "profile",
    "https://www.googleapis.com/auth/cloud-platform",
];

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

const SUCCESS_HTML: &str = "<html><body><h1>Authentication successful!</h1><p>You can close this window and return to the terminal.</p></body></html>";
const FAILURE_HTML: &str =
    "<html><body><h1>Authentication failed</h1><p>Check the terminal for details.</p></body></html>";

/// What the redirect carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callback {
    Code(String),
    Error(String),
}

/// Extract `code` or `error` from a raw HTTP request. `None` for anything
/// else (favicon requests, probes, garbage).
#[must_use]
pub fn parse_callback(request: &str) -> Option<Callback> {
    let target = request.lines().next()?.split_whitespace().nth(1)?;
    let url = Url::parse(&format!("http://localhost{target}")).ok()?;

    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" if !value.is_empty() => return Some(Callback::Code(value.into_owned())),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }
    error.map(Callback::Error)
}

/// Loopback listener for the OAuth redirect.
#[derive(Debug)]
pub struct CallbackListener {
    listener: TcpListener,
    port: u16,
}

impl CallbackListener {
    /// Bind `127.0.0.1:<port>`. Port 0 picks a free port.
    ///
    /// # Errors
    /// Returns [`AgqError::CallbackBind`] if the port is taken.
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|source| AgqError::CallbackBind { port, source })?;
        let port = listener.local_addr()?.port();
        Ok(Self { listener, port })
    }

    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Redirect URI to register with the OAuth client.
    #[must_use]
    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    /// Serve requests until one carries a code or an error, then release the
    /// port.
    ///
    /// # Errors
    /// Returns [`AgqError::AuthorizationDenied`] when the redirect reports an
    /// error, or [`AgqError::AuthorizationTimeout`] when nothing arrives in time.
    pub async fn wait_for_code(self, timeout: Duration) -> Result<String> {
        let result = tokio::time::timeout(timeout, self.accept_until_callback())
            .await
            .map_err(|_| AgqError::AuthorizationTimeout(timeout.as_secs()))?;
        drop(self);
        result
    }

    async fn accept_until_callback(&self) -> Result<String> {
        loop {
            let mut stream = match self.listener.accept().await {
                Ok((stream, _)) => stream,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept callback connection");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                    continue;
                }
            };

            let mut buffer = [0u8; 4096];
            let read = stream.read(&mut buffer).await.unwrap_or(0);
            let request = String::from_utf8_lossy(&buffer[..read]);

            match parse_callback(&request) {
                Some(Callback::Code(code)) => {
                    respond(&mut stream, "200 OK", SUCCESS_HTML).await;
                    return Ok(code);
                }
                Some(Callback::Error(error)) => {
                    respond(&mut stream, "400 Bad Request", FAILURE_HTML).await;
                    return Err(AgqError::AuthorizationDenied(error));
                }
                None => {
                    tracing::debug!(request_line = request.lines().next().unwrap_or(""), "Ignoring non-callback request");
                    respond(&mut stream, "404 Not Found", "Not found").await;
                }
            }
        }
    }
}

async fn respond(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    if let Err(e) = stream.write_all(response.as_bytes()).await {
        tracing::debug!(error = %e, "Failed to write callback response");
    }
    let _ = stream.flush().await;
}

/// Ask the desktop to open `url`.
///
/// # Errors
/// Returns an error if the opener cannot be spawned.
#[cfg(target_os = "windows")]
pub fn open_browser(url: &str) -> std::io::Result<()> {
    Command::new("cmd")
        .args(["/C", "start", "", url])
        .spawn()
        .map(drop)
}

/// Ask the desktop to open `url`.
///
/// # Errors
/// Returns an error if the opener cannot be spawned.
#[cfg(target_os = "macos")]
pub fn open_browser(url: &str) -> std::io::Result<()> {
    Command::new("open").arg(url).spawn().map(drop)
}

/// Ask the desktop to open `url`.
///
/// # Errors
/// Returns an error if the opener cannot be spawned.
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
pub fn open_browser(url: &str) -> std::io::Result<()> {
    Command::new("xdg-open").arg(url).spawn().map(drop)
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    #[serde(default)]
    email: Option<String>,
}

/// Result of a completed authorization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedAccount {
    pub email: String,
    pub upsert: Upsert,
    pub path: PathBuf,
}

/// Runs the browser flow and records the result.
pub struct Authorizer {
    refresher: TokenRefresher,
    http: Client,
    auth_url: String,
    userinfo_url: String,
    settings: AuthorizeSettings,
}

impl Authorizer {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        refresher: TokenRefresher,
        endpoints: &EndpointsConfig,
        settings: AuthorizeSettings,
    ) -> Result<Self> {
        Ok(Self {
            refresher,
            http: build_client(USERINFO_TIMEOUT)?,
            auth_url: endpoints.auth_url.clone(),
            userinfo_url: endpoints.userinfo_url.clone(),
            settings,
        })
    }

    /// Consent URL for the given redirect.
    ///
    /// # Errors
    /// Returns [`AgqError::Config`] if the configured auth URL is invalid.
    pub fn authorization_url(&self, redirect_uri: &str) -> Result<Url> {
        let scope = SCOPES.join(" ");
        Url::parse_with_params(
            &self.auth_url,
            &[
                ("client_id", self.refresher.oauth().client_id()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| AgqError::Config(format!("invalid auth_url {}: {e}", self.auth_url)))
    }

    /// Run the full flow and upsert the account into `store_path`.
    ///
    /// # Errors
    /// Returns an error if the credential file is unreadable, the callback
    /// port is taken, the user denies consent, nothing arrives before the
    /// timeout, the exchange fails, or no refresh token is returned.
    pub async fn authorize(&self, store_path: &Path) -> Result<AuthorizedAccount> {
        let mut store = AccountStore::load_or_default(store_path)?;
        let listener = CallbackListener::bind(self.settings.callback_port).await?;
        self.complete(listener, &mut store).await
    }

    /// Same as [`Authorizer::authorize`] with a listener bound by the caller.
    ///
    /// # Errors
    /// See [`Authorizer::authorize`].
    pub async fn complete(
        &self,
        listener: CallbackListener,
        store: &mut AccountStore,
    ) -> Result<AuthorizedAccount> {
        let redirect_uri = listener.redirect_uri();
        let url = self.authorization_url(&redirect_uri)?;

        println!("Open this URL in your browser to authorize an account:\n\n  {url}\n");
        if self.settings.open_browser
            && let Err(e) = open_browser(url.as_str())
        {
            tracing::warn!(error = %e, "Could not open a browser; use the URL above");
        }

        tracing::info!(port = listener.port(), timeout_secs = self.settings.timeout.as_secs(), "Waiting for OAuth callback");
        let code = listener.wait_for_code(self.settings.timeout).await?;

        let tokens = self.refresher.exchange_code(&code, &redirect_uri).await?;
        let refresh_token = tokens
            .refresh_token
            .filter(|t| !t.trim().is_empty())
            .ok_or(AgqError::MissingRefreshToken)?;

        let email = match tokens.access_token.as_deref() {
            Some(access) if !access.is_empty() => self.lookup_email(access).await,
            _ => UNKNOWN_ACCOUNT.to_string(),
        };

        let upsert = store.upsert(&email, &refresh_token);
        store.save()?;
        tracing::info!(account = %email, path = %store.path().display(), ?upsert, "Saved account");

        Ok(AuthorizedAccount {
            email,
            upsert,
            path: store.path().to_path_buf(),
        })
    }

    async fn lookup_email(&self, access_token: &str) -> String {
        let response = self
            .http
            .get(&self.userinfo_url)
            .header(AUTHORIZATION, format!("Bearer {access_token}"))
            .send()
            .await;

        let info = match response {
            Ok(r) if r.status().is_success() => r.json::<UserInfo>().await.ok(),
            Ok(r) => {
                tracing::warn!(status = r.status().as_u16(), "Userinfo lookup failed");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Userinfo lookup failed");
                None
            }
        };

        info.and_then(|i| i.email)
            .filter(|e| !e.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_ACCOUNT.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::oauth::OAuthClient;

    #[test]
    fn failed_accept_waits_before_retrying() {
        assert!(ACCEPT_BACKOFF >= Duration::from_millis(50));
        assert!(ACCEPT_BACKOFF < Duration::from_secs(1));
    }

    fn authorizer() -> Authorizer {
        let refresher = TokenRefresher::new(
            OAuthClient::new("client-123.apps.googleusercontent.com", "secret"),
            "http://127.0.0.1:9/token",
        )
        .unwrap();
        Authorizer::new(
            refresher,
            &EndpointsConfig::default(),
            AuthorizeSettings {
                callback_port: 0,
                timeout: Duration::from_secs(1),
                open_browser: false,
            },
        )
        .unwrap()
    }

    #[test]
    fn parses_code() {
        assert_eq!(
            parse_callback("GET /?code=4%2F0Ab&scope=email HTTP/1.1\r\nHost: localhost\r\n\r\n"),
            Some(Callback::Code("4/0Ab".to_string()))
        );
    }

    #[test]
    fn parses_error() {
        assert_eq!(
            parse_callback("GET /?error=access_denied HTTP/1.1\r\n\r\n"),
            Some(Callback::Error("access_denied".to_string()))
        );
    }

    #[test]
    fn ignores_other_requests() {
        assert_eq!(parse_callback("GET /favicon.ico HTTP/1.1\r\n\r\n"), None);
        assert_eq!(parse_callback("GET /?code= HTTP/1.1\r\n\r\n"), None);
        assert_eq!(parse_callback(""), None);
    }

    #[test]
    fn authorization_url_has_offline_consent() {
        let url = authorizer()
            .authorization_url("http://localhost:8080")
            .unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(pairs["client_id"], "client-123.apps.googleusercontent.com");
        assert_eq!(pairs["redirect_uri"], "http://localhost:8080");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["prompt"], "consent");
        assert_eq!(
            pairs["scope"],
            "openid email profile https://www.googleapis.com/auth/cloud-platform"
        );
    }

    #[tokio::test]
    async fn listener_reports_actual_port() {
        let listener = CallbackListener::bind(0).await.unwrap();
        assert_ne!(listener.port(), 0);
        assert_eq!(
            listener.redirect_uri(),
            format!("http://localhost:{}", listener.port())
        );
    }
}
