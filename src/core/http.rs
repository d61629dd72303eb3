//! HTTP client utilities. Every outbound call has a bounded timeout.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};

use crate::error::{AgqError, Result};

/// Timeout for token endpoint calls (refresh and code exchange).
pub const TOKEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for quota API calls.
pub const QUOTA_TIMEOUT: Duration = Duration::from_secs(15);

/// Timeout for the userinfo lookup after authorization.
pub const USERINFO_TIMEOUT: Duration = Duration::from_secs(10);

/// Build a configured HTTP client.
///
/// # Errors
///
/// Returns error if client construction fails.
pub fn build_client(timeout: Duration) -> Result<Client> {
    ClientBuilder::new()
        .timeout(timeout)
        .connect_timeout(timeout.min(Duration::from_secs(5)))
        .user_agent(format!("agquota/{}", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AgqError::Network(e.to_string()))
}

/// Read a non-success body for logging, capped at 512 bytes.
pub async fn error_body(response: reqwest::Response) -> String {
    const MAX: usize = 512;
    let text = response.text().await.unwrap_or_default();
    if text.len() > MAX {
        let cut = (0..=MAX).rev().find(|i| text.is_char_boundary(*i)).unwrap_or(0);
        format!("{}...", &text[..cut])
    } else {
        text
    }
}
