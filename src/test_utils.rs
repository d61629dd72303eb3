//! Test utilities for agquota.
//!
//! Payload factories for the token and quota endpoints, a scratch directory
//! for credential files, and a couple of assertion macros.
//!
//! ```rust,ignore
//! use agquota::test_utils::*;
//!
//! let dir = TestDir::new();
//! let path = dir.write_accounts(&[("dev@example.com", "1//refresh")]);
//! let body = models_response(&[sample_model("gemini-pro", "Gemini Pro", 0.42, EXAMPLE_RESET_TIME)]);
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Value, json};

use crate::core::oauth::OAuthClient;
use crate::storage::accounts::AccountsLocation;
use crate::storage::config::PollerSettings;
use crate::storage::paths::ACCOUNTS_FILE_NAME;

/// Reset time used throughout the tests, and its epoch value.
pub const EXAMPLE_RESET_TIME: &str = "2025-02-18T10:00:00Z";
pub const EXAMPLE_RESET_EPOCH: f64 = 1_739_872_800.0;

// =============================================================================
// Payload factories
// =============================================================================

/// One `models` entry as `(id, json)`.
#[must_use]
pub fn sample_model(id: &str, display_name: &str, fraction: f64, reset_time: &str) -> (String, Value) {
    (
        id.to_string(),
        json!({
            "displayName": display_name,
            "quotaInfo": {"remainingFraction": fraction, "resetTime": reset_time}
        }),
    )
}

/// A `fetchAvailableModels` response body.
#[must_use]
pub fn models_response(models: &[(String, Value)]) -> Value {
    let models: serde_json::Map<String, Value> = models.iter().cloned().collect();
    json!({ "models": models })
}

/// The single-model response used in most scenarios.
#[must_use]
pub fn gemini_pro_response() -> Value {
    models_response(&[sample_model(
        "gemini-pro",
        "Gemini Pro",
        0.42,
        EXAMPLE_RESET_TIME,
    )])
}

/// A successful token endpoint response.
#[must_use]
pub fn token_response(access_token: &str) -> Value {
    json!({
        "access_token": access_token,
        "expires_in": 3599,
        "token_type": "Bearer",
        "scope": "openid email profile"
    })
}

/// Client identity for tests; never sent anywhere real.
#[must_use]
pub fn test_oauth_client() -> OAuthClient {
    OAuthClient::new("test-client.apps.googleusercontent.com", "test-secret")
}

/// Sequential, no-reset poller settings with a short interval.
#[must_use]
pub const fn test_poller_settings() -> PollerSettings {
    PollerSettings {
        interval: Duration::from_millis(50),
        max_concurrent_accounts: 1,
        reset_each_cycle: false,
        authorize_if_missing: false,
    }
}

// =============================================================================
// Scratch directory
// =============================================================================

/// An isolated temporary directory, removed on drop.
pub struct TestDir {
    inner: tempfile::TempDir,
}

impl TestDir {
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: tempfile::tempdir().expect("Failed to create temp directory"),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Write a file, creating parent directories.
    ///
    /// # Panics
    ///
    /// Panics if the file cannot be written.
    pub fn create_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.inner.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent directories");
        }
        fs::write(&path, content).expect("Failed to write test file");
        path
    }

    /// Write `antigravity-accounts.json` with `(email, refresh_token)` pairs.
    pub fn write_accounts(&self, accounts: &[(&str, &str)]) -> PathBuf {
        let entries: Vec<Value> = accounts
            .iter()
            .map(|(email, token)| json!({"email": email, "refresh_token": token}))
            .collect();
        self.write_accounts_json(&json!({ "accounts": entries }))
    }

    /// Write `antigravity-accounts.json` verbatim.
    ///
    /// # Panics
    ///
    /// Panics if the value cannot be serialized or written.
    pub fn write_accounts_json(&self, value: &Value) -> PathBuf {
        let content = serde_json::to_string_pretty(value).expect("Failed to serialize accounts");
        self.create_file(ACCOUNTS_FILE_NAME, &content)
    }

    #[must_use]
    pub fn accounts_path(&self) -> PathBuf {
        self.inner.path().join(ACCOUNTS_FILE_NAME)
    }

    /// Fixed location pointing at [`TestDir::accounts_path`].
    #[must_use]
    pub fn accounts_location(&self) -> AccountsLocation {
        AccountsLocation::Fixed(self.accounts_path())
    }

    /// # Panics
    ///
    /// Panics if the file is missing or not JSON.
    #[must_use]
    pub fn read_json(&self, name: &str) -> Value {
        let content =
            fs::read_to_string(self.inner.path().join(name)).expect("Failed to read test file");
        serde_json::from_str(&content).expect("Test file is not JSON")
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Assertion macros
// =============================================================================

/// Assert that a string contains a substring, printing the string on failure.
#[macro_export]
macro_rules! assert_contains {
    ($haystack:expr, $needle:expr) => {
        let haystack = $haystack;
        let needle = $needle;
        assert!(
            haystack.contains(needle),
            "Expected string to contain {:?}\n\nActual string:\n{}",
            needle,
            haystack
        );
    };
}

/// Assert that an optional gauge value is present and equal within epsilon.
#[macro_export]
macro_rules! assert_gauge {
    ($value:expr, $expected:expr) => {
        let value: Option<f64> = $value;
        let expected: f64 = $expected;
        match value {
            Some(actual) => assert!(
                (actual - expected).abs() < 1e-9,
                "Gauge value {} != {}",
                actual,
                expected
            ),
            None => panic!("Gauge not set, expected {}", expected),
        }
    };
}
