//! Error types for agquota.
//!
//! Uses `thiserror` for structured error types that map to exit codes.
//!
//! ## Error Taxonomy
//!
//! - **Fatal at startup**: missing OAuth client credentials, invalid
//!   configuration, failure to bind the metrics port. The binary prints the
//!   error and exits non-zero.
//! - **Recoverable per cycle**: credential file problems, token refresh and
//!   quota fetch failures. The poller logs them and skips the affected account
//!   (or the whole cycle, for the credential file) until the next tick.
//! - **Interactive authorization**: callback port busy, consent denied, token
//!   exchange rejected. Reported to the operator; never touches a running
//!   poller.
//!
//! Each error has a stable error code (e.g., `AGQ-A001`) for log filtering.

use std::net::SocketAddr;

use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// High-level error categories for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// OAuth client identity, refresh or authorization problems.
    Authentication,
    /// Timeouts and transport failures.
    Network,
    /// Config file, credential file or CLI values.
    Configuration,
    /// Quota API returned something unusable.
    Provider,
    /// Metrics endpoint or callback listener.
    Server,
    /// I/O, serialization, unexpected state.
    Internal,
}

impl ErrorCategory {
    /// Returns a human-readable description of the category.
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::Authentication => "Authentication error",
            Self::Network => "Network error",
            Self::Configuration => "Configuration error",
            Self::Provider => "Provider error",
            Self::Server => "Server error",
            Self::Internal => "Internal error",
        }
    }

    /// Returns a short code prefix for this category.
    #[must_use]
    pub const fn code_prefix(&self) -> &'static str {
        match self {
            Self::Authentication => "A",
            Self::Network => "N",
            Self::Configuration => "C",
            Self::Provider => "P",
            Self::Server => "S",
            Self::Internal => "X",
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

// =============================================================================
// Exit Codes
// =============================================================================

/// Process exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExitCode {
    /// Success
    Success = 0,
    /// Unexpected failure
    GeneralError = 1,
    /// Missing secrets or invalid configuration
    ConfigError = 2,
    /// Could not bind a listening socket
    BindError = 3,
    /// Timeout
    Timeout = 4,
}

impl From<ExitCode> for i32 {
    fn from(code: ExitCode) -> Self {
        code as Self
    }
}

/// Main error type for agquota operations.
#[derive(Error, Debug)]
pub enum AgqError {
    // ==========================================================================
    // Authentication errors
    // ==========================================================================
    /// Required environment variable not set (OAuth client id/secret).
    #[error("environment variable not set: {name}")]
    EnvVarMissing { name: String },

    /// Token endpoint rejected a refresh or code exchange.
    #[error("token exchange failed with HTTP {status}: {body}")]
    TokenExchange { status: u16, body: String },

    /// Provider answered without a refresh token.
    #[error("no refresh token returned by the provider (revoke the app's access and retry)")]
    MissingRefreshToken,

    /// User denied consent or the provider redirected with an error.
    #[error("authorization rejected: {0}")]
    AuthorizationDenied(String),

    /// No callback arrived in time.
    #[error("no authorization callback received within {0} seconds")]
    AuthorizationTimeout(u64),

    // ==========================================================================
    // Network errors
    // ==========================================================================
    /// Request timed out.
    #[error("request timeout after {0} seconds")]
    Timeout(u64),

    /// Generic transport error.
    #[error("network error: {0}")]
    Network(String),

    // ==========================================================================
    // Configuration errors
    // ==========================================================================
    /// Generic configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// No credential file at any searched location.
    #[error("no accounts file found (searched: {searched})")]
    AccountsNotFound { searched: String },

    /// Credential file exists but is not valid JSON of the expected shape.
    #[error("accounts file {path} is invalid: {message}")]
    AccountsParse { path: String, message: String },

    // ==========================================================================
    // Provider errors
    // ==========================================================================
    /// Quota API returned a non-success status.
    #[error("quota API returned HTTP {status_code}")]
    ProviderApi { status_code: u16, message: String },

    /// Failed to parse a provider response.
    #[error("failed to parse response: {0}")]
    ParseResponse(String),

    // ==========================================================================
    // Server errors
    // ==========================================================================
    /// Metrics listener could not bind.
    #[error("failed to bind metrics endpoint on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// OAuth callback listener could not bind.
    #[error("failed to bind OAuth callback listener on port {port}: {source}")]
    CallbackBind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Metrics registry rejected a collector or failed to encode.
    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    // ==========================================================================
    // Internal errors
    // ==========================================================================
    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Catch-all for other errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AgqError {
    /// Map error to a process exit code.
    #[must_use]
    pub const fn exit_code(&self) -> ExitCode {
        match self {
            Self::EnvVarMissing { .. }
            | Self::Config(_)
            | Self::AccountsNotFound { .. }
            | Self::AccountsParse { .. } => ExitCode::ConfigError,

            Self::Bind { .. } | Self::CallbackBind { .. } => ExitCode::BindError,

            Self::Timeout(_) | Self::AuthorizationTimeout(_) => ExitCode::Timeout,

            Self::TokenExchange { .. }
            | Self::MissingRefreshToken
            | Self::AuthorizationDenied(_)
            | Self::Network(_)
            | Self::ProviderApi { .. }
            | Self::ParseResponse(_)
            | Self::Metrics(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Other(_) => ExitCode::GeneralError,
        }
    }

    /// Returns the error category for classification.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::EnvVarMissing { .. }
            | Self::TokenExchange { .. }
            | Self::MissingRefreshToken
            | Self::AuthorizationDenied(_)
            | Self::AuthorizationTimeout(_) => ErrorCategory::Authentication,

            Self::Timeout(_) | Self::Network(_) => ErrorCategory::Network,

            Self::Config(_) | Self::AccountsNotFound { .. } | Self::AccountsParse { .. } => {
                ErrorCategory::Configuration
            }

            Self::ProviderApi { .. } | Self::ParseResponse(_) => ErrorCategory::Provider,

            Self::Bind { .. } | Self::CallbackBind { .. } | Self::Metrics(_) => {
                ErrorCategory::Server
            }

            Self::Io(_) | Self::Json(_) | Self::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Returns a stable error code.
    ///
    /// Format: `AGQ-{category}{number}`.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::EnvVarMissing { .. } => "AGQ-A001",
            Self::TokenExchange { .. } => "AGQ-A002",
            Self::MissingRefreshToken => "AGQ-A003",
            Self::AuthorizationDenied(_) => "AGQ-A004",
            Self::AuthorizationTimeout(_) => "AGQ-A005",

            Self::Timeout(_) => "AGQ-N001",
            Self::Network(_) => "AGQ-N099",

            Self::Config(_) => "AGQ-C001",
            Self::AccountsNotFound { .. } => "AGQ-C010",
            Self::AccountsParse { .. } => "AGQ-C011",

            Self::ProviderApi { .. } => "AGQ-P001",
            Self::ParseResponse(_) => "AGQ-P020",

            Self::Bind { .. } => "AGQ-S001",
            Self::CallbackBind { .. } => "AGQ-S002",
            Self::Metrics(_) => "AGQ-S010",

            Self::Io(_) => "AGQ-X001",
            Self::Json(_) => "AGQ-X002",
            Self::Other(_) => "AGQ-X099",
        }
    }

    /// Whether this error must abort process startup.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::EnvVarMissing { .. } | Self::Bind { .. } | Self::Config(_)
        )
    }

    /// Map a reqwest transport error, keeping timeouts distinct.
    #[must_use]
    pub fn from_reqwest(err: &reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout_secs)
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Result type alias for agquota operations.
pub type Result<T> = std::result::Result<T, AgqError>;

// =============================================================================
// Tests
// =============================================================================
