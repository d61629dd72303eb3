//! Configuration file loading and management.
//!
//! Loads configuration from:
//! - Linux: `~/.config/agquota/config.toml`
//! - macOS: `~/Library/Application Support/dev.agquota.agquota/config.toml`
//! - Windows: `%APPDATA%/agquota/agquota/config/config.toml`
//!
//! ## Precedence
//!
//! Settings are resolved with the following precedence (highest first):
//! 1. CLI flags
//! 2. Environment variables
//! 3. Config file
//! 4. Built-in defaults
//!
//! ## Environment Variables
//!
//! - `AGQUOTA_PORT`: Metrics port
//! - `AGQUOTA_INTERVAL`: Seconds between poll cycles
//! - `AGQUOTA_ACCOUNTS_FILE`: Credential file (disables the default search)
//! - `AGQUOTA_CONFIG`: Override config file path
//!
//! The OAuth client secrets are not part of this file; see
//! [`crate::core::oauth::OAuthClient::from_env`].

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::AppPaths;
use super::accounts::AccountsLocation;
use crate::cli::args::{AuthArgs, ServeArgs};
use crate::core::{authorize, oauth, quota};
use crate::error::{AgqError, Result};

// =============================================================================
// Environment Variable Names
// =============================================================================

/// Environment variable for the metrics port.
pub const ENV_PORT: &str = "AGQUOTA_PORT";
/// Environment variable for the poll interval in seconds.
pub const ENV_INTERVAL: &str = "AGQUOTA_INTERVAL";
/// Environment variable for the credential file path.
pub const ENV_ACCOUNTS_FILE: &str = "AGQUOTA_ACCOUNTS_FILE";
/// Environment variable to override config file path.
pub const ENV_CONFIG: &str = "AGQUOTA_CONFIG";

/// Upper bound for the poll interval (one day).
const MAX_INTERVAL_SECONDS: u64 = 86_400;

// =============================================================================
// Overrides from the command line
// =============================================================================

/// Values given on the command line; `None` means "not given".
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub port: Option<u16>,
    pub bind: Option<IpAddr>,
    pub interval_seconds: Option<u64>,
    pub max_concurrent_accounts: Option<usize>,
    pub reset_each_cycle: bool,
    pub no_authorize: bool,
    pub accounts_file: Option<PathBuf>,
    pub callback_port: Option<u16>,
    pub callback_timeout_seconds: Option<u64>,
    pub no_browser: bool,
}

impl ConfigOverrides {
    /// Overrides for the `serve` command.
    #[must_use]
    pub fn from_serve(config_file: Option<PathBuf>, args: &ServeArgs) -> Self {
        Self {
            config_file,
            port: args.port,
            bind: args.bind,
            interval_seconds: args.interval,
            max_concurrent_accounts: args.concurrency,
            reset_each_cycle: args.reset_each_cycle,
            no_authorize: args.no_authorize,
            accounts_file: args.accounts_file.clone(),
            ..Self::default()
        }
    }

    /// Overrides for the `auth` command.
    #[must_use]
    pub fn from_auth(config_file: Option<PathBuf>, args: &AuthArgs) -> Self {
        Self {
            config_file,
            accounts_file: args.accounts_file.clone(),
            callback_port: args.port,
            callback_timeout_seconds: args.timeout,
            no_browser: args.no_browser,
            ..Self::default()
        }
    }
}

// =============================================================================
// Resolved Configuration
// =============================================================================

/// Poll loop settings.
#[derive(Debug, Clone)]
pub struct PollerSettings {
    /// Sleep between cycles.
    pub interval: Duration,
    /// Accounts processed at once within a cycle.
    pub max_concurrent_accounts: usize,
    /// Clear every series before applying a cycle's results.
    pub reset_each_cycle: bool,
    /// Run the interactive authorizer at startup if no credential file exists.
    pub authorize_if_missing: bool,
}

/// Interactive authorization settings.
#[derive(Debug, Clone)]
pub struct AuthorizeSettings {
    pub callback_port: u16,
    pub timeout: Duration,
    pub open_browser: bool,
}

/// Fully resolved configuration after merging CLI, env vars, and config file.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub poller: PollerSettings,
    /// Metrics endpoint address.
    pub listen: SocketAddr,
    pub accounts: AccountsLocation,
    pub endpoints: EndpointsConfig,
    pub authorize: AuthorizeSettings,
    /// Source of each setting for debugging.
    pub sources: ConfigSources,
}

/// Tracks the source of each configuration value.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    pub port: ConfigSource,
    pub interval: ConfigSource,
    pub accounts_file: ConfigSource,
}

/// Where a configuration value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConfigSource {
    /// Value from CLI flag.
    Cli,
    /// Value from environment variable.
    Env,
    /// Value from config file.
    ConfigFile,
    /// Built-in default.
    #[default]
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cli => write!(f, "CLI flag"),
            Self::Env => write!(f, "environment variable"),
            Self::ConfigFile => write!(f, "config file"),
            Self::Default => write!(f, "default"),
        }
    }
}

impl ResolvedConfig {
    /// Resolve final configuration from CLI overrides, the process
    /// environment, and the config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but is invalid, or if any
    /// resolved value is out of range.
    pub fn resolve(overrides: &ConfigOverrides) -> Result<Self> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::resolve_with(overrides, &AppPaths::new(), &cwd, |key| {
            std::env::var(key).ok()
        })
    }

    /// Resolve with an explicit environment lookup and directories.
    ///
    /// # Errors
    ///
    /// Same as [`ResolvedConfig::resolve`].
    pub fn resolve_with(
        overrides: &ConfigOverrides,
        paths: &AppPaths,
        cwd: &Path,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let config = match overrides
            .config_file
            .clone()
            .or_else(|| non_empty(env(ENV_CONFIG)).map(PathBuf::from))
        {
            Some(path) => Config::load_from(&path)?,
            None => Config::load_from(&paths.config_file())?,
        };
        config.validate()?;

        let mut sources = ConfigSources::default();

        let port = Self::resolve_port(overrides, &config, &env, &mut sources.port)?;
        let bind = overrides.bind.unwrap_or(config.server.bind);
        let interval_seconds =
            Self::resolve_interval(overrides, &config, &env, &mut sources.interval)?;
        let accounts =
            Self::resolve_accounts(overrides, &config, &env, paths, cwd, &mut sources.accounts_file);

        let max_concurrent_accounts = overrides
            .max_concurrent_accounts
            .unwrap_or(config.poller.max_concurrent_accounts);
        if max_concurrent_accounts == 0 {
            return Err(AgqError::Config(
                "Concurrency must be at least 1".to_string(),
            ));
        }

        let resolved = Self {
            poller: PollerSettings {
                interval: Duration::from_secs(interval_seconds),
                max_concurrent_accounts,
                reset_each_cycle: overrides.reset_each_cycle || config.poller.reset_each_cycle,
                authorize_if_missing: !overrides.no_authorize && config.poller.authorize_if_missing,
            },
            listen: SocketAddr::new(bind, port),
            accounts,
            endpoints: config.endpoints.clone(),
            authorize: AuthorizeSettings {
                callback_port: overrides
                    .callback_port
                    .unwrap_or(config.authorize.callback_port),
                timeout: Duration::from_secs(
                    overrides
                        .callback_timeout_seconds
                        .unwrap_or(config.authorize.timeout_seconds),
                ),
                open_browser: !overrides.no_browser && config.authorize.open_browser,
            },
            sources,
        };

        tracing::debug!(
            listen = %resolved.listen,
            port_source = %resolved.sources.port,
            interval_secs = interval_seconds,
            interval_source = %resolved.sources.interval,
            accounts_source = %resolved.sources.accounts_file,
            "Resolved configuration"
        );

        Ok(resolved)
    }

    fn resolve_port(
        overrides: &ConfigOverrides,
        config: &Config,
        env: &impl Fn(&str) -> Option<String>,
        source: &mut ConfigSource,
    ) -> Result<u16> {
        // 1. CLI flag
        if let Some(port) = overrides.port {
            *source = ConfigSource::Cli;
            return validate_port(port);
        }

        // 2. Environment variable
        if let Some(raw) = non_empty(env(ENV_PORT)) {
            *source = ConfigSource::Env;
            let port = raw.parse::<u16>().map_err(|_| {
                AgqError::Config(format!("Invalid {ENV_PORT} value '{raw}'"))
            })?;
            return validate_port(port);
        }

        // 3. Config file (defaults live in ServerConfig)
        *source = ConfigSource::ConfigFile;
        Ok(config.server.port)
    }

    fn resolve_interval(
        overrides: &ConfigOverrides,
        config: &Config,
        env: &impl Fn(&str) -> Option<String>,
        source: &mut ConfigSource,
    ) -> Result<u64> {
        if let Some(secs) = overrides.interval_seconds {
            *source = ConfigSource::Cli;
            return validate_interval(secs);
        }

        if let Some(raw) = non_empty(env(ENV_INTERVAL)) {
            *source = ConfigSource::Env;
            let secs = raw.parse::<u64>().map_err(|_| {
                AgqError::Config(format!("Invalid {ENV_INTERVAL} value '{raw}'"))
            })?;
            return validate_interval(secs);
        }

        *source = ConfigSource::ConfigFile;
        Ok(config.poller.interval_seconds)
    }

    fn resolve_accounts(
        overrides: &ConfigOverrides,
        config: &Config,
        env: &impl Fn(&str) -> Option<String>,
        paths: &AppPaths,
        cwd: &Path,
        source: &mut ConfigSource,
    ) -> AccountsLocation {
        if let Some(path) = &overrides.accounts_file {
            *source = ConfigSource::Cli;
            return AccountsLocation::Fixed(path.clone());
        }

        if let Some(path) = non_empty(env(ENV_ACCOUNTS_FILE)) {
            *source = ConfigSource::Env;
            return AccountsLocation::Fixed(PathBuf::from(path));
        }

        if let Some(path) = &config.accounts.file {
            *source = ConfigSource::ConfigFile;
            return AccountsLocation::Fixed(path.clone());
        }

        *source = ConfigSource::Default;
        AccountsLocation::Search(paths.accounts_search_path(cwd))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_port(port: u16) -> Result<u16> {
    if port == 0 {
        return Err(AgqError::Config("Port must be between 1 and 65535".to_string()));
    }
    Ok(port)
}

fn validate_interval(secs: u64) -> Result<u64> {
    if secs == 0 || secs > MAX_INTERVAL_SECONDS {
        return Err(AgqError::Config(format!(
            "Interval must be between 1 and {MAX_INTERVAL_SECONDS} seconds"
        )));
    }
    Ok(secs)
}

// =============================================================================
// File Configuration
// =============================================================================

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub poller: PollerConfig,
    pub server: ServerConfig,
    pub accounts: AccountsConfig,
    pub endpoints: EndpointsConfig,
    pub authorize: AuthorizeConfig,
}

/// Poll loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Seconds between poll cycles.
    pub interval_seconds: u64,
    /// Accounts processed at once; 1 means sequential.
    pub max_concurrent_accounts: usize,
    /// Clear every series before each cycle.
    pub reset_each_cycle: bool,
    /// Start interactive authorization when no credential file exists.
    pub authorize_if_missing: bool,
}

/// Metrics endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: IpAddr,
    pub port: u16,
}

/// Credential file settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountsConfig {
    /// Explicit credential file; disables the default search when set.
    pub file: Option<PathBuf>,
}

/// Remote endpoints. Only worth changing for testing against a mock.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub token_url: String,
    pub quota_url: String,
    pub auth_url: String,
    pub userinfo_url: String,
}

/// Interactive authorization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizeConfig {
    /// Local callback port; the OAuth client's redirect URI must match.
    pub callback_port: u16,
    pub timeout_seconds: u64,
    pub open_browser: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
            max_concurrent_accounts: 1,
            reset_each_cycle: false,
            authorize_if_missing: true,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8000,
        }
    }
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            token_url: oauth::TOKEN_URL.to_string(),
            quota_url: quota::QUOTA_URL.to_string(),
            auth_url: authorize::AUTH_URL.to_string(),
            userinfo_url: authorize::USERINFO_URL.to_string(),
        }
    }
}

impl Default for AuthorizeConfig {
    fn default() -> Self {
        Self {
            callback_port: 8080,
            timeout_seconds: 300,
            open_browser: true,
        }
    }
}

impl Config {
    /// Load configuration from a specific path.
    ///
    /// Returns default config if the file doesn't exist.
    /// Returns error only if the file exists but is invalid.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(?path, "Config file not found, using defaults");
            return Ok(Self::default());
        }

        tracing::debug!(?path, "Loading config file");
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| AgqError::Config(format!("Invalid config file: {e}")))?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns an error naming the first out-of-range value.
    pub fn validate(&self) -> Result<()> {
        validate_interval(self.poller.interval_seconds)?;
        validate_port(self.server.port)?;

        if self.poller.max_concurrent_accounts == 0 {
            return Err(AgqError::Config(
                "max_concurrent_accounts must be at least 1".to_string(),
            ));
        }
        if self.authorize.callback_port == 0 {
            return Err(AgqError::Config(
                "callback_port must be between 1 and 65535".to_string(),
            ));
        }
        if self.authorize.timeout_seconds == 0 {
            return Err(AgqError::Config(
                "Authorization timeout must be greater than 0 seconds".to_string(),
            ));
        }
        for (key, url) in [
            ("token_url", &self.endpoints.token_url),
            ("quota_url", &self.endpoints.quota_url),
            ("auth_url", &self.endpoints.auth_url),
            ("userinfo_url", &self.endpoints.userinfo_url),
        ] {
            url::Url::parse(url)
                .map_err(|e| AgqError::Config(format!("Invalid endpoints.{key} '{url}': {e}")))?;
        }

        Ok(())
    }
}
