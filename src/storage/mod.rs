//! Storage for configuration and the credential file.

pub mod accounts;
pub mod config;
pub mod paths;

pub use accounts::{Account, AccountStore, AccountsFile, AccountsLocation, Upsert};
pub use config::{
    Config, ConfigOverrides, ConfigSource, ConfigSources, ResolvedConfig, ENV_ACCOUNTS_FILE,
    ENV_CONFIG, ENV_INTERVAL, ENV_PORT,
};
pub use paths::AppPaths;
