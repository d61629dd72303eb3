//! CLI argument definitions using clap.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Antigravity quota exporter - serve per-account model quotas as Prometheus metrics.
#[derive(Parser, Debug)]
#[command(name = "agquota")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    // === Global flags ===
    /// Config file (default: platform config dir, or AGQUOTA_CONFIG)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Emit JSONL logs to stderr
    #[arg(long, global = true)]
    pub json_output: bool,

    /// Verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve metrics and poll quotas forever (default command)
    Serve(ServeArgs),

    /// Authorize a Google account and store its refresh token
    Auth(AuthArgs),

    /// Inspect the credential file
    #[command(subcommand)]
    Accounts(AccountsCommand),
}

/// Arguments for the `serve` command.
#[derive(Parser, Debug, Default, Clone)]
pub struct ServeArgs {
    /// Metrics port
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Metrics bind address
    #[arg(long, value_name = "ADDR")]
    pub bind: Option<IpAddr>,

    /// Seconds between poll cycles
    #[arg(long, value_name = "SECONDS")]
    pub interval: Option<u64>,

    /// Accounts polled at the same time
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Clear all series before each cycle instead of keeping stale values
    #[arg(long)]
    pub reset_each_cycle: bool,

    /// Do not start interactive authorization when no accounts file exists
    #[arg(long)]
    pub no_authorize: bool,

    /// Run a single poll cycle, then exit
    #[arg(long)]
    pub once: bool,

    /// Credential file (disables the default search)
    #[arg(long, value_name = "PATH")]
    pub accounts_file: Option<PathBuf>,
}

/// Arguments for the `auth` command.
#[derive(Parser, Debug, Default, Clone)]
pub struct AuthArgs {
    /// Local callback port (must match the OAuth client's redirect URI)
    #[arg(long, value_name = "PORT")]
    pub port: Option<u16>,

    /// Print the authorization URL without opening a browser
    #[arg(long)]
    pub no_browser: bool,

    /// Seconds to wait for the browser callback
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Credential file to update
    #[arg(long, value_name = "PATH")]
    pub accounts_file: Option<PathBuf>,
}

/// Credential file subcommands.
#[derive(Subcommand, Debug)]
pub enum AccountsCommand {
    /// List stored accounts (tokens are never printed)
    List {
        /// Credential file (disables the default search)
        #[arg(long, value_name = "PATH")]
        accounts_file: Option<PathBuf>,
    },
}
