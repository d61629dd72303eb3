//! agquota - Antigravity quota exporter
//!
//! CLI entry point.

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

use clap::Parser;
use std::process::ExitCode;

use agquota::cli::{Cli, Commands, ServeArgs};
use agquota::core::logging::{self, LogSettings};

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is normal; real environment variables take precedence.
    let dotenv = dotenvy::dotenv();

    let cli = Cli::parse();

    let settings = LogSettings::resolve(
        cli.log_level.as_deref(),
        cli.json_output,
        cli.verbose,
        |key| std::env::var(key).ok(),
    );
    logging::init(&settings);

    match &dotenv {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "Failed to load .env"),
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.error_code(), "{e}");
            eprintln!("error[{}]: {e}", e.error_code());
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

async fn run(cli: Cli) -> agquota::Result<()> {
    match cli.command {
        None => agquota::cli::serve::execute(cli.config, &ServeArgs::default()).await,
        Some(Commands::Serve(args)) => agquota::cli::serve::execute(cli.config, &args).await,
        Some(Commands::Auth(args)) => agquota::cli::auth::execute(cli.config, &args).await,
        Some(Commands::Accounts(cmd)) => agquota::cli::accounts::execute(cli.config, &cmd),
    }
}
