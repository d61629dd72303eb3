//! Serve command: metrics endpoint plus the poll loop.

use std::path::PathBuf;
use std::sync::Arc;

use crate::cli::args::ServeArgs;
use crate::core::authorize::Authorizer;
use crate::core::metrics::QuotaMetrics;
use crate::core::oauth::{OAuthClient, TokenRefresher};
use crate::core::poller::Poller;
use crate::core::quota::QuotaFetcher;
use crate::core::server::MetricsServer;
use crate::error::{AgqError, Result};
use crate::storage::config::{ConfigOverrides, ResolvedConfig};

/// Execute the serve command.
///
/// # Errors
/// Returns an error for invalid configuration, missing OAuth client
/// credentials, or an unavailable metrics port. Nothing after startup is
/// fatal.
pub async fn execute(config_file: Option<PathBuf>, args: &ServeArgs) -> Result<()> {
    let config = ResolvedConfig::resolve(&ConfigOverrides::from_serve(config_file, args))?;
    let oauth = OAuthClient::from_env()?;
    let metrics = Arc::new(QuotaMetrics::new()?);

    let refresher = TokenRefresher::new(oauth, &config.endpoints.token_url)?;
    let fetcher = QuotaFetcher::new(&config.endpoints.quota_url)?;

    if args.once {
        return run_once(&config, refresher, fetcher, metrics).await;
    }

    let server = MetricsServer::bind(config.listen, Arc::clone(&metrics)).await?;
    let server_task = server.spawn();

    if config.poller.authorize_if_missing && !config.accounts.exists() {
        authorize_at_startup(&refresher, &config).await;
    }

    let poller = Poller::new(
        config.accounts.clone(),
        refresher,
        fetcher,
        metrics,
        config.poller.clone(),
    );
    poller.run(shutdown_signal()).await;

    server_task.abort();
    Ok(())
}

/// One cycle, exposition to stdout. Meant for cron and textfile collectors.
async fn run_once(
    config: &ResolvedConfig,
    refresher: TokenRefresher,
    fetcher: QuotaFetcher,
    metrics: Arc<QuotaMetrics>,
) -> Result<()> {
    let poller = Poller::new(
        config.accounts.clone(),
        refresher,
        fetcher,
        Arc::clone(&metrics),
        config.poller.clone(),
    );
    let report = poller.run_cycle().await;
    if !report.accounts_loaded {
        return Err(config.accounts.load().err().unwrap_or_else(|| {
            AgqError::Config("credential file could not be loaded".to_string())
        }));
    }
    print!("{}", metrics.encode()?);
    Ok(())
}

async fn authorize_at_startup(refresher: &TokenRefresher, config: &ResolvedConfig) {
    let Some(target) = config.accounts.write_target() else {
        return;
    };
    tracing::warn!(path = %target.display(), "No accounts file found; starting interactive authorization");

    let result = match Authorizer::new(
        refresher.clone(),
        &config.endpoints,
        config.authorize.clone(),
    ) {
        Ok(authorizer) => authorizer.authorize(&target).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(account) => {
            tracing::info!(account = %account.email, path = %account.path.display(), "Authorization complete");
        }
        Err(e) => {
            tracing::error!(error = %e, code = e.error_code(), "Authorization failed; polling continues without accounts");
        }
    }
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    tracing::info!("Shutdown requested");
}
