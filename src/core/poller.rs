//! Poll scheduler.
//!
//! One cycle reads the credential file, then for each account refreshes an
//! access token, fetches its models and writes the gauges. A failure at any
//! step skips that account only; the loop itself stops only on shutdown.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::{FutureExt, StreamExt, stream};

use crate::core::metrics::QuotaMetrics;
use crate::core::oauth::{RefreshFailure, RefreshOutcome, TokenRefresher};
use crate::core::quota::QuotaFetcher;
use crate::storage::accounts::{Account, AccountsLocation};
use crate::storage::config::PollerSettings;

/// What happened to one account in a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountOutcome {
    /// Gauges written for `models` models.
    Updated { models: usize },
    /// No usable refresh token in the credential file.
    MissingRefreshToken,
    RefreshFailed(RefreshFailure),
    /// The quota call failed or returned no models; previous values stand.
    NoData,
}

impl AccountOutcome {
    #[must_use]
    pub const fn is_updated(&self) -> bool {
        matches!(self, Self::Updated { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountReport {
    pub account: String,
    pub outcome: AccountOutcome,
}

/// Summary of one cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// False when the credential file could not be read; nothing else ran.
    pub accounts_loaded: bool,
    pub accounts: Vec<AccountReport>,
    pub elapsed: Duration,
}

impl CycleReport {
    #[must_use]
    pub fn updated(&self) -> usize {
        self.accounts.iter().filter(|r| r.outcome.is_updated()).count()
    }

    #[must_use]
    pub fn skipped(&self) -> usize {
        self.accounts.len() - self.updated()
    }

    /// Outcome for an account label, if it was part of the cycle.
    #[must_use]
    pub fn outcome(&self, account: &str) -> Option<&AccountOutcome> {
        self.accounts
            .iter()
            .find(|r| r.account == account)
            .map(|r| &r.outcome)
    }
}

pub struct Poller {
    accounts: AccountsLocation,
    refresher: TokenRefresher,
    fetcher: QuotaFetcher,
    metrics: Arc<QuotaMetrics>,
    settings: PollerSettings,
}

impl Poller {
    #[must_use]
    pub const fn new(
        accounts: AccountsLocation,
        refresher: TokenRefresher,
        fetcher: QuotaFetcher,
        metrics: Arc<QuotaMetrics>,
        settings: PollerSettings,
    ) -> Self {
        Self {
            accounts,
            refresher,
            fetcher,
            metrics,
            settings,
        }
    }

    #[must_use]
    pub const fn settings(&self) -> &PollerSettings {
        &self.settings
    }

    /// Run one full pass over the credential file.
    pub async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();

        let accounts = match self.accounts.load() {
            Ok(store) => store.into_accounts(),
            Err(e) => {
                tracing::error!(error = %e, code = e.error_code(), "Failed to load accounts; skipping cycle");
                return CycleReport {
                    accounts_loaded: false,
                    accounts: Vec::new(),
                    elapsed: started.elapsed(),
                };
            }
        };

        if self.settings.reset_each_cycle {
            self.metrics.reset();
        }

        let reports: Vec<AccountReport> = stream::iter(accounts)
            .map(|account| self.poll_account(account))
            .buffered(self.settings.max_concurrent_accounts.max(1))
            .collect()
            .await;

        let report = CycleReport {
            accounts_loaded: true,
            accounts: reports,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            accounts = report.accounts.len(),
            updated = report.updated(),
            skipped = report.skipped(),
            elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            "Poll cycle complete"
        );
        report
    }

    async fn poll_account(&self, account: Account) -> AccountReport {
        let label = account.label().to_string();
        let outcome = self.poll_one(&account, &label).await;
        AccountReport {
            account: label,
            outcome,
        }
    }

    async fn poll_one(&self, account: &Account, label: &str) -> AccountOutcome {
        let Some(refresh_token) = account.refresh_token() else {
            tracing::warn!(account = %label, "Skipping account without refresh token");
            return AccountOutcome::MissingRefreshToken;
        };

        let access = match self.refresher.refresh(refresh_token).await {
            RefreshOutcome::Refreshed(access) => access,
            RefreshOutcome::Failed(reason) => {
                tracing::error!(account = %label, reason = %reason, "Failed to refresh access token");
                return AccountOutcome::RefreshFailed(reason);
            }
        };

        let models = self.fetcher.fetch(&access, label).await;
        if models.is_empty() {
            tracing::warn!(account = %label, "No model data this cycle; keeping previous values");
            return AccountOutcome::NoData;
        }

        let summary = self.metrics.apply_account(label, &models);
        tracing::info!(
            account = %label,
            models = summary.models,
            fractions = summary.fractions_set,
            reset_times = summary.reset_times_set,
            reset_times_skipped = summary.reset_times_skipped,
            "Updated quota metrics"
        );
        AccountOutcome::Updated {
            models: summary.models,
        }
    }

    /// Poll until `shutdown` resolves. Shutdown interrupts both an in-flight
    /// cycle and the sleep between cycles. A panicking cycle is logged and
    /// the loop carries on.
    pub async fn run<F>(&self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!(
            interval_secs = self.settings.interval.as_secs(),
            concurrency = self.settings.max_concurrent_accounts,
            "Poller started"
        );

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                result = AssertUnwindSafe(self.run_cycle()).catch_unwind() => {
                    if let Err(payload) = result {
                        tracing::error!(panic = %panic_message(payload.as_ref()), "Poll cycle panicked");
                    }
                }
            }

            tokio::select! {
                () = &mut shutdown => break,
                () = tokio::time::sleep(self.settings.interval) => {}
            }
        }

        tracing::info!("Poller stopped");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}
