//! Polling, OAuth, quota fetching and the metrics endpoint.

pub mod authorize;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod oauth;
pub mod poller;
pub mod quota;
pub mod server;

pub use authorize::{AuthorizedAccount, Authorizer, Callback, CallbackListener};
pub use metrics::{QuotaMetrics, UpdateSummary};
pub use oauth::{AccessToken, OAuthClient, RefreshFailure, RefreshOutcome, TokenRefresher};
pub use poller::{AccountOutcome, AccountReport, CycleReport, Poller};
pub use quota::{ModelInfo, ModelMap, QuotaFetcher, QuotaInfo};
pub use server::MetricsServer;
