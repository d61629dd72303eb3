//! Prometheus gauges for per-account model quotas.
//!
//! Three families share the `account` and `model` labels. Values are
//! overwritten in place and series are never removed implicitly, so a model
//! that disappears from the provider response keeps its last value until the
//! process restarts or [`QuotaMetrics::reset`] is called. A changed
//! `display_name` likewise starts a new availability series next to the old
//! one.

use std::borrow::Cow;
use std::sync::{Mutex, PoisonError};

use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

use crate::core::quota::ModelMap;
use crate::error::{AgqError, Result};
use crate::util::time::parse_reset_time;

/// 1 when a model is listed for the account.
pub const MODEL_AVAILABLE: &str = "antigravity_model_available";
/// Remaining quota fraction.
pub const REMAINING_FRACTION: &str = "antigravity_token_quota_remaining_fraction";
/// Quota reset time in epoch seconds.
pub const RESET_TIME: &str = "antigravity_token_quota_reset_time_seconds";

/// Content type of [`QuotaMetrics::encode`] output.
pub const CONTENT_TYPE: &str = prometheus::TEXT_FORMAT;

/// What one [`QuotaMetrics::apply_account`] call wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub models: usize,
    pub fractions_set: usize,
    pub reset_times_set: usize,
    /// Reset times present but unparseable; their gauge was left untouched.
    pub reset_times_skipped: usize,
}

/// The exporter's metric registry. Shared as `Arc<QuotaMetrics>` between the
/// poller (writer) and the HTTP endpoint (reader).
pub struct QuotaMetrics {
    registry: Registry,
    available: GaugeVec,
    remaining_fraction: GaugeVec,
    reset_time: GaugeVec,
    // Serializes writers so one account's models land as a unit.
    write_lock: Mutex<()>,
}

impl QuotaMetrics {
    /// Create and register the gauge families.
    ///
    /// # Errors
    /// Returns an error if a family cannot be registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let available = GaugeVec::new(
            Opts::new(
                MODEL_AVAILABLE,
                "Indicates if a model is available to the account (1 for yes)",
            ),
            &["account", "model", "display_name"],
        )?;
        let remaining_fraction = GaugeVec::new(
            Opts::new(
                REMAINING_FRACTION,
                "Remaining token quota fraction (0.0 to 1.0)",
            ),
            &["account", "model"],
        )?;
        let reset_time = GaugeVec::new(
            Opts::new(RESET_TIME, "Epoch time when the token quota resets"),
            &["account", "model"],
        )?;

        registry.register(Box::new(available.clone()))?;
        registry.register(Box::new(remaining_fraction.clone()))?;
        registry.register(Box::new(reset_time.clone()))?;

        Ok(Self {
            registry,
            available,
            remaining_fraction,
            reset_time,
            write_lock: Mutex::new(()),
        })
    }

    /// Record one account's models. Idempotent: applying the same map twice
    /// leaves the same state as applying it once.
    pub fn apply_account(&self, account: &str, models: &ModelMap) -> UpdateSummary {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let account = label_value(account);
        let mut summary = UpdateSummary::default();

        for (model_id, info) in models {
            let model = label_value(model_id);
            let display_name = label_value(
                info.display_name
                    .as_deref()
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or(model_id),
            );

            self.available
                .with_label_values(&[account.as_ref(), model.as_ref(), display_name.as_ref()])
                .set(1.0);
            summary.models += 1;

            let Some(quota) = &info.quota_info else {
                continue;
            };

            if let Some(fraction) = quota.remaining_fraction.filter(|f| f.is_finite()) {
                self.remaining_fraction
                    .with_label_values(&[account.as_ref(), model.as_ref()])
                    .set(fraction);
                summary.fractions_set += 1;
            }

            if let Some(raw) = quota.reset_time.as_deref().filter(|r| !r.trim().is_empty()) {
                if let Some(epoch) = parse_reset_time(raw) {
                    self.reset_time
                        .with_label_values(&[account.as_ref(), model.as_ref()])
                        .set(epoch);
                    summary.reset_times_set += 1;
                } else {
                    tracing::debug!(account = %account, model = %model, reset_time = raw, "Could not parse reset time");
                    summary.reset_times_skipped += 1;
                }
            }
        }

        summary
    }

    /// Drop every series.
    pub fn reset(&self) {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.available.reset();
        self.remaining_fraction.reset();
        self.reset_time.reset();
    }

    /// Text exposition of all series.
    ///
    /// # Errors
    /// Returns an error if encoding fails.
    pub fn encode(&self) -> Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| AgqError::Other(e.into()))
    }

    /// Current value of a series, without creating it.
    #[must_use]
    pub fn value(&self, family: &str, labels: &[(&str, &str)]) -> Option<f64> {
        self.registry
            .gather()
            .iter()
            .find(|mf| mf.get_name() == family)?
            .get_metric()
            .iter()
            .find(|m| {
                m.get_label().len() == labels.len()
                    && labels.iter().all(|(name, value)| {
                        m.get_label()
                            .iter()
                            .any(|lp| lp.get_name() == *name && lp.get_value() == *value)
                    })
            })
            .map(|m| m.get_gauge().get_value())
    }

    #[must_use]
    pub fn available(&self, account: &str, model: &str, display_name: &str) -> Option<f64> {
        self.value(
            MODEL_AVAILABLE,
            &[
                ("account", account),
                ("model", model),
                ("display_name", display_name),
            ],
        )
    }

    #[must_use]
    pub fn remaining_fraction(&self, account: &str, model: &str) -> Option<f64> {
        self.value(REMAINING_FRACTION, &[("account", account), ("model", model)])
    }

    #[must_use]
    pub fn reset_time(&self, account: &str, model: &str) -> Option<f64> {
        self.value(RESET_TIME, &[("account", account), ("model", model)])
    }

    /// Number of live series across all families.
    #[must_use]
    pub fn series_count(&self) -> usize {
        self.registry
            .gather()
            .iter()
            .map(|mf| mf.get_metric().len())
            .sum()
    }
}

impl std::fmt::Debug for QuotaMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuotaMetrics")
            .field("series", &self.series_count())
            .finish_non_exhaustive()
    }
}

/// Replace control characters so a label value stays on one exposition line.
/// Quotes and backslashes are escaped by the encoder.
fn label_value(raw: &str) -> Cow<'_, str> {
    if raw.chars().any(char::is_control) {
        Cow::Owned(
            raw.chars()
                .map(|c| if c.is_control() { ' ' } else { c })
                .collect(),
        )
    } else {
        Cow::Borrowed(raw)
    }
}
