//! agquota - Antigravity quota exporter
//!
//! Polls per-account model quotas from Google's Cloud Code API using stored
//! OAuth refresh tokens and exposes them as Prometheus gauges.

// Note: deny (not forbid) to allow #[allow(unsafe_code)] in test helpers for env var manipulation
#![deny(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod core;
pub mod error;
pub mod storage;
pub mod util;

/// Test utilities module - included in test builds or when test-utils feature is enabled.
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{AgqError, ExitCode, Result};
