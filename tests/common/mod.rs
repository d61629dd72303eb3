//! Shared helpers for integration tests.
//!
//! - `logger`: per-test structured progress output
//! - `log_capture`: capture `tracing` events for assertions
//! - `mock`: wiremock setups for the Google token and quota endpoints

#![allow(dead_code)]

pub mod log_capture;
pub mod logger;
pub mod mock;
