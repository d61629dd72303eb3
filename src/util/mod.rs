//! Utility functions.

pub mod time;

pub use time::parse_reset_time;
