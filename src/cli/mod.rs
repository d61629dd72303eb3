//! CLI argument parsing and command dispatch.

pub mod accounts;
pub mod args;
pub mod auth;
pub mod serve;

pub use args::{AccountsCommand, AuthArgs, Cli, Commands, ServeArgs};
