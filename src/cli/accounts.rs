//! Accounts command: inspect the credential file.

use std::fmt::Write as _;
use std::path::PathBuf;

use crate::cli::args::AccountsCommand;
use crate::error::Result;
use crate::storage::accounts::AccountStore;
use crate::storage::config::{ConfigOverrides, ResolvedConfig};

/// Execute an accounts subcommand.
///
/// # Errors
/// Returns an error if configuration is invalid or the credential file is
/// missing or unreadable.
pub fn execute(config_file: Option<PathBuf>, cmd: &AccountsCommand) -> Result<()> {
    match cmd {
        AccountsCommand::List { accounts_file } => {
            let overrides = ConfigOverrides {
                config_file,
                accounts_file: accounts_file.clone(),
                ..ConfigOverrides::default()
            };
            let config = ResolvedConfig::resolve(&overrides)?;
            let store = config.accounts.load()?;
            print!("{}", render_list(&store));
            Ok(())
        }
    }
}

/// Table of accounts. Refresh tokens are reported as present or missing only.
#[must_use]
pub fn render_list(store: &AccountStore) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Accounts file: {}", store.path().display());

    if store.accounts().is_empty() {
        out.push_str("No accounts configured.\n");
        return out;
    }

    let _ = writeln!(out, "{:<40} Refresh token", "Account");
    let _ = writeln!(out, "{:-<40} {:-<13}", "", "");
    for account in store.accounts() {
        let token = if account.refresh_token().is_some() {
            "present"
        } else {
            "missing"
        };
        let _ = writeln!(out, "{:<40} {token}", account.label());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lists_without_tokens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("antigravity-accounts.json");
        std::fs::write(
            &path,
            r#"{"accounts": [{"email": "a@example.com", "refresh_token": "1//secret"}, {"refresh_token": ""}]}"#,
        )
        .unwrap();

        let output = render_list(&AccountStore::read(&path).unwrap());

        assert!(output.contains("a@example.com"));
        assert!(output.contains("present"));
        assert!(output.contains("unknown"));
        assert!(output.contains("missing"));
        assert!(!output.contains("1//secret"));
    }

    #[test]
    fn empty_file_says_so() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("antigravity-accounts.json");
        std::fs::write(&path, r#"{"accounts": []}"#).unwrap();

        let output = render_list(&AccountStore::read(&path).unwrap());
        assert!(output.contains("No accounts configured."));
    }
}
