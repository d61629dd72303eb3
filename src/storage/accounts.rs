//! Credential file storage.
//!
//! The file is shared with other tools, so unknown fields are carried through
//! a rewrite untouched:
//!
//! ```json
//! {"accounts": [{"email": "a@example.com", "refresh_token": "1//0g..."}]}
//! ```

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{AgqError, Result};

/// Label used for accounts whose entry has no email.
pub const UNKNOWN_ACCOUNT: &str = "unknown";

/// A single stored account.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Account {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Account {
    /// Create an account entry.
    #[must_use]
    pub fn new(email: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            email: Some(email.into()),
            refresh_token: Some(refresh_token.into()),
            extra: Map::new(),
        }
    }

    /// Identity used in logs and metric labels.
    #[must_use]
    pub fn label(&self) -> &str {
        self.email
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .unwrap_or(UNKNOWN_ACCOUNT)
    }

    /// The refresh credential, if present and non-blank.
    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("email", &self.email)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .finish_non_exhaustive()
    }
}

/// Root credential file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountsFile {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Result of [`AccountStore::upsert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    /// A new entry was appended.
    Inserted,
    /// An entry with the same email had its refresh token replaced.
    Replaced,
}

/// Where the credential file lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountsLocation {
    /// Explicitly configured file; no fallback.
    Fixed(PathBuf),
    /// First existing file wins.
    Search(Vec<PathBuf>),
}

impl AccountsLocation {
    /// First existing candidate.
    #[must_use]
    pub fn resolve(&self) -> Option<PathBuf> {
        match self {
            Self::Fixed(path) => path.exists().then(|| path.clone()),
            Self::Search(candidates) => candidates.iter().find(|p| p.exists()).cloned(),
        }
    }

    /// Whether any credential file exists.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.resolve().is_some()
    }

    /// File the authorizer writes to: the fixed path, else the file that is
    /// currently polled, else the first candidate.
    #[must_use]
    pub fn write_target(&self) -> Option<PathBuf> {
        match self {
            Self::Fixed(path) => Some(path.clone()),
            Self::Search(candidates) => self.resolve().or_else(|| candidates.first().cloned()),
        }
    }

    /// Read the credential file fresh from disk.
    ///
    /// # Errors
    /// Returns [`AgqError::AccountsNotFound`] if no candidate exists, or a
    /// parse/I/O error for the file that does.
    pub fn load(&self) -> Result<AccountStore> {
        let path = self.resolve().ok_or_else(|| AgqError::AccountsNotFound {
            searched: self.describe(),
        })?;
        AccountStore::read(&path)
    }

    fn describe(&self) -> String {
        let paths: Vec<&PathBuf> = match self {
            Self::Fixed(path) => vec![path],
            Self::Search(candidates) => candidates.iter().collect(),
        };
        paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Credential store backed by one JSON file.
#[derive(Debug)]
pub struct AccountStore {
    data: AccountsFile,
    path: PathBuf,
}

impl AccountStore {
    /// Read an existing file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid JSON.
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let data: AccountsFile =
            serde_json::from_str(&content).map_err(|e| AgqError::AccountsParse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        tracing::debug!(path = %path.display(), accounts = data.accounts.len(), "Loaded accounts file");
        Ok(Self {
            data,
            path: path.to_path_buf(),
        })
    }

    /// Load from file or start empty if it does not exist yet.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::read(path)
        } else {
            Ok(Self {
                data: AccountsFile::default(),
                path: path.to_path_buf(),
            })
        }
    }

    /// All stored accounts.
    #[must_use]
    pub fn accounts(&self) -> &[Account] {
        &self.data.accounts
    }

    /// Consume the store, keeping only the account list.
    #[must_use]
    pub fn into_accounts(self) -> Vec<Account> {
        self.data.accounts
    }

    /// Backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert an account or replace the refresh token of the entry with the
    /// same email. Other fields of a replaced entry are kept.
    pub fn upsert(&mut self, email: &str, refresh_token: &str) -> Upsert {
        if let Some(existing) = self
            .data
            .accounts
            .iter_mut()
            .find(|a| a.email.as_deref() == Some(email))
        {
            existing.refresh_token = Some(refresh_token.to_string());
            Upsert::Replaced
        } else {
            self.data.accounts.push(Account::new(email, refresh_token));
            Upsert::Inserted
        }
    }

    /// Save to file.
    ///
    /// # Errors
    /// Returns an error if the parent directory cannot be created, serialization fails,
    /// or the file cannot be written.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(&self.data)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}
