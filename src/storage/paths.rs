//! Application paths for config and the credential file.

use directories::ProjectDirs;
use std::path::{Path, PathBuf};

/// File name of the shared credential file.
pub const ACCOUNTS_FILE_NAME: &str = "antigravity-accounts.json";

/// Application paths.
pub struct AppPaths {
    /// Configuration directory.
    pub config: PathBuf,
    /// Home directory, used for the per-user credential fallback.
    pub home: PathBuf,
}

impl AppPaths {
    /// Create paths for the agquota application.
    #[must_use]
    pub fn new() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        if let Some(proj_dirs) = ProjectDirs::from("dev", "agquota", "agquota") {
            Self {
                config: proj_dirs.config_dir().to_path_buf(),
                home,
            }
        } else {
            Self {
                config: home.join(".config/agquota"),
                home,
            }
        }
    }

    /// Path to the TOML config file.
    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    /// Credential file next to the working directory.
    #[must_use]
    pub fn local_accounts_file(cwd: &Path) -> PathBuf {
        cwd.join(ACCOUNTS_FILE_NAME)
    }

    /// Per-user credential file shared with the opencode plugin.
    #[must_use]
    pub fn user_accounts_file(&self) -> PathBuf {
        self.home
            .join(".config")
            .join("opencode")
            .join(ACCOUNTS_FILE_NAME)
    }

    /// Candidate credential files in lookup order.
    #[must_use]
    pub fn accounts_search_path(&self, cwd: &Path) -> Vec<PathBuf> {
        vec![Self::local_accounts_file(cwd), self.user_accounts_file()]
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}

/// Module-level function for accessing dirs crate.
mod dirs {
    use std::path::PathBuf;

    pub fn home_dir() -> Option<PathBuf> {
        directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_path_prefers_working_directory() {
        let paths = AppPaths {
            config: PathBuf::from("/cfg"),
            home: PathBuf::from("/home/op"),
        };
        let search = paths.accounts_search_path(Path::new("/srv/exporter"));
        assert_eq!(
            search,
            vec![
                PathBuf::from("/srv/exporter/antigravity-accounts.json"),
                PathBuf::from("/home/op/.config/opencode/antigravity-accounts.json"),
            ]
        );
    }
}
