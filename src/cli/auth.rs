//! Auth command: authorize one account in the browser and store it.

use std::path::PathBuf;

use crate::cli::args::AuthArgs;
use crate::core::authorize::Authorizer;
use crate::core::oauth::{OAuthClient, TokenRefresher};
use crate::error::{AgqError, Result};
use crate::storage::accounts::Upsert;
use crate::storage::config::{ConfigOverrides, ResolvedConfig};

/// Execute the auth command.
///
/// # Errors
/// Returns any configuration, callback or token exchange error.
pub async fn execute(config_file: Option<PathBuf>, args: &AuthArgs) -> Result<()> {
    let config = ResolvedConfig::resolve(&ConfigOverrides::from_auth(config_file, args))?;
    let target = config
        .accounts
        .write_target()
        .ok_or_else(|| AgqError::Config("no credential file location".to_string()))?;

    let refresher = TokenRefresher::new(OAuthClient::from_env()?, &config.endpoints.token_url)?;
    let authorizer = Authorizer::new(refresher, &config.endpoints, config.authorize.clone())?;

    let account = authorizer.authorize(&target).await?;
    let verb = match account.upsert {
        Upsert::Inserted => "Added",
        Upsert::Replaced => "Updated",
    };
    println!(
        "{verb} refresh token for {} in {}",
        account.email,
        account.path.display()
    );
    Ok(())
}
