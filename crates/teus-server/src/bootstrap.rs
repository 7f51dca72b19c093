//! Startup bootstrap of the configured admin account.

use teus_auth::{AuthResult, Role};
use tracing::info;

use crate::accounts::UserAccounts;
use crate::config::AdminUserConfig;

/// Outcome of [`bootstrap_admin_user`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    Created,
    AlreadyExists,
}

/// Creates the admin account if no account with its email exists.
///
/// An existing account is left untouched, including its role and password.
///
/// # Errors
///
/// Returns an error if the account cannot be registered.
pub async fn bootstrap_admin_user(
    accounts: &UserAccounts,
    admin: &AdminUserConfig,
) -> AuthResult<BootstrapOutcome> {
    if accounts.contains(&admin.email) {
        info!(email = %admin.email, "Admin user already exists");
        return Ok(BootstrapOutcome::AlreadyExists);
    }

    accounts
        .register(&admin.email, &admin.password, &admin.full_name, Role::Admin)
        .await?;
    info!(email = %admin.email, "Admin user created");
    Ok(BootstrapOutcome::Created)
}
