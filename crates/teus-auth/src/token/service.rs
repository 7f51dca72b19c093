//! Token service for issuing, validating, rotating and revoking tokens.
//!
//! Composes the [`JwtService`] codec with a [`RevocationStore`] and a
//! [`UserDirectory`]:
//!
//! - Access tokens carry `{sub, role}` and are short-lived.
//! - Refresh tokens carry only `{sub}` and can only be exchanged for a new
//!   access token.
//! - Every authenticated request and every rotation re-reads the subject's
//!   role from the directory, so role changes and deletions apply at once.
//! - Revocation puts an access token into the revocation store until its
//!   natural expiry. Refresh tokens are not revoked on logout.
//!
//! # Usage
//!
//! ```ignore
//! use teus_auth::token::{TokenConfig, TokenService};
//!
//! let service = TokenService::new(jwt_service, revocations, directory, TokenConfig::default());
//!
//! let pair = service.issue_token_pair("alice@teus.pt", Role::User)?;
//! let principal = service.validate_access_token(&pair.access_token).await?;
//! ```

use std::sync::Arc;

use time::Duration;

use crate::AuthResult;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::storage::{DirectoryEntry, RevocationStore, UserDirectory, revocation_key};
use crate::token::jwt::{JwtService, TokenGrant};
use crate::types::{Principal, Role};

/// Configuration for the token service.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    /// Access token lifetime.
    pub access_token_lifetime: Duration,

    /// Refresh token lifetime.
    pub refresh_token_lifetime: Duration,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            access_token_lifetime: Duration::hours(1),
            refresh_token_lifetime: Duration::days(7),
        }
    }
}

impl TokenConfig {
    /// Sets the access token lifetime.
    #[must_use]
    pub fn with_access_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.access_token_lifetime = lifetime;
        self
    }
}

impl From<&AuthConfig> for TokenConfig {
    fn from(config: &AuthConfig) -> Self {
        Self {
            access_token_lifetime: to_time_duration(config.tokens.access_token_lifetime),
            refresh_token_lifetime: to_time_duration(config.tokens.refresh_token_lifetime),
        }
    }
}

fn to_time_duration(duration: std::time::Duration) -> Duration {
    Duration::seconds(i64::try_from(duration.as_secs()).unwrap_or(i64::MAX))
}

/// Tokens returned by a successful login.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Token service.
pub struct TokenService {
    jwt_service: Arc<JwtService>,
    revocations: Arc<dyn RevocationStore>,
    directory: Arc<dyn UserDirectory>,
    config: TokenConfig,
}

impl TokenService {
    /// Creates a new token service.
    #[must_use]
    pub fn new(
        jwt_service: Arc<JwtService>,
        revocations: Arc<dyn RevocationStore>,
        directory: Arc<dyn UserDirectory>,
        config: TokenConfig,
    ) -> Self {
        Self {
            jwt_service,
            revocations,
            directory,
            config,
        }
    }

    /// Returns the access token lifetime in seconds.
    #[must_use]
    pub fn access_token_expires_in(&self) -> i64 {
        self.config.access_token_lifetime.whole_seconds()
    }

    /// Issues an access token for `subject` with `role`.
    ///
    /// # Errors
    /// Returns `Internal` if signing fails.
    pub fn issue_access_token(&self, subject: &str, role: Role) -> AuthResult<String> {
        let token = self.jwt_service.encode(
            &TokenGrant::access(subject, role),
            self.config.access_token_lifetime,
        )?;
        tracing::debug!(subject = %subject, role = %role, "Issued access token");
        Ok(token)
    }

    /// Issues a refresh token for `subject`. The token carries no role.
    ///
    /// # Errors
    /// Returns `Internal` if signing fails.
    pub fn issue_refresh_token(&self, subject: &str) -> AuthResult<String> {
        let token = self.jwt_service.encode(
            &TokenGrant::refresh(subject),
            self.config.refresh_token_lifetime,
        )?;
        tracing::debug!(subject = %subject, "Issued refresh token");
        Ok(token)
    }

    /// Issues an access token and a refresh token for a freshly
    /// authenticated subject.
    ///
    /// # Errors
    /// Returns `Internal` if signing fails.
    pub fn issue_token_pair(&self, subject: &str, role: Role) -> AuthResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.issue_access_token(subject, role)?,
            refresh_token: self.issue_refresh_token(subject)?,
            expires_in: self.access_token_expires_in(),
        })
    }

    /// Validates an access token and returns its principal.
    ///
    /// Checks, in order: structure and signature, expiry, revocation, and
    /// that the token is an access token.
    ///
    /// # Errors
    /// Returns `TokenMalformed`, `InvalidSignature`, `TokenExpired`,
    /// `TokenRevoked` or `TokenTypeMismatch`. A failing revocation store
    /// yields `Internal`.
    pub async fn validate_access_token(&self, token: &str) -> AuthResult<Principal> {
        let claims = self.jwt_service.decode(token).map_err(|e| {
            tracing::debug!(error = %e, "Access token rejected");
            AuthError::from(e)
        })?;

        if self.revocations.contains(&revocation_key(token)).await? {
            tracing::debug!(subject = %claims.sub, jti = %claims.jti, "Access token revoked");
            return Err(AuthError::TokenRevoked);
        }

        match claims.role {
            Some(role) if claims.is_access_token() => Ok(Principal::new(claims.sub, role)),
            _ => {
                tracing::debug!(subject = %claims.sub, "Non-access token presented as access token");
                Err(AuthError::TokenTypeMismatch)
            }
        }
    }

    /// Resolves the principal of a request from its access token.
    ///
    /// The token is validated first, then the subject is looked up in the
    /// directory and the directory's current role is used.
    ///
    /// # Errors
    /// Returns the access validation errors, `SubjectNotFound` if the user
    /// no longer exists, or `Internal` if the directory lookup fails.
    pub async fn resolve_principal(&self, access_token: &str) -> AuthResult<Principal> {
        let claimed = self.validate_access_token(access_token).await?;
        let entry = self.lookup_subject(&claimed.subject).await?;

        if entry.role != claimed.role {
            tracing::debug!(
                subject = %entry.subject,
                token_role = %claimed.role,
                role = %entry.role,
                "Role changed since token issuance"
            );
        }

        Ok(Principal::new(entry.subject, entry.role))
    }

    /// Validates a refresh token and returns its subject.
    ///
    /// Refresh tokens are not checked against the revocation store.
    ///
    /// # Errors
    /// Returns `TokenMalformed`, `InvalidSignature`, `TokenExpired` or
    /// `TokenTypeMismatch`.
    pub fn validate_refresh_token(&self, token: &str) -> AuthResult<String> {
        let claims = self.jwt_service.decode(token).map_err(|e| {
            tracing::debug!(error = %e, "Refresh token rejected");
            AuthError::from(e)
        })?;

        if !claims.is_refresh_token() {
            tracing::debug!(subject = %claims.sub, "Non-refresh token presented as refresh token");
            return Err(AuthError::TokenTypeMismatch);
        }

        Ok(claims.sub)
    }

    /// Exchanges a refresh token for a new access token.
    ///
    /// The role of the new token is read from the user directory, not from
    /// any earlier token.
    ///
    /// # Errors
    /// Returns the refresh validation errors, `SubjectNotFound` if the user
    /// no longer exists, or `Internal` if the directory lookup fails.
    pub async fn rotate_access_token(&self, refresh_token: &str) -> AuthResult<String> {
        let subject = self.validate_refresh_token(refresh_token)?;
        let entry = self.lookup_subject(&subject).await?;

        self.issue_access_token(&entry.subject, entry.role)
    }

    async fn lookup_subject(&self, subject: &str) -> AuthResult<DirectoryEntry> {
        self.directory
            .find_by_subject(subject)
            .await
            .map_err(|e| {
                tracing::error!(subject = %subject, error = %e, "User directory lookup failed");
                AuthError::internal(format!("user directory lookup failed: {e}"))
            })?
            .ok_or_else(|| {
                tracing::debug!(subject = %subject, "Token subject no longer exists");
                AuthError::SubjectNotFound
            })
    }

    /// Revokes an access token until its natural expiry.
    ///
    /// Tokens that are already expired are accepted, and revoking the same
    /// token twice succeeds.
    ///
    /// # Errors
    /// Returns `TokenMalformed` or `InvalidSignature` for tokens that are
    /// not ours, and `TokenTypeMismatch` for refresh tokens.
    pub async fn revoke(&self, access_token: &str) -> AuthResult<()> {
        let claims = self.jwt_service.decode_allow_expired(access_token)?;

        if !claims.is_access_token() {
            return Err(AuthError::TokenTypeMismatch);
        }

        let expires_at = claims.expires_at()?;
        self.revocations
            .add(&revocation_key(access_token), expires_at)
            .await?;

        tracing::info!(subject = %claims.sub, jti = %claims.jti, "Access token revoked");
        Ok(())
    }
}
