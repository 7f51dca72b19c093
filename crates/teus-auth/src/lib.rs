//! # teus-auth
//!
//! Token authentication and role-based authorization for the Teus server.
//!
//! This crate provides:
//! - Signed, expiring access and refresh tokens (HS256, RS256, ES384)
//! - A concurrent revocation store with a background sweeper
//! - An axum authentication gate that attaches a principal per request
//! - Declarative per-endpoint access rules
//!
//! ## Modules
//!
//! - [`config`] - Signing, lifetime and sweep configuration
//! - [`token`] - Token codec and token lifecycle service
//! - [`storage`] - Revocation store and user directory traits
//! - [`middleware`] - Authentication gate, extractors and error responses
//! - [`policy`] - Access rules and their route-layer middleware
//! - [`types`] - Roles and principals

pub mod config;
pub mod error;
pub mod middleware;
pub mod policy;
pub mod storage;
pub mod token;
pub mod types;

pub use config::{AuthConfig, ConfigError};
pub use error::AuthError;
pub use middleware::{AuthContext, AuthState, CurrentPrincipal, TokenRejection};
pub use policy::{AccessRule, require_rule};
pub use storage::{
    DirectoryEntry, InMemoryRevocationStore, RevocationStore, UserDirectory,
    spawn_revocation_sweeper,
};
pub use token::{JwtService, SigningAlgorithm, SigningKeyPair, TokenConfig, TokenPair, TokenService};
pub use types::{Principal, Role};

/// Type alias for authentication/authorization results.
pub type AuthResult<T> = Result<T, AuthError>;

/// Prelude module for convenient imports.
///
/// ```ignore
/// use teus_auth::prelude::*;
/// ```
pub mod prelude {
    pub use crate::AuthResult;
    pub use crate::config::{AuthConfig, ConfigError};
    pub use crate::error::AuthError;
    pub use crate::middleware::{
        AuthContext, AuthState, CurrentPrincipal, authentication_middleware,
    };
    pub use crate::policy::{AccessRule, require_rule};
    pub use crate::storage::{
        DirectoryEntry, InMemoryRevocationStore, RevocationStore, UserDirectory,
    };
    pub use crate::token::{TokenConfig, TokenPair, TokenService};
    pub use crate::types::{Principal, Role};
}
