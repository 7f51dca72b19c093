//! User directory lookup.
//!
//! The token service never stores users. It asks an external directory for
//! the current role of a subject on every authenticated request and when
//! rotating an access token.

use async_trait::async_trait;

use crate::AuthResult;
use crate::types::Role;

/// A user record as seen by the auth gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Unique user handle.
    pub subject: String,

    /// Current role.
    pub role: Role,
}

impl DirectoryEntry {
    #[must_use]
    pub fn new(subject: impl Into<String>, role: Role) -> Self {
        Self {
            subject: subject.into(),
            role,
        }
    }
}

/// Directory of user records keyed by subject.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Finds a user by subject.
    ///
    /// Returns `Ok(None)` if no such user exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup itself fails.
    async fn find_by_subject(&self, subject: &str) -> AuthResult<Option<DirectoryEntry>>;
}
