//! Request-scoped authentication context.

use crate::error::AuthError;
use crate::policy::AccessRule;
use crate::types::Principal;

// =============================================================================
// Token Rejection
// =============================================================================

/// Why a presented bearer token did not produce a principal.
///
/// The gate never fails a request because of a bad token. It records the
/// reason so that a later 401 can say what was wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRejection {
    /// Header present but not `Bearer <token>`, or the token is unparseable.
    Malformed,
    /// The signature did not verify.
    InvalidSignature,
    /// The token is past its expiry.
    Expired,
    /// The token was revoked by a logout.
    Revoked,
    /// A refresh token was presented.
    WrongTokenType,
    /// The token is valid but its subject is no longer in the directory.
    UnknownSubject,
    /// The token could not be checked (e.g. revocation store failure).
    Unverifiable,
}

impl TokenRejection {
    /// Classifies a validation error.
    #[must_use]
    pub fn from_error(error: &AuthError) -> Self {
        match error {
            AuthError::TokenMalformed { .. } => Self::Malformed,
            AuthError::InvalidSignature => Self::InvalidSignature,
            AuthError::TokenExpired => Self::Expired,
            AuthError::TokenRevoked => Self::Revoked,
            AuthError::TokenTypeMismatch => Self::WrongTokenType,
            AuthError::SubjectNotFound => Self::UnknownSubject,
            _ => Self::Unverifiable,
        }
    }

    /// The error reported when an endpoint needed a principal.
    #[must_use]
    pub fn to_error(self) -> AuthError {
        match self {
            Self::Malformed => AuthError::malformed("Invalid Authorization header or token"),
            Self::InvalidSignature => AuthError::InvalidSignature,
            Self::Expired => AuthError::TokenExpired,
            Self::Revoked => AuthError::TokenRevoked,
            Self::WrongTokenType => AuthError::TokenTypeMismatch,
            Self::UnknownSubject => AuthError::SubjectNotFound,
            Self::Unverifiable => AuthError::unauthenticated("Token could not be verified"),
        }
    }
}

// =============================================================================
// Auth Context
// =============================================================================

/// Authentication outcome of one request.
///
/// Inserted into the request extensions by
/// [`authentication_middleware`](super::auth::authentication_middleware).
/// Anonymous contexts carry the rejection reason, if a token was presented.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthContext {
    principal: Option<Principal>,
    rejection: Option<TokenRejection>,
}

impl AuthContext {
    /// Context for a request without credentials.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Context for a request with a valid access token.
    #[must_use]
    pub fn authenticated(principal: Principal) -> Self {
        Self {
            principal: Some(principal),
            rejection: None,
        }
    }

    /// Anonymous context for a request whose token was not accepted.
    #[must_use]
    pub fn rejected(rejection: TokenRejection) -> Self {
        Self {
            principal: None,
            rejection: Some(rejection),
        }
    }

    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    #[must_use]
    pub fn rejection(&self) -> Option<TokenRejection> {
        self.rejection
    }

    /// Returns the principal or the 401 error explaining its absence.
    ///
    /// # Errors
    /// Returns the recorded token rejection, or `Unauthenticated` when no
    /// token was presented.
    pub fn require_principal(&self) -> Result<&Principal, AuthError> {
        match (&self.principal, self.rejection) {
            (Some(principal), _) => Ok(principal),
            (None, Some(rejection)) => Err(rejection.to_error()),
            (None, None) => Err(AuthError::unauthenticated("Authentication required")),
        }
    }

    /// Evaluates `rule` against this context.
    ///
    /// # Errors
    /// See [`AccessRule::evaluate`].
    pub fn authorize(&self, rule: &AccessRule) -> Result<Option<&Principal>, AuthError> {
        rule.evaluate(self)
    }
}
