//! Authentication and authorization error types.
//!
//! Every failure of the token codec, the token service, the gate and the
//! policy is expressed as an [`AuthError`]. The HTTP mapping lives in
//! [`crate::middleware::error`].

use crate::token::jwt::JwtError;

/// Errors that can occur during authentication and authorization operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Login failed. The message never says whether the subject or the
    /// secret was wrong.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The token could not be parsed or is not one of ours.
    #[error("Malformed token: {message}")]
    TokenMalformed {
        /// Description of why the token is malformed.
        message: String,
    },

    /// The token signature does not verify.
    #[error("Invalid token signature")]
    InvalidSignature,

    /// The token has expired.
    #[error("Token expired")]
    TokenExpired,

    /// The token has been explicitly revoked.
    #[error("Token revoked")]
    TokenRevoked,

    /// A refresh token was presented where an access token is required, or
    /// the other way round.
    #[error("Token type mismatch")]
    TokenTypeMismatch,

    /// The token subject no longer exists in the user directory.
    #[error("Subject not found")]
    SubjectNotFound,

    /// No principal is attached to the request.
    #[error("Unauthenticated: {message}")]
    Unauthenticated {
        /// Description of why the request is unauthenticated.
        message: String,
    },

    /// The principal's role does not satisfy the access rule.
    #[error("Insufficient role: {message}")]
    InsufficientRole {
        /// Description of the failed rule.
        message: String,
    },

    /// The principal may not act on the requested resource.
    #[error("Forbidden: {message}")]
    Forbidden {
        /// Description of why access is forbidden.
        message: String,
    },

    /// The request is invalid or malformed.
    #[error("Invalid request: {message}")]
    InvalidRequest {
        /// Description of why the request is invalid.
        message: String,
    },

    /// The requested resource does not exist.
    #[error("Not found: {message}")]
    NotFound {
        /// Description of the missing resource.
        message: String,
    },

    /// The resource already exists.
    #[error("Conflict: {message}")]
    Conflict {
        /// Description of the conflict.
        message: String,
    },

    /// An unexpected internal error occurred.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `TokenMalformed` error.
    #[must_use]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::TokenMalformed {
            message: message.into(),
        }
    }

    /// Creates a new `Unauthenticated` error.
    #[must_use]
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::Unauthenticated {
            message: message.into(),
        }
    }

    /// Creates a new `InsufficientRole` error.
    #[must_use]
    pub fn insufficient_role(message: impl Into<String>) -> Self {
        Self::InsufficientRole {
            message: message.into(),
        }
    }

    /// Creates a new `Forbidden` error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidRequest` error.
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Creates a new `NotFound` error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a new `Conflict` error.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if the error means "no usable credential" (HTTP 401).
    #[must_use]
    pub fn is_authentication_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials
                | Self::TokenMalformed { .. }
                | Self::InvalidSignature
                | Self::TokenExpired
                | Self::TokenRevoked
                | Self::TokenTypeMismatch
                | Self::SubjectNotFound
                | Self::Unauthenticated { .. }
        )
    }

    /// Returns `true` for failures the caller must not see details of.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => Self::TokenExpired,
            JwtError::InvalidSignature => Self::InvalidSignature,
            JwtError::Malformed { message } => Self::TokenMalformed { message },
            other @ (JwtError::EncodingError { .. }
            | JwtError::KeyGenerationError { .. }
            | JwtError::InvalidKey { .. }) => Self::internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert!(AuthError::InvalidCredentials.is_authentication_error());
        assert!(AuthError::TokenRevoked.is_authentication_error());
        assert!(AuthError::unauthenticated("x").is_authentication_error());
        assert!(!AuthError::insufficient_role("x").is_authentication_error());
        assert!(!AuthError::forbidden("x").is_authentication_error());

        assert!(AuthError::internal("db down").is_server_error());
        assert!(!AuthError::TokenExpired.is_server_error());
    }

    #[test]
    fn test_jwt_error_conversion() {
        assert!(matches!(
            AuthError::from(JwtError::Expired),
            AuthError::TokenExpired
        ));
        assert!(matches!(
            AuthError::from(JwtError::InvalidSignature),
            AuthError::InvalidSignature
        ));
        assert!(matches!(
            AuthError::from(JwtError::malformed("bad base64")),
            AuthError::TokenMalformed { .. }
        ));
        assert!(matches!(
            AuthError::from(JwtError::encoding_error("boom")),
            AuthError::Internal { .. }
        ));
    }

    #[test]
    fn test_invalid_credentials_message_is_generic() {
        assert_eq!(AuthError::InvalidCredentials.to_string(), "Invalid credentials");
    }
}
