//! HTTP middleware for authentication.
//!
//! This module provides axum building blocks for:
//!
//! - Bearer token extraction and validation ([`authentication_middleware`])
//! - The request-scoped [`AuthContext`] and its extractors
//! - JSON error responses for [`AuthError`](crate::AuthError)
//!
//! Access rules are attached per endpoint with [`crate::policy`].

pub mod auth;
pub mod error;
pub mod types;

pub use auth::{
    AuthState, BEARER_PREFIX, CurrentPrincipal, authentication_middleware, bearer_token,
    resolve_context,
};
pub use error::{INTERNAL_ERROR_MESSAGE, error_body};
pub use types::{AuthContext, TokenRejection};
