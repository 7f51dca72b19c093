//! Authentication gate.
//!
//! [`authentication_middleware`] resolves the bearer token of every request
//! exactly once and stores an [`AuthContext`] in the request extensions. The
//! principal is rebuilt from the validated token and a directory lookup, so
//! its role is the subject's current one. The gate never rejects a request:
//! missing, malformed or invalid credentials leave the context anonymous, and
//! the endpoint's [`AccessRule`] decides whether that is acceptable.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware, routing::get};
//! use teus_auth::middleware::{AuthState, CurrentPrincipal, authentication_middleware};
//!
//! async fn me(CurrentPrincipal(principal): CurrentPrincipal) -> String {
//!     format!("Hello, {}!", principal.subject)
//! }
//!
//! let app = Router::new()
//!     .route("/me", get(me))
//!     .layer(middleware::from_fn_with_state(auth_state, authentication_middleware));
//! ```
//!
//! [`AccessRule`]: crate::policy::AccessRule

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::error::AuthError;
use crate::token::TokenService;
use crate::types::Principal;

use super::types::{AuthContext, TokenRejection};

/// Credential scheme prefix, including the separating space.
pub const BEARER_PREFIX: &str = "Bearer ";

// =============================================================================
// Auth State
// =============================================================================

/// State required by the authentication gate.
#[derive(Clone)]
pub struct AuthState {
    /// Token service used to validate access tokens and resolve principals.
    pub token_service: Arc<TokenService>,
}

impl AuthState {
    #[must_use]
    pub fn new(token_service: Arc<TokenService>) -> Self {
        Self { token_service }
    }
}

// =============================================================================
// Gate
// =============================================================================

/// Per-request authentication gate.
///
/// Use with `axum::middleware::from_fn_with_state`. If an [`AuthContext`] is
/// already present (the gate was layered twice) the request passes through
/// untouched.
pub async fn authentication_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    if req.extensions().get::<AuthContext>().is_some() {
        return next.run(req).await;
    }

    let context = resolve_context(&state, req.headers()).await;
    req.extensions_mut().insert(context);
    next.run(req).await
}

/// Resolves the authentication context for a set of request headers.
pub async fn resolve_context(state: &AuthState, headers: &HeaderMap) -> AuthContext {
    if headers.get(AUTHORIZATION).is_none() {
        return AuthContext::anonymous();
    }

    let Some(token) = bearer_token(headers) else {
        tracing::debug!("Malformed Authorization header");
        return AuthContext::rejected(TokenRejection::Malformed);
    };

    match state.token_service.resolve_principal(token).await {
        Ok(principal) => {
            tracing::debug!(
                subject = %principal.subject,
                role = %principal.role,
                "Token validated successfully"
            );
            AuthContext::authenticated(principal)
        }
        Err(e) => {
            let rejection = TokenRejection::from_error(&e);
            if matches!(rejection, TokenRejection::Unverifiable) {
                tracing::warn!(error = %e, "Token could not be verified");
            } else {
                tracing::debug!(error = %e, "Token validation failed");
            }
            AuthContext::rejected(rejection)
        }
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
///
/// Returns `None` if the header is absent, not valid ASCII, uses another
/// scheme, or carries an empty token.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// =============================================================================
// Extractors
// =============================================================================

/// The context the gate stored, or an anonymous one if the gate is not
/// installed on this route.
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Extractor for endpoints that only require an authenticated caller.
///
/// Rejects with 401 (carrying the recorded token rejection) when the request
/// is anonymous.
///
/// # Example
///
/// ```ignore
/// async fn handler(CurrentPrincipal(principal): CurrentPrincipal) -> impl IntoResponse {
///     Json(principal.subject)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentPrincipal(pub Principal);

impl<S> FromRequestParts<S> for CurrentPrincipal
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .unwrap_or_default();

        context.require_principal().cloned().map(CurrentPrincipal)
    }
}

// =============================================================================
// Tests
// =============================================================================
