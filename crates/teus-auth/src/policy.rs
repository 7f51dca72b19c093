//! Declarative access rules.
//!
//! Each endpoint carries exactly one [`AccessRule`], evaluated after the
//! authentication gate has populated the [`AuthContext`]:
//!
//! | Rule | Allows |
//! |---|---|
//! | `Public` | everyone, including anonymous callers |
//! | `AuthenticatedOnly` | any principal |
//! | `RequireRole(roles)` | principals whose role is in `roles` |
//! | `SelfOrAdmin(owner)` | admins, and the principal whose subject is `owner` |
//!
//! `Public` short-circuits. Every other rule first needs a principal (401
//! without one) and then its own check (403 when it fails). Evaluation is
//! pure.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, middleware, routing::get};
//! use teus_auth::policy::{AccessRule, require_rule};
//!
//! let admin = Router::new()
//!     .route("/users", get(list_users))
//!     .route_layer(middleware::from_fn_with_state(AccessRule::admin_only(), require_rule));
//! ```

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::AuthResult;
use crate::error::AuthError;
use crate::middleware::AuthContext;
use crate::types::{Principal, Role};

/// Authorization requirement of one endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessRule {
    /// Always allowed.
    Public,
    /// Any authenticated principal.
    AuthenticatedOnly,
    /// Principal role must be one of the listed roles.
    RequireRole(Vec<Role>),
    /// Principal must be an admin or own the resource.
    SelfOrAdmin(String),
}

impl AccessRule {
    /// Rule allowing exactly `role`.
    #[must_use]
    pub fn require_role(role: Role) -> Self {
        Self::RequireRole(vec![role])
    }

    #[must_use]
    pub fn admin_only() -> Self {
        Self::require_role(Role::Admin)
    }

    /// Rule for a resource owned by `owner`.
    #[must_use]
    pub fn self_or_admin(owner: impl Into<String>) -> Self {
        Self::SelfOrAdmin(owner.into())
    }

    /// Evaluates the rule against a request context.
    ///
    /// Returns the principal the decision was made for. Only a `Public` rule
    /// can return `None`, for an anonymous request.
    ///
    /// # Errors
    ///
    /// - A 401-class error when the rule needs a principal and there is none.
    /// - `InsufficientRole` when the principal's role is not allowed.
    /// - `Forbidden` when a non-admin principal does not own the resource.
    pub fn evaluate<'a>(&self, context: &'a AuthContext) -> AuthResult<Option<&'a Principal>> {
        if matches!(self, Self::Public) {
            return Ok(context.principal());
        }

        let principal = context.require_principal()?;

        match self {
            Self::Public | Self::AuthenticatedOnly => {}
            Self::RequireRole(roles) => {
                if !roles.contains(&principal.role) {
                    tracing::debug!(
                        subject = %principal.subject,
                        role = %principal.role,
                        required = ?roles,
                        "Access denied: role not allowed"
                    );
                    return Err(AuthError::insufficient_role(format!(
                        "Requires role {}",
                        describe_roles(roles)
                    )));
                }
            }
            Self::SelfOrAdmin(owner) => {
                if !principal.is_admin() && principal.subject != *owner {
                    tracing::debug!(
                        subject = %principal.subject,
                        owner = %owner,
                        "Access denied: not owner or admin"
                    );
                    return Err(AuthError::forbidden(
                        "Access is limited to the resource owner or an admin",
                    ));
                }
            }
        }

        Ok(Some(principal))
    }
}

fn describe_roles(roles: &[Role]) -> String {
    roles
        .iter()
        .map(Role::as_str)
        .collect::<Vec<_>>()
        .join(" or ")
}

/// Route-layer middleware enforcing a static [`AccessRule`].
///
/// Use with `axum::middleware::from_fn_with_state(rule, require_rule)` as a
/// `route_layer`, inside the authentication gate.
pub async fn require_rule(State(rule): State<AccessRule>, req: Request, next: Next) -> Response {
    let context = req
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .unwrap_or_default();

    match rule.evaluate(&context) {
        Ok(_) => next.run(req).await,
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::TokenRejection;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::{Router, middleware, routing::get};
    use tower::ServiceExt;

    fn user(subject: &str) -> AuthContext {
        AuthContext::authenticated(Principal::new(subject, Role::User))
    }

    fn admin(subject: &str) -> AuthContext {
        AuthContext::authenticated(Principal::new(subject, Role::Admin))
    }

    #[test]
    fn test_public_allows_anonymous() {
        assert!(matches!(
            AccessRule::Public.evaluate(&AuthContext::anonymous()),
            Ok(None)
        ));
        let ctx = user("alice@teus.pt");
        assert!(AccessRule::Public.evaluate(&ctx).unwrap().is_some());
    }

    #[test]
    fn test_authenticated_only() {
        assert!(AccessRule::AuthenticatedOnly.evaluate(&user("a@b.c")).is_ok());
        let err = AccessRule::AuthenticatedOnly
            .evaluate(&AuthContext::anonymous())
            .unwrap_err();
        assert!(err.is_authentication_error());
    }

    #[test]
    fn test_require_role() {
        let rule = AccessRule::admin_only();
        assert!(rule.evaluate(&admin("root@teus.pt")).is_ok());

        let err = rule.evaluate(&user("alice@teus.pt")).unwrap_err();
        assert!(matches!(err, AuthError::InsufficientRole { .. }));
        assert!(!err.is_authentication_error());

        // Absence of a principal wins over the role check.
        let err = rule.evaluate(&AuthContext::anonymous()).unwrap_err();
        assert!(err.is_authentication_error());
    }

    #[test]
    fn test_require_role_set() {
        let rule = AccessRule::RequireRole(vec![Role::User, Role::Admin]);
        assert!(rule.evaluate(&user("a@teus.pt")).is_ok());
        assert!(rule.evaluate(&admin("b@teus.pt")).is_ok());
    }

    #[test]
    fn test_self_or_admin() {
        let rule = AccessRule::self_or_admin("alice@teus.pt");

        assert!(rule.evaluate(&user("alice@teus.pt")).is_ok());
        assert!(rule.evaluate(&admin("root@teus.pt")).is_ok());
        assert!(matches!(
            rule.evaluate(&user("bob@teus.pt")),
            Err(AuthError::Forbidden { .. })
        ));
    }

    #[test]
    fn test_rejected_token_surfaces_reason() {
        let ctx = AuthContext::rejected(TokenRejection::Expired);
        assert!(matches!(
            AccessRule::AuthenticatedOnly.evaluate(&ctx),
            Err(AuthError::TokenExpired)
        ));
        // Public endpoints ignore a bad token.
        assert!(AccessRule::Public.evaluate(&ctx).is_ok());
    }

    #[test]
    fn test_authorize_delegates_to_rule() {
        let ctx = user("alice@teus.pt");
        assert!(ctx.authorize(&AccessRule::self_or_admin("alice@teus.pt")).is_ok());
        assert!(ctx.authorize(&AccessRule::admin_only()).is_err());
    }

    async fn status_for(rule: AccessRule, context: Option<AuthContext>) -> StatusCode {
        let app = Router::new()
            .route("/resource", get(|| async { "ok" }))
            .route_layer(middleware::from_fn_with_state(rule, require_rule));

        let mut request = axum::http::Request::builder()
            .uri("/resource")
            .body(Body::empty())
            .unwrap();
        if let Some(context) = context {
            request.extensions_mut().insert(context);
        }

        app.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_require_rule_middleware() {
        assert_eq!(
            status_for(AccessRule::admin_only(), Some(admin("root@teus.pt"))).await,
            StatusCode::OK
        );
        assert_eq!(
            status_for(AccessRule::admin_only(), Some(user("alice@teus.pt"))).await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_for(AccessRule::admin_only(), None).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(status_for(AccessRule::Public, None).await, StatusCode::OK);
    }
}
