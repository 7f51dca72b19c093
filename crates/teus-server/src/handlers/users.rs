//! User registration and role-gated user endpoints.

use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::Deserialize;
use teus_auth::middleware::{AuthContext, CurrentPrincipal};
use teus_auth::policy::AccessRule;
use teus_auth::{AuthError, AuthResult, Role};

use super::invalid_body;
use crate::accounts::{UserView, normalize_email};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: String,
}

#[derive(Debug, Deserialize)]
pub struct RoleUpdateRequest {
    pub role: String,
}

/// `POST /api/v1/users/register`. New accounts always get `USER`.
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> AuthResult<(StatusCode, Json<UserView>)> {
    let Json(request) = payload.map_err(invalid_body)?;
    let view = state
        .accounts
        .register(&request.email, &request.password, &request.full_name, Role::User)
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// `GET /api/v1/users/me`
pub async fn me(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> AuthResult<Json<UserView>> {
    state
        .accounts
        .find(&principal.subject)
        .map(Json)
        .ok_or(AuthError::SubjectNotFound)
}

/// `GET /api/v1/users` (admin)
pub async fn list_users(State(state): State<AppState>) -> Json<Vec<UserView>> {
    Json(state.accounts.list())
}

/// `GET /api/v1/users/{email}`, for the owner or an admin.
///
/// The rule is checked before the lookup so that callers cannot probe which
/// emails exist.
pub async fn get_user(
    State(state): State<AppState>,
    Path(email): Path<String>,
    context: AuthContext,
) -> AuthResult<Json<UserView>> {
    let email = normalize_email(&email);
    context.authorize(&AccessRule::self_or_admin(email.as_str()))?;

    state
        .accounts
        .find(&email)
        .map(Json)
        .ok_or_else(|| AuthError::not_found(format!("User '{email}' not found")))
}

/// `PUT /api/v1/users/{email}/role` (admin)
pub async fn update_role(
    State(state): State<AppState>,
    Path(email): Path<String>,
    payload: Result<Json<RoleUpdateRequest>, JsonRejection>,
) -> AuthResult<Json<UserView>> {
    let Json(request) = payload.map_err(invalid_body)?;
    let role: Role = request.role.parse()?;
    state.accounts.set_role(&email, role).map(Json)
}
