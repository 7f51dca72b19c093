//! Login, token refresh and logout.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};
use teus_auth::middleware::bearer_token;
use teus_auth::{AuthError, AuthResult};

use super::invalid_body;
use crate::server::AppState;

pub const TOKEN_TYPE: &str = "Bearer";

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshTokenResponse {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// `POST /api/v1/auth/login`
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> AuthResult<Json<LoginResponse>> {
    let Json(request) = payload.map_err(invalid_body)?;

    let principal = state
        .accounts
        .authenticate(&request.email, &request.password)
        .await?;
    let pair = state
        .token_service
        .issue_token_pair(&principal.subject, principal.role)?;

    tracing::info!(subject = %principal.subject, role = %principal.role, "User logged in");

    Ok(Json(LoginResponse {
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
        token_type: TOKEN_TYPE,
        expires_in: pair.expires_in,
    }))
}

/// `POST /api/v1/auth/refresh-token`
pub async fn refresh_token(
    State(state): State<AppState>,
    payload: Result<Json<RefreshTokenRequest>, JsonRejection>,
) -> AuthResult<Json<RefreshTokenResponse>> {
    let Json(request) = payload.map_err(invalid_body)?;

    let access_token = state
        .token_service
        .rotate_access_token(&request.refresh_token)
        .await?;

    Ok(Json(RefreshTokenResponse {
        access_token,
        token_type: TOKEN_TYPE,
        expires_in: state.token_service.access_token_expires_in(),
    }))
}

/// `POST /api/v1/auth/logout`
///
/// Revokes the presented access token. The refresh token stays usable.
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AuthResult<Json<MessageResponse>> {
    let token = bearer_token(&headers)
        .ok_or_else(|| AuthError::invalid_request("Invalid logout request."))?;

    state.token_service.revoke(token).await?;

    Ok(Json(MessageResponse {
        message: "Successfully logged out.",
    }))
}
