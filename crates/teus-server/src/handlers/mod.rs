use axum::{Json, extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use teus_auth::AuthError;

pub mod auth;
pub mod users;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

/// Maps a JSON body rejection to a 400 in the common error format.
pub(crate) fn invalid_body(rejection: JsonRejection) -> AuthError {
    AuthError::invalid_request(rejection.body_text())
}
