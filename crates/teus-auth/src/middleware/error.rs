//! Error response handling for the auth layer.
//!
//! Every [`AuthError`] becomes a JSON body of the form
//! `{"error": "<code>", "message": "<text>"}`. Authentication failures also
//! carry a `WWW-Authenticate` challenge.

use axum::{
    Json,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::AuthError;

/// Message returned for every 5xx; details go to the server log only.
pub const INTERNAL_ERROR_MESSAGE: &str = "An unexpected error occurred";

const MALFORMED_TOKEN_MESSAGE: &str = "Token is malformed";

// =============================================================================
// IntoResponse Implementation
// =============================================================================

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code, message) = error_details(&self);

        if self.is_server_error() {
            tracing::error!(error = %self, "Request failed with internal error");
        }

        let mut headers = HeaderMap::new();
        if self.is_authentication_error() {
            let www_auth = build_www_authenticate_header(code, &message);
            if let Ok(value) = HeaderValue::from_str(&www_auth) {
                headers.insert(header::WWW_AUTHENTICATE, value);
            }
        }

        (status, headers, Json(error_body(code, &message))).into_response()
    }
}

/// Builds the JSON error body.
#[must_use]
pub fn error_body(code: &str, message: &str) -> serde_json::Value {
    json!({
        "error": code,
        "message": message,
    })
}

/// Returns (HTTP status, error code, client-facing message).
fn error_details(error: &AuthError) -> (StatusCode, &'static str, String) {
    match error {
        AuthError::InvalidCredentials => (
            StatusCode::UNAUTHORIZED,
            "invalid_credentials",
            "Invalid email or password".to_string(),
        ),
        AuthError::TokenMalformed { message } => {
            tracing::debug!(reason = %message, "Rejected malformed token");
            (
                StatusCode::UNAUTHORIZED,
                "invalid_token",
                MALFORMED_TOKEN_MESSAGE.to_string(),
            )
        }
        AuthError::InvalidSignature => (
            StatusCode::UNAUTHORIZED,
            "invalid_token",
            "Token signature is invalid".to_string(),
        ),
        AuthError::TokenExpired => (
            StatusCode::UNAUTHORIZED,
            "token_expired",
            "Token has expired".to_string(),
        ),
        AuthError::TokenRevoked => (
            StatusCode::UNAUTHORIZED,
            "token_revoked",
            "Token has been revoked".to_string(),
        ),
        AuthError::TokenTypeMismatch => (
            StatusCode::UNAUTHORIZED,
            "invalid_token",
            "Wrong token type".to_string(),
        ),
        AuthError::SubjectNotFound => (
            StatusCode::UNAUTHORIZED,
            "invalid_token",
            "Token subject no longer exists".to_string(),
        ),
        AuthError::Unauthenticated { message } => {
            (StatusCode::UNAUTHORIZED, "unauthenticated", message.clone())
        }
        AuthError::InsufficientRole { message } => {
            (StatusCode::FORBIDDEN, "insufficient_role", message.clone())
        }
        AuthError::Forbidden { message } => (StatusCode::FORBIDDEN, "forbidden", message.clone()),
        AuthError::InvalidRequest { message } => {
            (StatusCode::BAD_REQUEST, "invalid_request", message.clone())
        }
        AuthError::NotFound { message } => (StatusCode::NOT_FOUND, "not_found", message.clone()),
        AuthError::Conflict { message } => (StatusCode::CONFLICT, "conflict", message.clone()),
        AuthError::Internal { .. } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "server_error",
            INTERNAL_ERROR_MESSAGE.to_string(),
        ),
    }
}

/// Builds the WWW-Authenticate header value for 401 responses.
///
/// Format: `Bearer realm="teus", error="invalid_token", error_description="..."`
fn build_www_authenticate_header(error: &str, description: &str) -> String {
    let escaped_desc = description.replace('"', "\\\"");
    format!("Bearer realm=\"teus\", error=\"{error}\", error_description=\"{escaped_desc}\"")
}

// =============================================================================
// Tests
// =============================================================================
