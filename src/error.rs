use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Body returned when the rate limiter rejects a request.
pub const RATE_LIMITED_BODY: &str = r#"{"error":"rate limit exceeded"}"#;

/// Body returned when a request exceeds its deadline.
pub const TIMEOUT_BODY: &str = r#"{"error":"request timeout"}"#;

/// Body returned when a handler panics.
pub const INTERNAL_ERROR_BODY: &str = r#"{"error":"internal server error"}"#;

/// Application-wide error types with appropriate HTTP status codes.
///
/// Store and provider failures carry their detail for the server log only;
/// clients always receive a fixed, sanitized message.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Token store failure: {0}")]
    Store(#[from] StoreError),

    #[error("Identity provider failure: {0}")]
    Provider(String),

    #[error("OAuth state mismatch")]
    InvalidState,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Error response body for API endpoints.
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Sign in to access this resource.",
            ),
            AppError::InvalidState => (
                StatusCode::BAD_REQUEST,
                "invalid_state",
                "The sign-in request expired or was tampered with. Please try again.",
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.as_str()),

            // Upstream provider errors - the exchange failed, never echo the provider body
            AppError::Provider(_) => (
                StatusCode::BAD_GATEWAY,
                "provider_error",
                "Sign-in with the identity provider failed. Please try again.",
            ),

            // Internal errors - never expose internal details to clients
            AppError::Store(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "store_error",
                "A storage error occurred. Please try again later.",
            ),
            AppError::ConfigError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "config_error",
                "Service configuration error. Please contact support.",
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "Client error");
        }

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: message.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Build a response carrying one of the fixed JSON rejection bodies.
///
/// Used by pipeline stages that short-circuit before any route logic runs.
pub fn fixed_json_response(status: StatusCode, body: &'static str) -> Response {
    (status, [(CONTENT_TYPE, "application/json")], body).into_response()
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
