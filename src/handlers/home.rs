//! Landing and current-identity endpoints.

use axum::Json;
use tracing::instrument;

use crate::auth::CurrentUser;
use crate::error::{AppError, AppResult};
use crate::models::{HomeResponse, Identity};

/// Path that starts the login flow.
pub const SIGN_IN_PATH: &str = "/auth/google";

/// `GET /` - greet the caller, differently when anonymous.
#[instrument(skip_all)]
pub async fn home(CurrentUser(user): CurrentUser) -> Json<HomeResponse> {
    Json(match user {
        Some(identity) => HomeResponse {
            authenticated: true,
            greeting: format!("Welcome back, {}", identity.name),
            sign_in_url: None,
        },
        None => HomeResponse {
            authenticated: false,
            greeting: "Welcome! Sign in to continue.".to_string(),
            sign_in_url: Some(SIGN_IN_PATH.to_string()),
        },
    })
}

/// `GET /api/me` - the signed-in identity, or 401.
#[instrument(skip_all)]
pub async fn me(CurrentUser(user): CurrentUser) -> AppResult<Json<Identity>> {
    user.map(Json).ok_or(AppError::Unauthorized)
}
