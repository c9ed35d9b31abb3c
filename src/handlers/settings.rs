//! Account settings: display name and account deletion.

use axum::Form;
use axum::extract::State;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use tracing::{info, instrument};

use crate::auth::RequireUser;
use crate::auth::cookies::{CookieSecurity, clear_session_cookie};
use crate::error::AppResult;
use crate::models::UpdateProfileForm;
use crate::state::AppState;
use crate::validation::validate_display_name;

/// Settings page the forms belong to.
pub const SETTINGS_PATH: &str = "/settings";

/// `POST /settings/update-profile` - change the display name.
///
/// Anonymous callers are sent to login before the form body is read.
#[instrument(skip_all)]
pub async fn update_profile(
    State(state): State<AppState>,
    RequireUser(mut identity): RequireUser,
    Form(form): Form<UpdateProfileForm>,
) -> AppResult<Response> {
    identity.name = validate_display_name(&form.name)?;
    let updated = state.store.update_identity(&identity, Utc::now()).await?;
    info!(identity_id = updated.id, "Display name updated");

    Ok(Redirect::to(SETTINGS_PATH).into_response())
}

/// `POST /settings/delete-account` - delete the identity and all its sessions.
#[instrument(skip_all)]
pub async fn delete_account(
    State(state): State<AppState>,
    RequireUser(identity): RequireUser,
    security: CookieSecurity,
    jar: CookieJar,
) -> AppResult<Response> {
    state.store.delete_identity(identity.id).await?;
    info!(identity_id = identity.id, "Account deleted");

    Ok((jar.add(clear_session_cookie(security)), Redirect::to("/")).into_response())
}
