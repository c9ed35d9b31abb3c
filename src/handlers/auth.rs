//! Login, provider callback and sign-out.
//!
//! # Flow
//!
//! 1. `GET /auth/google?redirect=/somewhere` stores a random CSRF state and
//!    the (sanitized) return path in short-lived cookies, then redirects to
//!    the provider.
//! 2. `GET /auth/google/callback?state=..&code=..` clears those cookies,
//!    checks the state in constant time, exchanges the code, upserts the
//!    identity, issues a session cookie and redirects to the return path.
//! 3. `GET /auth/sign-out` deletes the session and clears the cookie.

use axum::extract::{Query, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use chrono::Utc;
use subtle::ConstantTimeEq;
use tracing::{error, info, instrument, warn};

use crate::auth::cookies::{
    CookieSecurity, REDIRECT_COOKIE_NAME, SESSION_COOKIE_NAME, STATE_COOKIE_NAME,
    clear_round_trip_cookies, clear_session_cookie, redirect_cookie, session_cookie, state_cookie,
};
use crate::auth::{complete_login, generate_token};
use crate::error::{AppError, AppResult};
use crate::metrics;
use crate::models::{CallbackQuery, LoginQuery};
use crate::state::AppState;
use crate::validation::{is_well_formed_token, sanitize_redirect_target};

/// `GET /auth/google` - start the provider login.
#[instrument(skip_all)]
pub async fn google_login(
    State(state): State<AppState>,
    security: CookieSecurity,
    jar: CookieJar,
    Query(query): Query<LoginQuery>,
) -> (CookieJar, Redirect) {
    let csrf_state = generate_token();
    let target = sanitize_redirect_target(query.redirect.as_deref());

    let jar = jar
        .add(state_cookie(&csrf_state, security))
        .add(redirect_cookie(&target, security));

    (
        jar,
        Redirect::temporary(&state.provider.authorization_url(&csrf_state)),
    )
}

/// `GET /auth/google/callback` - finish the provider login.
#[instrument(skip_all)]
pub async fn google_callback(
    State(state): State<AppState>,
    security: CookieSecurity,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Response {
    let expected_state = jar.get(STATE_COOKIE_NAME).map(|c| c.value().to_string());
    let target = sanitize_redirect_target(jar.get(REDIRECT_COOKIE_NAME).map(|c| c.value()));

    // Round-trip cookies are single use, whatever the outcome
    let [clear_state, clear_redirect] = clear_round_trip_cookies();
    let jar = jar.add(clear_state).add(clear_redirect);

    match finish_login(&state, expected_state.as_deref(), &query).await {
        Ok(token) => (
            jar.add(session_cookie(&token, security)),
            Redirect::temporary(&target),
        )
            .into_response(),
        Err(e) => (jar, e).into_response(),
    }
}

/// Validate the callback and open a session. Returns the session token.
async fn finish_login(
    state: &AppState,
    expected_state: Option<&str>,
    query: &CallbackQuery,
) -> AppResult<String> {
    if let Some(reason) = &query.error {
        warn!(reason = %reason, "Provider returned an error to the callback");
        return Err(AppError::BadRequest(
            "Sign-in was cancelled or denied".to_string(),
        ));
    }

    if !states_match(expected_state, query.state.as_deref()) {
        warn!("OAuth state mismatch on callback");
        return Err(AppError::InvalidState);
    }

    let code = query
        .code
        .as_deref()
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::BadRequest("Missing authorization code".to_string()))?;

    let profile = state.provider.exchange(code).await?;
    let outcome = complete_login(state.store.as_ref(), &profile, Utc::now()).await?;

    Ok(outcome.session.token)
}

/// Constant-time comparison of the stored and returned CSRF state.
fn states_match(expected: Option<&str>, provided: Option<&str>) -> bool {
    match (expected, provided) {
        (Some(expected), Some(provided)) if !expected.is_empty() => {
            expected.as_bytes().ct_eq(provided.as_bytes()).into()
        }
        _ => false,
    }
}

/// `GET /auth/sign-out` - end the current session.
///
/// A store failure is logged; the cookie is cleared regardless.
#[instrument(skip_all)]
pub async fn sign_out(
    State(state): State<AppState>,
    security: CookieSecurity,
    jar: CookieJar,
) -> (CookieJar, Redirect) {
    let token = jar
        .get(SESSION_COOKIE_NAME)
        .map(|c| c.value().to_string())
        .filter(|t| is_well_formed_token(t));

    if let Some(token) = token {
        match state.store.delete_session(&token).await {
            Ok(()) => {
                metrics::record_sign_out();
                info!("Session signed out");
            }
            Err(e) => error!(error = %e, "Failed to delete session on sign-out"),
        }
    }

    (
        jar.add(clear_session_cookie(security)),
        Redirect::temporary("/"),
    )
}
