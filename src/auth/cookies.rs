//! Cookie construction for the session and the OAuth round trip.
//!
//! The `Secure` attribute is dropped only for plain-HTTP requests to a
//! loopback host, so local development works without TLS while every other
//! deployment gets secure cookies.

use std::convert::Infallible;
use std::net::IpAddr;

use axum::extract::FromRequestParts;
use axum::http::header::HOST;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Uri};
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::models::SESSION_LIFETIME;

/// Name of the cookie carrying the session bearer token.
pub const SESSION_COOKIE_NAME: &str = "session";

/// Name of the cookie carrying the OAuth CSRF state.
pub const STATE_COOKIE_NAME: &str = "oauth_state";

/// Name of the cookie carrying the post-login redirect target.
pub const REDIRECT_COOKIE_NAME: &str = "oauth_redirect";

/// Lifetime of the OAuth round-trip cookies (10 minutes).
pub const ROUND_TRIP_MAX_AGE: Duration = Duration::minutes(10);

/// Header set by TLS-terminating proxies.
const FORWARDED_PROTO_HEADER: &str = "x-forwarded-proto";

/// Whether cookies issued for this request should carry `Secure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CookieSecurity {
    pub secure: bool,
}

impl CookieSecurity {
    /// Derive the policy from the request URI and headers.
    pub fn from_request(uri: &Uri, headers: &HeaderMap) -> Self {
        let tls = uri.scheme_str() == Some("https")
            || headers
                .get(FORWARDED_PROTO_HEADER)
                .and_then(|v| v.to_str().ok())
                .is_some_and(|proto| proto.eq_ignore_ascii_case("https"));

        let host = headers
            .get(HOST)
            .and_then(|v| v.to_str().ok())
            .or_else(|| uri.host())
            .unwrap_or_default();

        Self {
            secure: tls || !is_loopback_host(host),
        }
    }
}

impl<S: Send + Sync> FromRequestParts<S> for CookieSecurity {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_request(&parts.uri, &parts.headers))
    }
}

/// Check whether a `Host` value (with or without port) names a loopback address.
fn is_loopback_host(host: &str) -> bool {
    let hostname = if let Some(rest) = host.strip_prefix('[') {
        // Bracketed IPv6, e.g. "[::1]:8080"
        rest.split(']').next().unwrap_or_default()
    } else {
        host.rsplit_once(':').map_or(host, |(name, _port)| name)
    };

    hostname.eq_ignore_ascii_case("localhost")
        || hostname.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}

/// Session cookie issued at login, valid for the full session lifetime.
pub fn session_cookie(token: &str, security: CookieSecurity) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, token.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(security.secure)
        .max_age(Duration::seconds(SESSION_LIFETIME.num_seconds()))
        .build()
}

/// Cookie that tells the browser to drop the session immediately.
pub fn clear_session_cookie(security: CookieSecurity) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE_NAME, ""))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(security.secure)
        .max_age(Duration::seconds(-1))
        .build()
}

fn round_trip_cookie(name: &'static str, value: String, security: CookieSecurity) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(security.secure)
        .max_age(ROUND_TRIP_MAX_AGE)
        .build()
}

/// CSRF state cookie set before redirecting to the provider.
pub fn state_cookie(state: &str, security: CookieSecurity) -> Cookie<'static> {
    round_trip_cookie(STATE_COOKIE_NAME, state.to_string(), security)
}

/// Post-login redirect target cookie.
pub fn redirect_cookie(target: &str, security: CookieSecurity) -> Cookie<'static> {
    round_trip_cookie(REDIRECT_COOKIE_NAME, target.to_string(), security)
}

/// Removal cookies for both OAuth round-trip cookies.
pub fn clear_round_trip_cookies() -> [Cookie<'static>; 2] {
    [STATE_COOKIE_NAME, REDIRECT_COOKIE_NAME].map(|name| {
        Cookie::build((name, ""))
            .path("/")
            .http_only(true)
            .max_age(Duration::seconds(-1))
            .build()
    })
}
