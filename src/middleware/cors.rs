//! Cross-origin resource sharing stage.

use std::time::Duration;

use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, HeaderName, ORIGIN};
use axum::http::{HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::warn;

use super::request_id::REQUEST_ID_HEADER;

/// How long browsers may cache a preflight result.
pub const PREFLIGHT_MAX_AGE: Duration = Duration::from_secs(12 * 60 * 60);

/// Build the CORS layer for the given origins.
///
/// `"*"` mirrors the caller's origin back. Credentials are allowed, and a
/// literal wildcard is not permitted together with credentials.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let allow_origin = if allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::mirror_request()
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    let request_id = HeaderName::from_static(REQUEST_ID_HEADER);

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([ORIGIN, CONTENT_TYPE, ACCEPT, AUTHORIZATION, request_id.clone()])
        .expose_headers([CONTENT_LENGTH, request_id])
        .allow_credentials(true)
        .max_age(PREFLIGHT_MAX_AGE)
}
