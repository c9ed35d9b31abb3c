//! Per-request identity carrier.
//!
//! The session middleware resolves at most one identity per request and
//! attaches it to the request extensions. Handlers read it back through
//! [`CurrentUser`] (optional) or [`RequireUser`] (mandatory).

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{Method, Request};
use axum::response::{IntoResponse, Redirect, Response};
use tracing::warn;

use crate::models::Identity;

/// Identity attached to a request by the session middleware.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity(pub Arc<Identity>);

/// Return the request with `identity` attached.
///
/// The request is consumed, so code holding the pre-attach value can never
/// observe the identity. A request that already carries an identity keeps
/// the first one.
pub fn attach<B>(mut req: Request<B>, identity: Identity) -> Request<B> {
    if req.extensions().get::<AuthenticatedIdentity>().is_some() {
        warn!(
            identity_id = identity.id,
            "Request already carries an identity, keeping the first one"
        );
        return req;
    }

    req.extensions_mut()
        .insert(AuthenticatedIdentity(Arc::new(identity)));
    req
}

/// Read access to the identity attached to a request.
pub trait RequestIdentityExt {
    /// The authenticated identity, if the session middleware attached one.
    fn current_identity(&self) -> Option<&Identity>;
}

impl<B> RequestIdentityExt for Request<B> {
    fn current_identity(&self) -> Option<&Identity> {
        self.extensions()
            .get::<AuthenticatedIdentity>()
            .map(|attached| attached.0.as_ref())
    }
}

impl RequestIdentityExt for Parts {
    fn current_identity(&self) -> Option<&Identity> {
        self.extensions
            .get::<AuthenticatedIdentity>()
            .map(|attached| attached.0.as_ref())
    }
}

/// Extractor for the optional current identity. Never rejects.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Option<Identity>);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(parts.current_identity().cloned()))
    }
}

/// Extractor that requires an authenticated identity.
///
/// Anonymous requests are redirected to the login flow. `GET` and `HEAD`
/// requests come back to the path they asked for; a form submission cannot
/// be replayed, so it comes back to the page that holds the form, the parent
/// of the path it posted to.
#[derive(Debug, Clone)]
pub struct RequireUser(pub Identity);

/// Rejection for [`RequireUser`]: a redirect into the login flow.
#[derive(Debug)]
pub struct LoginRedirect {
    location: String,
}

impl LoginRedirect {
    /// Redirect to login, asking to come back to `return_to` afterwards.
    pub fn returning_to(return_to: &str) -> Self {
        let encoded: String = url::form_urlencoded::byte_serialize(return_to.as_bytes()).collect();
        // Slashes are legal in a query value and keep the target readable
        let encoded = encoded.replace("%2F", "/");
        Self {
            location: format!("/auth/google?redirect={encoded}"),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

impl IntoResponse for LoginRedirect {
    fn into_response(self) -> Response {
        Redirect::to(&self.location).into_response()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequireUser {
    type Rejection = LoginRedirect;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.current_identity() {
            Some(identity) => Ok(Self(identity.clone())),
            None => Err(LoginRedirect::returning_to(return_path(parts))),
        }
    }
}

fn return_path(parts: &Parts) -> &str {
    let path = parts.uri.path();
    if parts.method == Method::GET || parts.method == Method::HEAD {
        return path;
    }
    match path.trim_end_matches('/').rfind('/') {
        Some(0) | None => "/",
        Some(i) => &path[..i],
    }
}
