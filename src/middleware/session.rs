//! Session authentication stage.
//!
//! Always applied, to every route. Reads the `session` cookie, resolves it
//! through [`SessionAuthenticator`], and attaches the identity to the
//! request. It never rejects: anonymous requests continue unchanged and
//! each route decides what an anonymous caller may do.

use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response};
use axum_extra::extract::cookie::CookieJar;
use tower::{Layer, Service};

use crate::auth::cookies::SESSION_COOKIE_NAME;
use crate::auth::{SessionAuthenticator, attach};

#[derive(Clone)]
pub struct SessionLayer {
    authenticator: SessionAuthenticator,
}

impl SessionLayer {
    pub fn new(authenticator: SessionAuthenticator) -> Self {
        Self { authenticator }
    }
}

impl<S> Layer<S> for SessionLayer {
    type Service = SessionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionService {
            inner,
            authenticator: self.authenticator.clone(),
        }
    }
}

#[derive(Clone)]
pub struct SessionService<S> {
    inner: S,
    authenticator: SessionAuthenticator,
}

impl<S> Service<Request<Body>> for SessionService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let token = CookieJar::from_headers(req.headers())
            .get(SESSION_COOKIE_NAME)
            .map(|cookie| cookie.value().to_string());
        let authenticator = self.authenticator.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let req = match token {
                Some(token) => match authenticator.authenticate(&token).await {
                    Some(identity) => attach(req, identity),
                    None => req,
                },
                None => req,
            };
            inner.call(req).await
        })
    }
}
