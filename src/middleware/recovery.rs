//! Panic recovery.
//!
//! Outermost pipeline stage. A panic anywhere below it, including inside a
//! handler, becomes a logged `500 {"error":"internal server error"}` instead
//! of a dropped connection. The process-wide panic hook installed by
//! [`crate::utils::install_panic_hook`] records the backtrace.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use futures_util::FutureExt;
use tower::{Layer, Service};
use tracing::error;

use super::request_id::RequestIdExt;
use crate::error::{INTERNAL_ERROR_BODY, fixed_json_response};
use crate::metrics;

#[derive(Clone, Default)]
pub struct RecoveryLayer;

impl RecoveryLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for RecoveryLayer {
    type Service = RecoveryService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RecoveryService { inner }
    }
}

#[derive(Clone)]
pub struct RecoveryService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for RecoveryService<S>
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
        let method = req.method().clone();
        let path = req.uri().path().to_string();
        let request_id = req.request_id().map(str::to_string);
        let mut inner = self.inner.clone();

        Box::pin(async move {
            // `call` itself may panic before returning a future
            let future = match std::panic::catch_unwind(AssertUnwindSafe(|| inner.call(req))) {
                Ok(future) => future,
                Err(payload) => {
                    return Ok(recovered(payload.as_ref(), &method, &path, request_id.as_deref()));
                }
            };

            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Ok(recovered(payload.as_ref(), &method, &path, request_id.as_deref())),
            }
        })
    }
}

fn recovered(
    payload: &(dyn Any + Send),
    method: &axum::http::Method,
    path: &str,
    request_id: Option<&str>,
) -> Response<Body> {
    error!(
        panic = panic_message(payload),
        method = %method,
        path = %path,
        request_id = request_id.unwrap_or("unknown"),
        "Recovered from panic while handling request"
    );
    metrics::record_panic_recovered();
    fixed_json_response(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_BODY)
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
