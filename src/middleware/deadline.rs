//! Per-request deadline enforcement.
//!
//! Innermost pipeline stage. The route runs on its own task so the
//! deadline can fire while the handler is still busy. Whichever side
//! finishes first claims the response through a [`ResponseGuard`]:
//!
//! - the handler finishes first: its response is returned unchanged
//! - the deadline fires first: the client gets exactly one
//!   `408 {"error":"request timeout"}`, the request's [`RequestDeadline`]
//!   is cancelled, and whatever the handler produces later is discarded
//!
//! Handlers that do long work should watch [`RequestDeadline::cancelled`]
//! and stop early; nothing aborts them forcibly.

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{Request, Response, StatusCode};
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tower::{Layer, Service};
use tracing::{debug, error, warn};

use crate::error::{INTERNAL_ERROR_BODY, TIMEOUT_BODY, fixed_json_response};
use crate::metrics;

/// First-writer-wins latch deciding who answers a request.
#[derive(Debug, Clone, Default)]
pub struct ResponseGuard {
    claimed: Arc<AtomicBool>,
}

impl ResponseGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the right to respond. Returns `true` exactly once.
    pub fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Cancellation signal for the current request, available to handlers.
#[derive(Debug, Clone)]
pub struct RequestDeadline {
    token: CancellationToken,
    timeout: Duration,
}

impl RequestDeadline {
    /// Whether the deadline has already fired.
    pub fn is_expired(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves when the deadline fires.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Extracting outside the deadline stage yields a token that never fires.
impl<S: Send + Sync> FromRequestParts<S> for RequestDeadline {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<RequestDeadline>()
            .cloned()
            .unwrap_or_else(|| RequestDeadline {
                token: CancellationToken::new(),
                timeout: Duration::MAX,
            }))
    }
}

#[derive(Clone)]
pub struct DeadlineLayer {
    timeout: Duration,
}

impl DeadlineLayer {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl<S> Layer<S> for DeadlineLayer {
    type Service = DeadlineService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        DeadlineService {
            inner,
            timeout: self.timeout,
        }
    }
}

#[derive(Clone)]
pub struct DeadlineService<S> {
    inner: S,
    timeout: Duration,
}

impl<S> Service<Request<Body>> for DeadlineService<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let timeout = self.timeout;
        let token = CancellationToken::new();
        req.extensions_mut().insert(RequestDeadline {
            token: token.clone(),
            timeout,
        });

        let method = req.method().clone();
        let path = req.uri().path().to_string();

        let guard = ResponseGuard::new();
        let handler_guard = guard.clone();
        let route = self.inner.call(req);

        Box::pin(async move {
            let mut handle = tokio::spawn(async move {
                let response = route.await?;
                if handler_guard.try_claim() {
                    Ok::<_, S::Error>(Some(response))
                } else {
                    debug!("Discarding response produced after the deadline");
                    Ok(None)
                }
            });

            tokio::select! {
                joined = &mut handle => return settle(joined),
                () = tokio::time::sleep(timeout) => {}
            }

            token.cancel();

            if guard.try_claim() {
                warn!(
                    method = %method,
                    path = %path,
                    timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    "Request deadline exceeded"
                );
                metrics::record_deadline_exceeded();
                return Ok(fixed_json_response(StatusCode::REQUEST_TIMEOUT, TIMEOUT_BODY));
            }

            // The handler claimed the response just as the timer fired
            settle(handle.await)
        })
    }
}

/// Turn the route task's outcome into the final response.
fn settle<E>(joined: Result<Result<Option<Response<Body>>, E>, JoinError>) -> Result<Response<Body>, E> {
    match joined {
        Ok(Ok(Some(response))) => Ok(response),
        Ok(Ok(None)) => Ok(fixed_json_response(StatusCode::REQUEST_TIMEOUT, TIMEOUT_BODY)),
        Ok(Err(e)) => Err(e),
        // Re-raise handler panics so the recovery stage sees them
        Err(join_error) if join_error.is_panic() => {
            std::panic::resume_unwind(join_error.into_panic())
        }
        Err(join_error) => {
            error!(error = %join_error, "Route task was cancelled");
            Ok(fixed_json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                INTERNAL_ERROR_BODY,
            ))
        }
    }
}
