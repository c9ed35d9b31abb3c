//! Global admission control using the token bucket algorithm.
//!
//! # Algorithm
//!
//! Uses the Governor crate's GCRA implementation, which behaves as a token
//! bucket: capacity equals `burst`, refilled at `rps` tokens per second.
//! Admission checks are lock-free and O(1).
//!
//! # Scope
//!
//! There is exactly one bucket per process, shared by every request. It is
//! not partitioned per client, so one noisy client can exhaust the budget
//! for everybody. Per-client limiting is a known limitation of this gate.
//!
//! # Response
//!
//! On rejection (429) the body is `{"error":"rate limit exceeded"}` and a
//! `Retry-After` header carries the whole seconds until the next token.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::body::Body;
use axum::http::header::{HeaderValue, RETRY_AFTER};
use axum::http::{Request, Response, StatusCode};
use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tower::{Layer, Service};
use tracing::warn;

use crate::error::{RATE_LIMITED_BODY, fixed_json_response};
use crate::metrics;

/// Error type for rate limiter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitError {
    /// RPS value cannot be zero.
    ZeroRps,
    /// Burst capacity cannot be zero.
    ZeroBurst,
}

impl fmt::Display for RateLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RateLimitError::ZeroRps => {
                write!(f, "RPS must be greater than 0; omit the limiter to disable")
            }
            RateLimitError::ZeroBurst => write!(f, "burst capacity must be greater than 0"),
        }
    }
}

impl std::error::Error for RateLimitError {}

/// The process-wide token bucket.
///
/// Create one at startup and hand the same `Arc` to the pipeline builder.
pub struct AdmissionLimiter {
    limiter: DefaultDirectRateLimiter,
    rps: u32,
    burst: u32,
}

impl AdmissionLimiter {
    /// Create a bucket holding `burst` tokens, refilled at `rps` per second.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError` if either value is 0.
    pub fn new(rps: u32, burst: u32) -> Result<Self, RateLimitError> {
        let rps_nonzero = NonZeroU32::new(rps).ok_or(RateLimitError::ZeroRps)?;
        let burst_nonzero = NonZeroU32::new(burst).ok_or(RateLimitError::ZeroBurst)?;

        let quota = Quota::per_second(rps_nonzero).allow_burst(burst_nonzero);

        Ok(Self {
            limiter: RateLimiter::direct(quota),
            rps,
            burst,
        })
    }

    /// Take one token if available. Never blocks.
    pub fn allow(&self) -> bool {
        self.check().is_ok()
    }

    /// Take one token, or report how long until one is available.
    pub fn check(&self) -> Result<(), Duration> {
        self.limiter
            .check()
            .map_err(|not_until| not_until.wait_time_from(DefaultClock::default().now()))
    }

    pub fn rps(&self) -> u32 {
        self.rps
    }

    pub fn burst(&self) -> u32 {
        self.burst
    }
}

impl fmt::Debug for AdmissionLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionLimiter")
            .field("rps", &self.rps)
            .field("burst", &self.burst)
            .finish()
    }
}

/// Rate limiting layer for Tower middleware stack.
#[derive(Clone)]
pub struct RateLimitLayer {
    limiter: Arc<AdmissionLimiter>,
}

impl RateLimitLayer {
    pub fn new(limiter: Arc<AdmissionLimiter>) -> Self {
        Self { limiter }
    }
}

impl<S> Layer<S> for RateLimitLayer {
    type Service = RateLimitService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RateLimitService {
            inner,
            limiter: self.limiter.clone(),
        }
    }
}

/// Rate limiting service wrapper.
#[derive(Clone)]
pub struct RateLimitService<S> {
    inner: S,
    limiter: Arc<AdmissionLimiter>,
}

impl<S> Service<Request<Body>> for RateLimitService<S>
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
        match self.limiter.check() {
            Ok(()) => {
                let mut inner = self.inner.clone();
                Box::pin(async move { inner.call(req).await })
            }
            Err(wait) => {
                let retry_after = wait.as_secs().max(1);

                warn!(
                    path = %req.uri().path(),
                    retry_after_secs = retry_after,
                    "Rate limit exceeded"
                );
                metrics::record_rate_limited();

                let mut response =
                    fixed_json_response(StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED_BODY);
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(retry_after));

                Box::pin(async move { Ok(response) })
            }
        }
    }
}
