//! Structured access logging.
//!
//! Built on `tower-http`'s [`TraceLayer`] with a request span carrying the
//! method, path, request id, remote address and user agent, and a single
//! completion event carrying status and duration.

use std::time::Duration;

use axum::http::header::USER_AGENT;
use axum::http::{Request, Response};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{
    DefaultOnBodyChunk, DefaultOnEos, DefaultOnRequest, MakeSpan, OnResponse, TraceLayer,
};
use tracing::{Span, info, info_span};

use super::request_id::RequestIdExt;
use crate::metrics;
use crate::utils::remote_addr;

/// The configured access-log layer type.
pub type AccessLogLayer = TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    AccessLogSpan,
    DefaultOnRequest,
    AccessLogResponse,
    DefaultOnBodyChunk,
    DefaultOnEos,
    (),
>;

/// Build the access-log stage.
pub fn access_log_layer() -> AccessLogLayer {
    TraceLayer::new_for_http()
        .make_span_with(AccessLogSpan)
        .on_response(AccessLogResponse)
        .on_failure(())
}

/// Creates the per-request span.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessLogSpan;

impl<B> MakeSpan<B> for AccessLogSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let user_agent = request
            .headers()
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        info_span!(
            "request",
            method = %request.method(),
            path = %request.uri().path(),
            request_id = request.request_id().unwrap_or("unknown"),
            ip = %remote_addr(request.extensions()),
            user_agent = user_agent,
        )
    }
}

/// Emits the completion line.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessLogResponse;

impl<B> OnResponse<B> for AccessLogResponse {
    fn on_response(self, response: &Response<B>, latency: Duration, _span: &Span) {
        let status = response.status().as_u16();
        info!(
            status,
            duration_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
            "HTTP request"
        );
        metrics::record_request_duration(status, latency.as_secs_f64());
    }
}
