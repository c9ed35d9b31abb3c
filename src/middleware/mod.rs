//! HTTP middleware: the ordered request pipeline and session authentication.
//!
//! - **Recovery**: panics become a logged 500
//! - **Request ID**: generation and propagation of `X-Request-Id`
//! - **Access Log**: one structured line per request
//! - **Security Headers** and **CORS**
//! - **Rate Limiting**: a single process-wide token bucket
//! - **Deadline**: per-request timeout with cooperative cancellation
//! - **Session**: resolves the session cookie to an identity on every request
//!
//! [`Pipeline`] composes the optional stages in their fixed order; the
//! session stage sits inside the pipeline and is always installed.

pub mod access_log;
pub mod cors;
pub mod deadline;
pub mod pipeline;
pub mod rate_limit;
pub mod recovery;
pub mod request_id;
pub mod security_headers;
pub mod session;

pub use access_log::access_log_layer;
pub use cors::cors_layer;
pub use deadline::{DeadlineLayer, RequestDeadline, ResponseGuard};
pub use pipeline::{Pipeline, PipelineConfig, Stage};
pub use rate_limit::{AdmissionLimiter, RateLimitError, RateLimitLayer};
pub use recovery::RecoveryLayer;
pub use request_id::{REQUEST_ID_HEADER, RequestIdExt, RequestIdLayer};
pub use security_headers::security_headers;
pub use session::SessionLayer;
