//! Request pipeline assembly.
//!
//! # Stage Order (outermost first)
//!
//! ```text
//! Request
//!    │
//!    ▼
//! Recovery          ← 500 on panic, wraps everything below
//! Request ID        ← X-Request-Id assigned before any log line
//! Access Log        ← method, path, status, duration, ip, request id
//! Security Headers
//! CORS
//! Compression
//! Rate Limit        ← 429 short-circuit, nothing below runs
//! Deadline          ← 408 once the route overruns
//!    │
//!    ▼
//! Session auth + route dispatch
//! ```
//!
//! The order is fixed. Disabled stages are left out of the stack entirely
//! rather than installed as pass-throughs.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::middleware::from_fn;
use tower_http::compression::CompressionLayer;
use tracing::info;

use super::access_log::access_log_layer;
use super::cors::cors_layer;
use super::deadline::DeadlineLayer;
use super::rate_limit::{AdmissionLimiter, RateLimitLayer};
use super::recovery::RecoveryLayer;
use super::request_id::RequestIdLayer;
use super::security_headers::security_headers;
use crate::config::Config;

/// Which optional stages to install.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub recovery: bool,
    pub request_id: bool,
    pub access_log: bool,
    pub security_headers: bool,
    /// Allowed origins, or `None` to leave CORS out
    pub cors_origins: Option<Vec<String>>,
    pub compression: bool,
    /// Per-request deadline, or `None` to leave the stage out
    pub request_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            recovery: true,
            request_id: true,
            access_log: true,
            security_headers: true,
            cors_origins: Some(vec!["*".to_string()]),
            compression: true,
            request_timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl PipelineConfig {
    /// Every stage off.
    pub fn bare() -> Self {
        Self {
            recovery: false,
            request_id: false,
            access_log: false,
            security_headers: false,
            cors_origins: None,
            compression: false,
            request_timeout: None,
        }
    }
}

impl From<&Config> for PipelineConfig {
    fn from(config: &Config) -> Self {
        Self {
            recovery: true,
            request_id: true,
            access_log: config.log_requests,
            security_headers: config.security_headers_enabled,
            cors_origins: config
                .cors_enabled
                .then(|| config.cors_allowed_origins.clone()),
            compression: config.compression_enabled,
            request_timeout: config.request_deadline(),
        }
    }
}

/// One installed pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Recovery,
    RequestId,
    AccessLog,
    SecurityHeaders,
    Cors,
    Compression,
    RateLimit,
    Deadline(Duration),
}

/// Composes the configured stages around a router.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    limiter: Option<Arc<AdmissionLimiter>>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            limiter: None,
        }
    }

    /// Install rate limiting backed by the process-wide `limiter`.
    pub fn with_rate_limiter(mut self, limiter: Option<Arc<AdmissionLimiter>>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Installed stages, outermost first.
    pub fn stages(&self) -> Vec<Stage> {
        let config = &self.config;
        let mut stages = Vec::with_capacity(8);

        if config.recovery {
            stages.push(Stage::Recovery);
        }
        if config.request_id {
            stages.push(Stage::RequestId);
        }
        if config.access_log {
            stages.push(Stage::AccessLog);
        }
        if config.security_headers {
            stages.push(Stage::SecurityHeaders);
        }
        if config.cors_origins.is_some() {
            stages.push(Stage::Cors);
        }
        if config.compression {
            stages.push(Stage::Compression);
        }
        if self.limiter.is_some() {
            stages.push(Stage::RateLimit);
        }
        if let Some(timeout) = config.request_timeout {
            stages.push(Stage::Deadline(timeout));
        }

        stages
    }

    /// Wrap `router` in the installed stages.
    pub fn apply<S>(&self, mut router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        // Router::layer wraps what is already there, so build inside-out
        for stage in self.stages().into_iter().rev() {
            router = match stage {
                Stage::Deadline(timeout) => {
                    info!(timeout_secs = timeout.as_secs_f64(), "Request deadline enabled");
                    router.layer(DeadlineLayer::new(timeout))
                }
                Stage::RateLimit => match &self.limiter {
                    Some(limiter) => {
                        info!(
                            rps = limiter.rps(),
                            burst = limiter.burst(),
                            "Global rate limiting enabled"
                        );
                        router.layer(RateLimitLayer::new(limiter.clone()))
                    }
                    None => router,
                },
                Stage::Compression => {
                    info!("Response compression enabled");
                    router.layer(CompressionLayer::new())
                }
                Stage::Cors => {
                    let origins = self.config.cors_origins.as_deref().unwrap_or_default();
                    info!(origins = ?origins, "CORS enabled");
                    router.layer(cors_layer(origins))
                }
                Stage::SecurityHeaders => router.layer(from_fn(security_headers)),
                Stage::AccessLog => router.layer(access_log_layer()),
                Stage::RequestId => router.layer(RequestIdLayer::new()),
                Stage::Recovery => router.layer(RecoveryLayer::new()),
            };
        }

        router
    }
}
