//! Prometheus metrics for the gate.
//!
//! Metrics are exposed on a dedicated listener when `METRICS_PORT` is set.
//! Recording functions are safe to call before (or without) installation;
//! the `metrics` facade drops samples when no recorder is installed.
//!
//! # Available Metrics
//!
//! ## Counters
//! - `gate_logins_total` - Completed logins (label: kind = new | returning)
//! - `gate_sign_outs_total` - Explicit sign-outs
//! - `gate_rate_limited_total` - Requests rejected by the admission limiter
//! - `gate_deadline_exceeded_total` - Requests answered with 408
//! - `gate_panics_recovered_total` - Handler panics turned into 500s
//! - `gate_reload_deliveries_total` - Reload messages (label: outcome)
//! - `gate_expired_sessions_removed_total` - Sessions removed by the sweep
//!
//! ## Histograms
//! - `gate_request_duration_seconds` - Request duration (label: status)
//!
//! ## Gauges
//! - `gate_reload_clients` - Currently connected hot-reload clients

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{error, info};

/// Metric names as constants for consistency.
pub mod names {
    pub const LOGINS_TOTAL: &str = "gate_logins_total";
    pub const SIGN_OUTS_TOTAL: &str = "gate_sign_outs_total";
    pub const RATE_LIMITED_TOTAL: &str = "gate_rate_limited_total";
    pub const DEADLINE_EXCEEDED_TOTAL: &str = "gate_deadline_exceeded_total";
    pub const PANICS_RECOVERED_TOTAL: &str = "gate_panics_recovered_total";
    pub const RELOAD_DELIVERIES_TOTAL: &str = "gate_reload_deliveries_total";
    pub const EXPIRED_SESSIONS_REMOVED_TOTAL: &str = "gate_expired_sessions_removed_total";
    pub const REQUEST_DURATION_SECONDS: &str = "gate_request_duration_seconds";
    pub const RELOAD_CLIENTS: &str = "gate_reload_clients";
}

/// Initialize the Prometheus metrics exporter on `metrics_addr`.
pub fn init_metrics(metrics_addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {e}"))?;

    describe_counter!(names::LOGINS_TOTAL, "Total number of completed logins");
    describe_counter!(names::SIGN_OUTS_TOTAL, "Total number of sign-outs");
    describe_counter!(
        names::RATE_LIMITED_TOTAL,
        "Requests rejected by the global admission limiter"
    );
    describe_counter!(
        names::DEADLINE_EXCEEDED_TOTAL,
        "Requests that exceeded their deadline"
    );
    describe_counter!(
        names::PANICS_RECOVERED_TOTAL,
        "Handler panics recovered into 500 responses"
    );
    describe_counter!(
        names::RELOAD_DELIVERIES_TOTAL,
        "Reload messages offered to hot-reload clients"
    );
    describe_counter!(
        names::EXPIRED_SESSIONS_REMOVED_TOTAL,
        "Sessions removed by the expiry sweep"
    );

    describe_histogram!(
        names::REQUEST_DURATION_SECONDS,
        "HTTP request duration in seconds"
    );

    describe_gauge!(
        names::RELOAD_CLIENTS,
        "Currently connected hot-reload clients"
    );

    info!(addr = %metrics_addr, "Prometheus metrics endpoint started");
    Ok(())
}

/// Try to initialize metrics, logging any errors but not failing.
pub fn try_init_metrics(metrics_addr: SocketAddr) {
    if let Err(e) = init_metrics(metrics_addr) {
        error!(error = %e, "Failed to initialize metrics, continuing without metrics");
    }
}

// =============================================================================
// Counter Recording Functions
// =============================================================================

pub fn record_login(new_identity: bool) {
    let kind = if new_identity { "new" } else { "returning" };
    counter!(names::LOGINS_TOTAL, "kind" => kind).increment(1);
}

pub fn record_sign_out() {
    counter!(names::SIGN_OUTS_TOTAL).increment(1);
}

pub fn record_rate_limited() {
    counter!(names::RATE_LIMITED_TOTAL).increment(1);
}

pub fn record_deadline_exceeded() {
    counter!(names::DEADLINE_EXCEEDED_TOTAL).increment(1);
}

pub fn record_panic_recovered() {
    counter!(names::PANICS_RECOVERED_TOTAL).increment(1);
}

/// Record reload delivery outcomes: `delivered`, `full` or `closed`.
pub fn record_reload_delivery(outcome: &'static str, count: u64) {
    counter!(names::RELOAD_DELIVERIES_TOTAL, "outcome" => outcome).increment(count);
}

pub fn record_expired_sessions_removed(count: u64) {
    counter!(names::EXPIRED_SESSIONS_REMOVED_TOTAL).increment(count);
}

// =============================================================================
// Histogram Recording Functions
// =============================================================================

/// Record HTTP request duration.
pub fn record_request_duration(status: u16, duration_secs: f64) {
    histogram!(names::REQUEST_DURATION_SECONDS, "status" => status.to_string()).record(duration_secs);
}

// =============================================================================
// Gauge Recording Functions
// =============================================================================

pub fn set_reload_clients(count: usize) {
    gauge!(names::RELOAD_CLIENTS).set(count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    // These only verify the recording functions don't panic without an
    // installed recorder.

    #[test]
    fn test_record_login() {
        record_login(true);
        record_login(false);
    }

    #[test]
    fn test_record_request_duration() {
        record_request_duration(200, 0.1);
    }

    #[test]
    fn test_record_reload_delivery() {
        record_reload_delivery("delivered", 3);
        record_reload_delivery("closed", 1);
    }

    #[test]
    fn test_set_reload_clients() {
        set_reload_clients(0);
        set_reload_clients(5);
    }
}
