//! Request pipeline behavior as seen by clients of the assembled router.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::http::header::{CONTENT_ENCODING, RETRY_AFTER};
use axum::routing::get;
use session_gate::config::Environment;
use session_gate::error::{INTERNAL_ERROR_BODY, RATE_LIMITED_BODY, TIMEOUT_BODY};
use session_gate::{AppState, Config, app_routes, assemble};

use common::{TestApp, body_string, request, send, test_config};

async fn explode() -> &'static str {
    panic!("handler exploded")
}

async fn dawdle() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "too late"
}

fn router_with_extras(state: AppState) -> Router {
    let routes = app_routes()
        .route("/explode", get(explode))
        .route("/dawdle", get(dawdle));
    assemble(routes, state)
}

// =============================================================================
// Recovery
// =============================================================================

#[tokio::test]
async fn test_panicking_handler_returns_500() {
    let app = TestApp::new(test_config()).await;
    let router = router_with_extras(app.state.clone());

    let response = send(&router, request("GET", "/explode", &[])).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(response).await, INTERNAL_ERROR_BODY);

    // The server keeps serving
    let health = send(&router, request("GET", "/health", &[])).await;
    assert_eq!(health.status(), StatusCode::OK);
}

// =============================================================================
// Deadline
// =============================================================================

#[tokio::test]
async fn test_slow_handler_times_out() {
    let config = Config {
        request_timeout: Duration::from_millis(50),
        ..test_config()
    };
    let app = TestApp::new(config).await;
    let router = router_with_extras(app.state.clone());

    let response = send(&router, request("GET", "/dawdle", &[])).await;

    assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
    assert_eq!(body_string(response).await, TIMEOUT_BODY);
}

#[tokio::test]
async fn test_zero_timeout_disables_deadline() {
    let config = Config {
        request_timeout: Duration::ZERO,
        ..test_config()
    };
    let app = TestApp::new(config).await;
    let router = app.router();

    let response = send(&router, request("GET", "/health", &[])).await;

    assert_eq!(response.status(), StatusCode::OK);
}

// =============================================================================
// Rate Limiting
// =============================================================================

#[tokio::test]
async fn test_burst_exhaustion_returns_429() {
    let config = Config {
        rate_limit_rps: 1,
        rate_limit_burst: 2,
        ..test_config()
    };
    let app = TestApp::new(config).await;
    let router = app.router();

    for _ in 0..2 {
        let response = send(&router, request("GET", "/health", &[])).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let rejected = send(&router, request("GET", "/health", &[])).await;
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(rejected.headers().contains_key(RETRY_AFTER));
    // Outer stages still decorate rejected responses
    assert!(rejected.headers().contains_key("x-request-id"));
    assert_eq!(body_string(rejected).await, RATE_LIMITED_BODY);
}

#[tokio::test]
async fn test_rate_limit_disabled_by_zero_rps() {
    let app = TestApp::new(test_config()).await;
    let router = app.router();

    for _ in 0..50 {
        let response = send(&router, request("GET", "/health", &[])).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}

// =============================================================================
// Headers
// =============================================================================

#[tokio::test]
async fn test_security_headers_and_request_id_present() {
    let app = TestApp::new(test_config()).await;
    let router = app.router();

    let response = send(&router, request("GET", "/health", &[])).await;

    let headers = response.headers();
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert!(headers.contains_key("content-security-policy"));
    assert!(headers.contains_key("referrer-policy"));
    assert!(!headers.get("x-request-id").unwrap().is_empty());
}

#[tokio::test]
async fn test_caller_request_id_echoed() {
    let app = TestApp::new(test_config()).await;
    let router = app.router();

    let mut req = request("GET", "/health", &[]);
    req.headers_mut()
        .insert("x-request-id", "trace-abc-123".parse().unwrap());
    let response = send(&router, req).await;

    assert_eq!(response.headers().get("x-request-id").unwrap(), "trace-abc-123");
}

#[tokio::test]
async fn test_security_headers_can_be_disabled() {
    let config = Config {
        security_headers_enabled: false,
        ..test_config()
    };
    let app = TestApp::new(config).await;
    let router = app.router();

    let response = send(&router, request("GET", "/health", &[])).await;

    assert!(!response.headers().contains_key("x-frame-options"));
}

#[tokio::test]
async fn test_cors_preflight_answered() {
    let config = Config {
        cors_allowed_origins: vec!["https://app.example.com".to_string()],
        ..test_config()
    };
    let app = TestApp::new(config).await;
    let router = app.router();

    let mut req = request("OPTIONS", "/api/me", &[]);
    let headers = req.headers_mut();
    headers.insert("origin", "https://app.example.com".parse().unwrap());
    headers.insert("access-control-request-method", "GET".parse().unwrap());
    let response = send(&router, req).await;

    assert!(response.status().is_success());
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .unwrap(),
        "https://app.example.com"
    );
}

#[tokio::test]
async fn test_gzip_applied_when_accepted() {
    let app = TestApp::new(test_config()).await;
    let router = app.router();

    let mut req = request("GET", "/health", &[]);
    req.headers_mut()
        .insert("accept-encoding", "gzip".parse().unwrap());
    let response = send(&router, req).await;

    assert_eq!(response.headers().get(CONTENT_ENCODING).unwrap(), "gzip");
}

#[tokio::test]
async fn test_compression_can_be_disabled() {
    let config = Config {
        compression_enabled: false,
        ..test_config()
    };
    let app = TestApp::new(config).await;
    let router = app.router();

    let mut req = request("GET", "/health", &[]);
    req.headers_mut()
        .insert("accept-encoding", "gzip".parse().unwrap());
    let response = send(&router, req).await;

    assert!(!response.headers().contains_key(CONTENT_ENCODING));
}

// =============================================================================
// Hot-reload Mounting
// =============================================================================

#[tokio::test]
async fn test_trigger_route_mounted_in_development() {
    let app = TestApp::new(test_config()).await;
    let router = app.router();

    let response = send(&router, request("POST", "/__hotreload_trigger", &[])).await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(json["delivered"], 0);

    let wrong_method = send(&router, request("GET", "/__hotreload_trigger", &[])).await;
    assert_eq!(wrong_method.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_hot_reload_absent_in_production() {
    let config = Config {
        environment: Environment::Production,
        google_client_id: "client".to_string(),
        google_client_secret: "secret".to_string(),
        ..test_config()
    };
    let app = TestApp::new(config).await;
    let router = app.router();

    let response = send(&router, request("POST", "/__hotreload_trigger", &[])).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_hot_reload_bypasses_rate_limit() {
    let config = Config {
        rate_limit_rps: 1,
        rate_limit_burst: 1,
        ..test_config()
    };
    let app = TestApp::new(config).await;
    let router = app.router();

    let first = send(&router, request("GET", "/health", &[])).await;
    assert_eq!(first.status(), StatusCode::OK);

    for _ in 0..3 {
        let response = send(&router, request("POST", "/__hotreload_trigger", &[])).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
