//! Shared fixtures for integration tests.
#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::header::{COOKIE, HOST, LOCATION, SET_COOKIE};
use axum::http::{Request, Response, StatusCode};
use tower::ServiceExt;

use session_gate::auth::IdentityProvider;
use session_gate::models::ProviderProfile;
use session_gate::store::SqliteTokenStore;
use session_gate::{AppError, AppResult, AppState, Config};

/// Authorization code the fake provider accepts.
pub const GOOD_CODE: &str = "good-code";

/// Identity provider that accepts [`GOOD_CODE`] and returns a settable profile.
pub struct FakeProvider {
    profile: Mutex<ProviderProfile>,
}

impl FakeProvider {
    pub fn new(profile: ProviderProfile) -> Self {
        Self {
            profile: Mutex::new(profile),
        }
    }

    pub fn set_profile(&self, profile: ProviderProfile) {
        *self.profile.lock().unwrap() = profile;
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorization_url(&self, state: &str) -> String {
        format!("https://provider.test/authorize?state={state}")
    }

    async fn exchange(&self, code: &str) -> AppResult<ProviderProfile> {
        if code == GOOD_CODE {
            Ok(self.profile.lock().unwrap().clone())
        } else {
            Err(AppError::Provider("invalid_grant".to_string()))
        }
    }
}

pub fn profile(external_id: &str, name: &str) -> ProviderProfile {
    ProviderProfile {
        external_id: external_id.to_string(),
        email: format!("{external_id}@example.com"),
        verified_email: true,
        name: name.to_string(),
        given_name: None,
        family_name: None,
        picture: None,
        locale: None,
    }
}

/// Development config with rate limiting and the sweep turned off.
pub fn test_config() -> Config {
    Config {
        rate_limit_rps: 0,
        session_cleanup_interval: Duration::ZERO,
        ..Config::default()
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<SqliteTokenStore>,
    pub provider: Arc<FakeProvider>,
}

impl TestApp {
    pub async fn new(config: Config) -> Self {
        let store = Arc::new(SqliteTokenStore::in_memory().await.unwrap());
        let provider = Arc::new(FakeProvider::new(profile("g-123", "Ada Lovelace")));
        let state = AppState::new(config, store.clone(), provider.clone()).unwrap();
        Self {
            state,
            store,
            provider,
        }
    }

    pub fn router(&self) -> Router {
        session_gate::build_router(self.state.clone())
    }
}

/// A request from a browser on localhost, optionally carrying cookies.
pub fn request(method: &str, uri: &str, cookies: &[String]) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(HOST, "localhost:8080");
    if !cookies.is_empty() {
        builder = builder.header(COOKIE, cookies.join("; "));
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn send(router: &Router, req: Request<Body>) -> Response<Body> {
    router.clone().oneshot(req).await.unwrap()
}

pub async fn body_string(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

/// Every `Set-Cookie` header on the response.
pub fn set_cookies(response: &Response<Body>) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

/// Full `Set-Cookie` line for `name`.
pub fn set_cookie_line(response: &Response<Body>, name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    set_cookies(response)
        .into_iter()
        .find(|line| line.starts_with(&prefix))
}

/// The `name=value` pair to send back, as a browser would.
pub fn cookie_pair(response: &Response<Body>, name: &str) -> Option<String> {
    set_cookie_line(response, name).map(|line| line.split(';').next().unwrap().to_string())
}

/// Value of a query parameter in a URL or path.
pub fn query_param(url: &str, key: &str) -> Option<String> {
    let query = url.split_once('?')?.1;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Result of a completed login through the router.
pub struct LoggedIn {
    /// `session=<token>` pair for later requests
    pub cookie: String,
    pub token: String,
    pub callback: Response<Body>,
}

/// Drive the login and callback endpoints for the provider's current profile.
pub async fn login(router: &Router, return_to: &str) -> LoggedIn {
    let start = send(
        router,
        request("GET", &format!("/auth/google?redirect={return_to}"), &[]),
    )
    .await;
    assert_eq!(start.status(), StatusCode::TEMPORARY_REDIRECT);

    let state = query_param(&location(&start), "state").unwrap();
    let round_trip = vec![
        cookie_pair(&start, "oauth_state").unwrap(),
        cookie_pair(&start, "oauth_redirect").unwrap(),
    ];

    let callback = send(
        router,
        request(
            "GET",
            &format!("/auth/google/callback?state={state}&code={GOOD_CODE}"),
            &round_trip,
        ),
    )
    .await;
    assert_eq!(callback.status(), StatusCode::TEMPORARY_REDIRECT);

    let cookie = cookie_pair(&callback, "session").unwrap();
    let token = cookie.trim_start_matches("session=").to_string();

    LoggedIn {
        cookie,
        token,
        callback,
    }
}

/// A form POST from a browser on localhost.
pub fn form_request(uri: &str, body: &str, cookies: &[String]) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(HOST, "localhost:8080")
        .header(
            axum::http::header::CONTENT_TYPE,
            "application/x-www-form-urlencoded",
        );
    if !cookies.is_empty() {
        builder = builder.header(COOKIE, cookies.join("; "));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}
