//! External identity provider (OAuth 2.0 authorization-code flow).

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error};
use url::Url;

use crate::error::{AppError, AppResult};
use crate::models::ProviderProfile;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

const GOOGLE_SCOPES: &str =
    "https://www.googleapis.com/auth/userinfo.email https://www.googleapis.com/auth/userinfo.profile";

/// Path of the OAuth callback, relative to the public base URL.
pub const CALLBACK_PATH: &str = "/auth/google/callback";

/// A login provider that turns an authorization code into a verified profile.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    /// URL the browser is sent to, carrying the CSRF `state`.
    fn authorization_url(&self, state: &str) -> String;

    /// Exchange an authorization code for the user's profile.
    async fn exchange(&self, code: &str) -> AppResult<ProviderProfile>;
}

/// Endpoints used by [`GoogleProvider`]. Overridable for tests.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub auth_url: Url,
    pub token_url: Url,
    pub userinfo_url: Url,
}

impl ProviderEndpoints {
    pub fn google() -> AppResult<Self> {
        Ok(Self {
            auth_url: parse_url(GOOGLE_AUTH_URL)?,
            token_url: parse_url(GOOGLE_TOKEN_URL)?,
            userinfo_url: parse_url(GOOGLE_USERINFO_URL)?,
        })
    }
}

fn parse_url(raw: &str) -> AppResult<Url> {
    Url::parse(raw).map_err(|e| AppError::ConfigError(format!("invalid URL {raw}: {e}")))
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Google OAuth 2.0 provider.
pub struct GoogleProvider {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    redirect_url: String,
    endpoints: ProviderEndpoints,
}

impl GoogleProvider {
    /// Create a provider whose callback lives under `base_url`.
    pub fn new(client_id: &str, client_secret: &str, base_url: &str) -> AppResult<Self> {
        Self::with_endpoints(client_id, client_secret, base_url, ProviderEndpoints::google()?)
    }

    pub fn with_endpoints(
        client_id: &str,
        client_secret: &str,
        base_url: &str,
        endpoints: ProviderEndpoints,
    ) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::ConfigError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_url: format!("{}{CALLBACK_PATH}", base_url.trim_end_matches('/')),
            endpoints,
        })
    }

    pub fn redirect_url(&self) -> &str {
        &self.redirect_url
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn authorization_url(&self, state: &str) -> String {
        let mut url = self.endpoints.auth_url.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.client_id)
            .append_pair("redirect_uri", &self.redirect_url)
            .append_pair("response_type", "code")
            .append_pair("scope", GOOGLE_SCOPES)
            .append_pair("state", state)
            .append_pair("access_type", "offline");
        url.into()
    }

    async fn exchange(&self, code: &str) -> AppResult<ProviderProfile> {
        let token: TokenResponse = self
            .http
            .post(self.endpoints.token_url.clone())
            .form(&[
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| {
                error!(error = %e, "Authorization code exchange failed");
                AppError::Provider(format!("code exchange failed: {e}"))
            })?
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("invalid token response: {e}")))?;

        debug!("Authorization code exchanged, fetching profile");

        let profile: ProviderProfile = self
            .http
            .get(self.endpoints.userinfo_url.clone())
            .bearer_auth(&token.access_token)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| {
                error!(error = %e, "Profile fetch failed");
                AppError::Provider(format!("profile fetch failed: {e}"))
            })?
            .json()
            .await
            .map_err(|e| AppError::Provider(format!("invalid profile response: {e}")))?;

        if profile.external_id.is_empty() {
            return Err(AppError::Provider("profile has no subject id".to_string()));
        }

        Ok(profile)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use axum::extract::Form;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use tokio::net::TcpListener;

    use super::*;

    async fn token_endpoint(Form(form): Form<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
        if form.get("code").map(String::as_str) == Some("good-code")
            && form.get("grant_type").map(String::as_str) == Some("authorization_code")
        {
            (StatusCode::OK, Json(json!({"access_token": "at-1", "token_type": "Bearer"})))
        } else {
            (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid_grant"})))
        }
    }

    async fn userinfo_endpoint(headers: HeaderMap) -> (StatusCode, Json<Value>) {
        let bearer = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if bearer == "Bearer at-1" {
            (
                StatusCode::OK,
                Json(json!({
                    "id": "g-123",
                    "email": "ada@example.com",
                    "verified_email": true,
                    "name": "Ada Lovelace",
                    "given_name": "Ada"
                })),
            )
        } else {
            (StatusCode::UNAUTHORIZED, Json(json!({})))
        }
    }

    async fn provider_against_mock() -> GoogleProvider {
        let app = Router::new()
            .route("/token", post(token_endpoint))
            .route("/userinfo", get(userinfo_endpoint));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let base = format!("http://{addr}");
        let endpoints = ProviderEndpoints {
            auth_url: Url::parse(&format!("{base}/auth")).unwrap(),
            token_url: Url::parse(&format!("{base}/token")).unwrap(),
            userinfo_url: Url::parse(&format!("{base}/userinfo")).unwrap(),
        };
        GoogleProvider::with_endpoints("client", "secret", "http://localhost:8080", endpoints)
            .unwrap()
    }

    #[test]
    fn test_authorization_url_carries_state_and_scopes() {
        let provider =
            GoogleProvider::new("client-id", "secret", "https://app.example.com/").unwrap();
        let url = Url::parse(&provider.authorization_url("state-xyz")).unwrap();
        let params: HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(url.host_str(), Some("accounts.google.com"));
        assert_eq!(params["state"], "state-xyz");
        assert_eq!(params["client_id"], "client-id");
        assert_eq!(params["response_type"], "code");
        assert_eq!(
            params["redirect_uri"],
            "https://app.example.com/auth/google/callback"
        );
        assert!(params["scope"].contains("userinfo.email"));
    }

    #[tokio::test]
    async fn test_exchange_returns_profile() {
        let provider = provider_against_mock().await;
        let profile = provider.exchange("good-code").await.unwrap();

        assert_eq!(profile.external_id, "g-123");
        assert_eq!(profile.email, "ada@example.com");
        assert_eq!(profile.given_name.as_deref(), Some("Ada"));
    }

    #[tokio::test]
    async fn test_exchange_rejected_code_is_provider_error() {
        let provider = provider_against_mock().await;
        let err = provider.exchange("bad-code").await.unwrap_err();
        assert!(matches!(err, AppError::Provider(_)));
    }
}
