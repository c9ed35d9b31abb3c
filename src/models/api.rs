use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service health status
    pub status: String,
    /// Live hot-reload connections
    pub reload_clients: usize,
    /// Service version
    pub version: String,
    /// Seconds since startup
    pub uptime_seconds: u64,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
}

/// Landing response; differs for anonymous and signed-in callers.
#[derive(Debug, Serialize)]
pub struct HomeResponse {
    pub authenticated: bool,
    pub greeting: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sign_in_url: Option<String>,
}

/// Query for `GET /auth/google`.
#[derive(Debug, Default, Deserialize)]
pub struct LoginQuery {
    /// Local path to return to after login
    pub redirect: Option<String>,
}

/// Query for the provider callback.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub state: Option<String>,
    pub code: Option<String>,
    /// Set by the provider when the user denied consent
    pub error: Option<String>,
}

/// Form body for `POST /settings/update-profile`.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileForm {
    #[serde(default)]
    pub name: String,
}

/// Response of the reload trigger.
#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    /// Connections the notification was queued for
    pub delivered: usize,
}
