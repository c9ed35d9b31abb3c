//! Application configuration loaded from environment variables.
//!
//! All configuration is loaded from environment variables with defaults
//! suitable for local development. In production, set `APP_ENV=production`
//! and configure via environment variables or a `.env` file.
//!
//! # Pipeline Toggles
//!
//! - `LOG_REQUESTS`, `CORS_ENABLED`, `COMPRESSION_ENABLED`: enable a stage
//! - `RATE_LIMIT_RPS`: global admission rate (default: 100, 0 disables)
//! - `RATE_LIMIT_BURST`: bucket capacity (default: 200)
//! - `REQUEST_TIMEOUT_SECS`: per-request deadline (default: 30, 0 disables)

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Deployment environment, from `APP_ENV`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" | "local" | "test" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown environment '{other}'")),
        }
    }
}

/// Log output format, from `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // Server Configuration
    // =========================================================================
    /// Server host address (default: "0.0.0.0")
    pub host: String,

    /// Server port (default: 8080)
    pub port: u16,

    /// Public base URL, used to build the OAuth callback URL
    /// (default: "http://localhost:8080")
    pub base_url: String,

    pub environment: Environment,

    /// Directory holding `js/`, `css/`, `images/`, `fonts/`, `styles.css`
    /// and `favicon.ico` (default: "./public")
    pub static_dir: PathBuf,

    // =========================================================================
    // Token Store Configuration
    // =========================================================================
    /// SQLite connection URL (default: "sqlite://app.db")
    pub database_url: String,

    /// Interval between expired-session sweeps (default: 1 hour, 0 disables)
    pub session_cleanup_interval: Duration,

    // =========================================================================
    // Identity Provider Configuration
    // =========================================================================
    pub google_client_id: String,
    pub google_client_secret: String,

    // =========================================================================
    // Pipeline Configuration
    // =========================================================================
    /// Emit one access log line per request (default: true)
    pub log_requests: bool,

    /// Apply the security response headers (default: true)
    pub security_headers_enabled: bool,

    pub cors_enabled: bool,

    /// Allowed CORS origins; "*" mirrors any origin (default: "*")
    pub cors_allowed_origins: Vec<String>,

    pub compression_enabled: bool,

    /// Global admission rate in requests per second (default: 100, 0 disables)
    pub rate_limit_rps: u32,

    /// Token bucket capacity (default: 200)
    pub rate_limit_burst: u32,

    /// Per-request deadline (default: 30 seconds, 0 disables)
    pub request_timeout: Duration,

    // =========================================================================
    // Observability Configuration
    // =========================================================================
    pub log_format: LogFormat,

    /// Port for Prometheus metrics endpoint (default: 0 = disabled)
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if a value fails to parse or the
    /// resulting configuration is inconsistent.
    pub fn from_env() -> AppResult<Self> {
        // Load an .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let defaults = Self::default();

        let config = Self {
            // Server
            host: env::var("HOST").unwrap_or(defaults.host),
            port: Self::parse_env("PORT", defaults.port)?,
            base_url: env::var("BASE_URL").unwrap_or(defaults.base_url),
            environment: Self::parse_env("APP_ENV", defaults.environment)?,
            static_dir: env::var("STATIC_DIR").map_or(defaults.static_dir, PathBuf::from),

            // Token store
            database_url: env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            session_cleanup_interval: Duration::from_secs(Self::parse_env(
                "SESSION_CLEANUP_INTERVAL_SECS",
                defaults.session_cleanup_interval.as_secs(),
            )?),

            // Identity provider
            google_client_id: env::var("GOOGLE_CLIENT_ID").unwrap_or_default(),
            google_client_secret: env::var("GOOGLE_CLIENT_SECRET").unwrap_or_default(),

            // Pipeline
            log_requests: Self::parse_env("LOG_REQUESTS", defaults.log_requests)?,
            security_headers_enabled: Self::parse_env(
                "SECURITY_HEADERS_ENABLED",
                defaults.security_headers_enabled,
            )?,
            cors_enabled: Self::parse_env("CORS_ENABLED", defaults.cors_enabled)?,
            cors_allowed_origins: Self::parse_cors_origins(),
            compression_enabled: Self::parse_env(
                "COMPRESSION_ENABLED",
                defaults.compression_enabled,
            )?,
            rate_limit_rps: Self::parse_env("RATE_LIMIT_RPS", defaults.rate_limit_rps)?,
            rate_limit_burst: Self::parse_env("RATE_LIMIT_BURST", defaults.rate_limit_burst)?,
            request_timeout: Duration::from_secs(Self::parse_env(
                "REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),

            // Observability
            log_format: Self::parse_env("LOG_FORMAT", defaults.log_format)?,
            metrics_port: Self::parse_env("METRICS_PORT", defaults.metrics_port)?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values for consistency and correctness.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ConfigError` if validation fails.
    fn validate(&self) -> AppResult<()> {
        if self.rate_limiting_enabled() && self.rate_limit_burst == 0 {
            return Err(AppError::ConfigError(
                "RATE_LIMIT_BURST must be greater than 0 when rate limiting is enabled"
                    .to_string(),
            ));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(AppError::ConfigError(format!(
                "BASE_URL must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }

        if self.is_production()
            && (self.google_client_id.is_empty() || self.google_client_secret.is_empty())
        {
            return Err(AppError::ConfigError(
                "GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET are required in production"
                    .to_string(),
            ));
        }

        if self.cors_enabled && self.cors_allowed_origins.is_empty() {
            return Err(AppError::ConfigError(
                "CORS_ALLOWED_ORIGINS must list at least one origin when CORS is enabled"
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Get the full server address for binding.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// The hot-reload channel is a development aid only.
    pub fn hot_reload_enabled(&self) -> bool {
        !self.is_production()
    }

    /// Check if rate limiting is enabled.
    pub fn rate_limiting_enabled(&self) -> bool {
        self.rate_limit_rps > 0
    }

    /// Deadline for each request, or `None` when disabled.
    pub fn request_deadline(&self) -> Option<Duration> {
        (!self.request_timeout.is_zero()).then_some(self.request_timeout)
    }

    /// Check if Prometheus metrics export is enabled.
    pub fn metrics_enabled(&self) -> bool {
        self.metrics_port > 0
    }

    /// Get the metrics endpoint address.
    ///
    /// Returns `None` if metrics are disabled (port = 0).
    pub fn metrics_addr(&self) -> Option<std::net::SocketAddr> {
        if self.metrics_enabled() {
            Some(std::net::SocketAddr::from((
                [0, 0, 0, 0],
                self.metrics_port,
            )))
        } else {
            None
        }
    }

    /// Parse an environment variable into the specified type with a default value.
    fn parse_env<T>(name: &str, default: T) -> AppResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match env::var(name) {
            Ok(val) => val
                .trim()
                .parse()
                .map_err(|e| AppError::ConfigError(format!("Invalid {name}: {e}"))),
            Err(_) => Ok(default),
        }
    }

    /// Parse CORS allowed origins from environment variable.
    fn parse_cors_origins() -> Vec<String> {
        split_origins(&env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "*".to_string()))
    }
}

fn split_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Default configuration for testing and development.
///
/// Production deployments should use `Config::from_env()` instead.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Server
            host: "0.0.0.0".to_string(),
            port: 8080,
            base_url: "http://localhost:8080".to_string(),
            environment: Environment::Development,
            static_dir: PathBuf::from("./public"),
            // Token store
            database_url: "sqlite://app.db".to_string(),
            session_cleanup_interval: Duration::from_secs(3600),
            // Identity provider
            google_client_id: String::new(),
            google_client_secret: String::new(),
            // Pipeline
            log_requests: true,
            security_headers_enabled: true,
            cors_enabled: true,
            cors_allowed_origins: vec!["*".to_string()],
            compression_enabled: true,
            rate_limit_rps: 100,
            rate_limit_burst: 200,
            request_timeout: Duration::from_secs(30),
            // Observability
            log_format: LogFormat::Pretty,
            metrics_port: 0,
        }
    }
}
