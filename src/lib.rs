//! # session_gate
//!
//! Session-cookie authentication and a composable request pipeline for
//! Axum, with a development hot-reload broadcast channel:
//!
//! - **Sessions**: opaque random bearer tokens in an HttpOnly cookie,
//!   resolved against a SQLite token store on every request
//! - **Login**: OAuth 2.0 authorization-code flow with CSRF state
//! - **Pipeline**: recovery, request id, access log, security headers,
//!   CORS, compression, global rate limiting and deadlines in a fixed order
//! - **Hot reload**: WebSocket fan-out of `"reload"` to connected browsers
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum HTTP Server                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Pipeline (Recovery → Request ID → Log → … → Deadline)      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Session authentication (cookie → identity)                 │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Handlers (home, auth, settings, health)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TokenStore (SQLite via sqlx)      IdentityProvider (OAuth) │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use session_gate::auth::GoogleProvider;
//! use session_gate::store::SqliteTokenStore;
//! use session_gate::{AppState, Config, build_router};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let store = Arc::new(SqliteTokenStore::connect(&config.database_url).await?);
//! let provider = Arc::new(GoogleProvider::new(
//!     &config.google_client_id,
//!     &config.google_client_secret,
//!     &config.base_url,
//! )?);
//!
//! let state = AppState::new(config, store, provider)?;
//! let app = build_router(state.clone());
//! // Serve `app`, then:
//! state.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod hotreload;
pub mod metrics;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
pub mod utils;
pub mod validation;

// Re-exports for convenience
pub use config::Config;
pub use error::{AppError, AppResult};
pub use routes::{app_routes, assemble, build_router};
pub use state::AppState;
