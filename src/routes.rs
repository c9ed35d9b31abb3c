//! Application routing configuration with middleware stack.
//!
//! # Layout
//!
//! ```text
//! Request
//!    │
//!    ├── /__hotreload, /__hotreload_trigger   (outside the pipeline)
//!    │
//!    ▼
//! ┌──────────────────────────────┐
//! │  Pipeline (optional stages)  │ ← recovery … deadline, see middleware::pipeline
//! └──────────────┬───────────────┘
//!                ▼
//! ┌──────────────────────────────┐
//! │  Session authentication      │ ← always on, never rejects
//! └──────────────┬───────────────┘
//!                ▼
//!             Handler
//! ```
//!
//! # Routes
//!
//! - `GET /`, `GET /api/me`, `GET /health`
//! - `GET /auth/google`, `GET /auth/google/callback`, `GET /auth/sign-out`
//! - `POST /settings/update-profile`, `POST /settings/delete-account`
//! - static assets: `/js/`, `/css/`, `/images/`, `/fonts/`, `/styles.css`,
//!   `/favicon.ico` from `STATIC_DIR`

use std::path::Path;

use axum::Router;
use axum::routing::{get, post};
use tower_http::services::{ServeDir, ServeFile};
use tracing::info;

use crate::handlers;
use crate::hotreload;
use crate::middleware::{Pipeline, PipelineConfig, SessionLayer};
use crate::state::AppState;

/// Application routes without any middleware.
pub fn app_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::home))
        .route("/health", get(handlers::health_check))
        .route("/api/me", get(handlers::me))
        .route("/auth/google", get(handlers::google_login))
        .route("/auth/google/callback", get(handlers::google_callback))
        .route("/auth/sign-out", get(handlers::sign_out))
        .route("/settings/update-profile", post(handlers::update_profile))
        .route("/settings/delete-account", post(handlers::delete_account))
}

/// Asset directories served under a path prefix of the same name.
const ASSET_DIRS: [&str; 4] = ["js", "css", "images", "fonts"];

/// Single asset files served at the site root.
const ASSET_FILES: [&str; 2] = ["styles.css", "favicon.ico"];

/// Static asset routes backed by `dir`. Missing files are 404s.
pub fn static_assets<S>(dir: &Path) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let mut router = Router::new();
    for name in ASSET_DIRS {
        router = router.nest_service(&format!("/{name}"), ServeDir::new(dir.join(name)));
    }
    for name in ASSET_FILES {
        router = router.route_service(&format!("/{name}"), ServeFile::new(dir.join(name)));
    }
    router
}

/// Build the application router with all routes and middleware configured.
pub fn build_router(state: AppState) -> Router {
    assemble(app_routes(), state)
}

/// Wrap `routes` in session authentication and the configured pipeline,
/// mount the hot-reload channel beside them, and attach `state`.
pub fn assemble(routes: Router<AppState>, state: AppState) -> Router {
    let config = &state.config;

    let routes = routes
        .merge(static_assets(&config.static_dir))
        .layer(SessionLayer::new(state.authenticator.clone()));

    let pipeline = Pipeline::new(PipelineConfig::from(config.as_ref()))
        .with_rate_limiter(state.rate_limiter.clone());
    info!(stages = ?pipeline.stages(), "Request pipeline assembled");

    let mut router = pipeline.apply(routes);

    if config.hot_reload_enabled() {
        info!(
            socket = hotreload::SOCKET_PATH,
            trigger = hotreload::TRIGGER_PATH,
            "Hot-reload channel enabled"
        );
        router = router.merge(hotreload::routes::<AppState>());
    } else {
        info!("Hot-reload channel disabled in production");
    }

    router.with_state(state)
}
