use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use session_gate::auth::GoogleProvider;
use session_gate::config::LogFormat;
use session_gate::store::SqliteTokenStore;
use session_gate::{AppState, Config, build_router, metrics, utils};

#[tokio::main]
async fn main() -> ExitCode {
    // LOG_FORMAT is read before the full config so config errors are logged
    // in the requested format.
    let _ = dotenvy::dotenv();
    let json_logs = std::env::var("LOG_FORMAT")
        .ok()
        .and_then(|v| v.parse::<LogFormat>().ok())
        == Some(LogFormat::Json);
    init_tracing(json_logs);
    utils::install_panic_hook();

    info!("Starting session_gate v{}", env!("CARGO_PKG_VERSION"));

    match run().await {
        Ok(()) => ExitCode::from(exitcode::OK as u8),
        Err(exit_code) => ExitCode::from(exit_code as u8),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    }
}

/// Run the application, returning an exit code on error.
async fn run() -> Result<(), exitcode::ExitCode> {
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {e}");
        exitcode::CONFIG
    })?;
    info!(
        host = %config.host,
        port = %config.port,
        environment = ?config.environment,
        base_url = %config.base_url,
        "Configuration loaded"
    );

    if let Some(metrics_addr) = config.metrics_addr() {
        metrics::try_init_metrics(metrics_addr);
    }

    info!(database_url = %config.database_url, "Opening token store...");
    let store = SqliteTokenStore::connect(&config.database_url)
        .await
        .map_err(|e| {
            error!("Failed to open token store: {e}");
            exitcode::UNAVAILABLE
        })?;
    let closer = store.clone();

    let provider = GoogleProvider::new(
        &config.google_client_id,
        &config.google_client_secret,
        &config.base_url,
    )
    .map_err(|e| {
        error!("Failed to configure identity provider: {e}");
        exitcode::CONFIG
    })?;
    if config.google_client_id.is_empty() {
        info!("GOOGLE_CLIENT_ID is not set; sign-in will fail at the provider");
    }

    let addr: SocketAddr = config.server_addr().parse().map_err(|e| {
        error!("Invalid server address: {e}");
        exitcode::CONFIG
    })?;

    let state = AppState::new(config, Arc::new(store), Arc::new(provider)).map_err(|e| {
        error!("Invalid rate limit configuration: {e}");
        exitcode::CONFIG
    })?;
    let app = build_router(state.clone());

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!("Failed to bind to {addr}: {e}");
        exitcode::UNAVAILABLE
    })?;

    info!("Server listening on http://{addr}");
    info!("Endpoints:");
    info!("  GET  /                         - Landing");
    info!("  GET  /health                   - Health check");
    info!("  GET  /api/me                   - Current identity");
    info!("  GET  /auth/google              - Start sign-in");
    info!("  GET  /auth/google/callback     - Provider callback");
    info!("  GET  /auth/sign-out            - Sign out");
    info!("  POST /settings/update-profile  - Change display name");
    info!("  POST /settings/delete-account  - Delete account");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(utils::shutdown_signal())
    .await
    .map_err(|e| {
        error!("Server error: {e}");
        exitcode::SOFTWARE
    })?;

    info!("HTTP server stopped, shutting down background tasks...");
    state.shutdown().await;
    closer.close().await;

    info!("Server shutdown complete");
    Ok(())
}
