//! Shared application state for Axum handlers.
//!
//! Holds the token store, the authenticator built on it, the identity
//! provider, the process-wide admission limiter and the hot-reload
//! registry. Everything is behind `Arc` or is itself a cheap handle, so
//! the state is cloned per request.
//!
//! # Structured Concurrency
//!
//! Background tasks are managed using `tokio_util::task::TaskTracker` and
//! `CancellationToken`. Call `shutdown()` to stop them before exit.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::FromRef;
use chrono::Utc;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::auth::{IdentityProvider, SessionAuthenticator};
use crate::config::Config;
use crate::hotreload::ReloadRegistry;
use crate::metrics;
use crate::middleware::{AdmissionLimiter, RateLimitError};
use crate::store::TokenStore;

/// Shared application state for Axum handlers.
///
/// # Lifecycle
///
/// Background tasks are spawned when the state is created, so construction
/// must happen inside a Tokio runtime. Call `shutdown()` before dropping:
///
/// ```rust,ignore
/// let state = AppState::new(config, store, provider)?;
/// // ... serve ...
/// state.shutdown().await;
/// ```
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn TokenStore>,
    pub authenticator: SessionAuthenticator,
    pub provider: Arc<dyn IdentityProvider>,
    /// Process-wide token bucket, `None` when rate limiting is disabled
    pub rate_limiter: Option<Arc<AdmissionLimiter>>,
    pub reload_registry: ReloadRegistry,
    /// Timestamp when the application started
    pub started_at: Instant,
    /// Tracks spawned background tasks for graceful shutdown
    task_tracker: TaskTracker,
    /// Cancellation token for signaling background tasks to stop
    cancellation_token: CancellationToken,
}

impl AppState {
    /// Create application state and start background tasks.
    ///
    /// # Errors
    ///
    /// Returns `RateLimitError` if rate limiting is enabled with a zero burst.
    pub fn new(
        config: Config,
        store: Arc<dyn TokenStore>,
        provider: Arc<dyn IdentityProvider>,
    ) -> Result<Self, RateLimitError> {
        let rate_limiter = if config.rate_limiting_enabled() {
            Some(Arc::new(AdmissionLimiter::new(
                config.rate_limit_rps,
                config.rate_limit_burst,
            )?))
        } else {
            info!("Rate limiting disabled (RATE_LIMIT_RPS=0)");
            None
        };

        let state = Self {
            authenticator: SessionAuthenticator::new(store.clone()),
            config: Arc::new(config),
            store,
            provider,
            rate_limiter,
            reload_registry: ReloadRegistry::new(),
            started_at: Instant::now(),
            task_tracker: TaskTracker::new(),
            cancellation_token: CancellationToken::new(),
        };

        state.spawn_session_sweep_task();

        Ok(state)
    }

    /// Spawn the periodic expired-session sweep.
    ///
    /// Disabled when `SESSION_CLEANUP_INTERVAL_SECS=0`.
    fn spawn_session_sweep_task(&self) {
        let period = self.config.session_cleanup_interval;
        if period.is_zero() {
            info!("Expired session sweep disabled");
            return;
        }

        let store = self.store.clone();
        let cancel = self.cancellation_token.clone();

        self.task_tracker.spawn(async move {
            let mut ticker = interval(period);

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Session sweep task received cancellation signal");
                        break;
                    }
                    _ = ticker.tick() => {
                        sweep_expired_sessions(store.as_ref()).await;
                    }
                }
            }

            debug!("Session sweep task shutting down");
        });
    }

    /// Gracefully shutdown all background tasks.
    pub async fn shutdown(&self) {
        info!("Initiating graceful shutdown of background tasks");

        self.cancellation_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("All background tasks have completed");
    }

    /// Seconds since the state was created.
    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl FromRef<AppState> for ReloadRegistry {
    fn from_ref(state: &AppState) -> Self {
        state.reload_registry.clone()
    }
}

impl FromRef<AppState> for SessionAuthenticator {
    fn from_ref(state: &AppState) -> Self {
        state.authenticator.clone()
    }
}

/// Remove sessions that have expired as of now.
async fn sweep_expired_sessions(store: &dyn TokenStore) {
    match store.delete_expired_sessions(Utc::now()).await {
        Ok(0) => debug!("No expired sessions to remove"),
        Ok(removed) => {
            metrics::record_expired_sessions_removed(removed);
            info!(removed, "Removed expired sessions");
        }
        Err(e) => warn!(error = %e, "Expired session sweep failed"),
    }
}
