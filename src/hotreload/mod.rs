//! Development hot-reload channel.
//!
//! Browsers connect to `/__hotreload` and are told to reload whenever
//! something POSTs to `/__hotreload_trigger`. Both routes are mounted
//! outside the request pipeline.

mod registry;
mod socket;

use axum::Router;
use axum::extract::FromRef;
use axum::routing::{get, post};

pub use registry::{
    ConnectionId, OUTBOUND_QUEUE_CAPACITY, RELOAD_MESSAGE, Registration, ReloadRegistry,
};
pub use socket::{hot_reload_socket, trigger_reload};

/// WebSocket endpoint path.
pub const SOCKET_PATH: &str = "/__hotreload";

/// Broadcast trigger path.
pub const TRIGGER_PATH: &str = "/__hotreload_trigger";

/// Routes for the hot-reload channel.
pub fn routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ReloadRegistry: FromRef<S>,
{
    Router::new()
        .route(SOCKET_PATH, get(hot_reload_socket))
        .route(TRIGGER_PATH, post(trigger_reload))
}
