use std::backtrace::Backtrace;
use std::convert::Infallible;
use std::net::SocketAddr;

use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::Extensions;
use axum::http::request::Parts;
use tokio::signal;
use tracing::{error, warn};

use crate::middleware::recovery::panic_message;

/// Placeholder for requests served without connection info.
pub const UNKNOWN_REMOTE: &str = "unknown";

/// Peer address recorded by `into_make_service_with_connect_info`.
pub fn remote_addr(extensions: &Extensions) -> String {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map_or_else(|| UNKNOWN_REMOTE.to_string(), |ConnectInfo(addr)| addr.to_string())
}

/// Extractor for the peer address, `"unknown"` when not recorded.
#[derive(Debug, Clone)]
pub struct ClientAddr(pub String);

impl<S: Send + Sync> FromRequestParts<S> for ClientAddr {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self(remote_addr(&parts.extensions)))
    }
}

/// Log every panic with a captured backtrace.
///
/// The default hook's stderr output is replaced so panics land in the
/// structured log stream alongside the request that caused them.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        error!(
            panic = panic_message(info.payload()),
            location = %location,
            backtrace = %Backtrace::force_capture(),
            "Panic"
        );
    }));
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
///
/// If a handler cannot be installed the failure is logged and only the
/// other signal is awaited.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_addr_unknown_without_connect_info() {
        assert_eq!(remote_addr(&Extensions::new()), UNKNOWN_REMOTE);
    }

    #[test]
    fn test_remote_addr_from_connect_info() {
        let mut extensions = Extensions::new();
        let addr: SocketAddr = "10.1.2.3:4567".parse().unwrap();
        extensions.insert(ConnectInfo(addr));
        assert_eq!(remote_addr(&extensions), "10.1.2.3:4567");
    }
}
