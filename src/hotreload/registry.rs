//! Registry of live hot-reload connections.
//!
//! Each connection owns a bounded outbound queue drained by its own writer
//! task. Broadcasting only ever does a non-blocking `try_send` per
//! connection, so one slow or dead client cannot stall the others or the
//! caller. Connections whose queue is closed are removed after the send
//! pass.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, error, info, warn};

use crate::metrics;

/// Message sent to every client on a reload trigger.
pub const RELOAD_MESSAGE: &str = "reload";

/// Capacity of each connection's outbound queue.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 8;

/// Registry-assigned connection identifier.
pub type ConnectionId = u64;

struct ConnectionHandle {
    remote: String,
    outbound: mpsc::Sender<&'static str>,
}

#[derive(Default)]
struct RegistryInner {
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    next_id: AtomicU64,
}

/// Shared set of live hot-reload connections. Cheap to clone.
#[derive(Clone, Default)]
pub struct ReloadRegistry {
    inner: Arc<RegistryInner>,
}

impl ReloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave the map half-updated:
    // every mutation is a single insert or remove.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<ConnectionId, ConnectionHandle>> {
        self.inner
            .connections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ConnectionId, ConnectionHandle>> {
        self.inner
            .connections
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a connection. It stays registered until the returned guard is
    /// dropped or the connection is found closed during a broadcast.
    pub fn register(
        &self,
        remote: impl Into<String>,
        outbound: mpsc::Sender<&'static str>,
    ) -> Registration {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let remote = remote.into();

        let count = {
            let mut connections = self.write();
            connections.insert(
                id,
                ConnectionHandle {
                    remote: remote.clone(),
                    outbound,
                },
            );
            connections.len()
        };

        metrics::set_reload_clients(count);
        info!(connection_id = id, remote = %remote, clients = count, "Hot-reload client connected");

        Registration {
            id,
            registry: self.clone(),
        }
    }

    /// Remove a connection. Returns `false` if it was already gone.
    fn unregister(&self, id: ConnectionId) -> bool {
        let (removed, count) = {
            let mut connections = self.write();
            let removed = connections.remove(&id);
            (removed, connections.len())
        };

        match removed {
            Some(handle) => {
                metrics::set_reload_clients(count);
                info!(
                    connection_id = id,
                    remote = %handle.remote,
                    clients = count,
                    "Hot-reload client disconnected"
                );
                true
            }
            None => false,
        }
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Send [`RELOAD_MESSAGE`] to every live connection.
    ///
    /// Returns how many connections accepted the message.
    pub fn notify(&self) -> usize {
        self.broadcast(RELOAD_MESSAGE)
    }

    /// Offer `message` to every live connection without blocking.
    pub fn broadcast(&self, message: &'static str) -> usize {
        let mut delivered = 0;
        let mut full = 0;
        let mut closed = Vec::new();

        {
            let connections = self.read();
            debug!(clients = connections.len(), message, "Broadcasting to hot-reload clients");

            for (id, handle) in connections.iter() {
                match handle.outbound.try_send(message) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        full += 1;
                        warn!(
                            connection_id = id,
                            remote = %handle.remote,
                            "Hot-reload queue full, skipping client"
                        );
                    }
                    Err(TrySendError::Closed(_)) => {
                        error!(
                            connection_id = id,
                            remote = %handle.remote,
                            "Failed to deliver reload message, dropping client"
                        );
                        closed.push(*id);
                    }
                }
            }
        }

        let dropped = closed.len();
        for id in closed {
            self.unregister(id);
        }

        metrics::record_reload_delivery("delivered", delivered as u64);
        metrics::record_reload_delivery("full", full as u64);
        metrics::record_reload_delivery("closed", dropped as u64);

        info!(delivered, skipped = full, dropped, "Reload broadcast complete");
        delivered
    }
}

/// Proof of registration. Dropping it removes the connection.
pub struct Registration {
    id: ConnectionId,
    registry: ReloadRegistry,
}

impl Registration {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}
