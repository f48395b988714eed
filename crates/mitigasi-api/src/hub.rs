//! Broadcast hub: the table of open streaming clients.
//!
//! Every client owns a bounded queue. [`BroadcastHub::broadcast`] never
//! waits: a client whose queue is full misses that one message and stays
//! registered. Registration takes the write lock, broadcasting only the read
//! lock, and neither is held across an `.await`.
//!
//! [`BroadcastHub::close`] ends every open stream. The server calls it when
//! shutdown begins, since an open stream never finishes on its own.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use mitigasi_types::{BroadcastMessage, ClientId};
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

/// Default per-client queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// Default silence before a heartbeat is sent.
pub const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(30);

/// Outcome of one [`BroadcastHub::broadcast`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BroadcastReport {
    /// Clients whose queue accepted the message.
    pub delivered: usize,
    /// Clients whose queue was full (or already closed).
    pub dropped: usize,
}

/// Registry of streaming clients and their queues.
#[derive(Debug)]
pub struct BroadcastHub {
    clients: RwLock<HashMap<ClientId, mpsc::Sender<BroadcastMessage>>>,
    capacity: usize,
    heartbeat: Duration,
    closing: watch::Sender<bool>,
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastHub {
    /// Create a hub with the default queue capacity and heartbeat.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_QUEUE_CAPACITY)
    }

    /// Create a hub whose client queues hold `capacity` messages (at least 1).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            heartbeat: DEFAULT_HEARTBEAT,
            closing: watch::Sender::new(false),
        }
    }

    /// Set the heartbeat interval. Zero keeps the default.
    #[must_use]
    pub const fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        if !heartbeat.is_zero() {
            self.heartbeat = heartbeat;
        }
        self
    }

    /// Silence after which a connection emits a heartbeat.
    pub const fn heartbeat(&self) -> Duration {
        self.heartbeat
    }

    /// Per-client queue capacity.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Add a client and return its id and the receiving end of its queue.
    pub fn register(&self) -> (ClientId, mpsc::Receiver<BroadcastMessage>) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let client_id = ClientId::new();
        let total = {
            let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
            clients.insert(client_id, tx);
            clients.len()
        };
        info!(%client_id, clients = total, "Broadcast client connected");
        (client_id, rx)
    }

    /// Remove a client, closing its queue.
    ///
    /// Returns `false` if the client was not registered.
    pub fn unregister(&self, client_id: ClientId) -> bool {
        let (removed, total) = {
            let mut clients = self.clients.write().unwrap_or_else(PoisonError::into_inner);
            (clients.remove(&client_id).is_some(), clients.len())
        };
        if removed {
            info!(%client_id, clients = total, "Broadcast client disconnected");
        }
        removed
    }

    /// Offer `message` to every registered client without waiting.
    pub fn broadcast(&self, message: &BroadcastMessage) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let clients = self.clients.read().unwrap_or_else(PoisonError::into_inner);
        for (client_id, queue) in clients.iter() {
            match queue.try_send(message.clone()) {
                Ok(()) => report.delivered = report.delivered.saturating_add(1),
                Err(TrySendError::Full(_)) => {
                    report.dropped = report.dropped.saturating_add(1);
                    warn!(%client_id, "Client queue full, alert dropped for this client");
                }
                Err(TrySendError::Closed(_)) => {
                    report.dropped = report.dropped.saturating_add(1);
                    debug!(%client_id, "Client queue closed before unregister");
                }
            }
        }
        drop(clients);

        info!(
            incident_type = %message.incident_type,
            delivered = report.delivered,
            dropped = report.dropped,
            "Emergency alert broadcast"
        );
        report
    }

    /// Ask every open stream to finish. Streams opened afterwards finish
    /// right away.
    pub fn close(&self) {
        self.closing.send_replace(true);
        info!(clients = self.client_count(), "Closing broadcast streams");
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        *self.closing.borrow()
    }

    /// A receiver that changes when the hub is closed.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closing.subscribe()
    }

    /// Number of registered clients.
    pub fn client_count(&self) -> usize {
        self.clients
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Unregisters its client when dropped.
///
/// A connection task holds one of these, so every way the task ends
/// (client gone, queue closed, task aborted) removes the client.
#[derive(Debug)]
pub struct ClientGuard {
    hub: Arc<BroadcastHub>,
    client_id: ClientId,
}

impl ClientGuard {
    /// Guard an already registered client.
    pub const fn new(hub: Arc<BroadcastHub>, client_id: ClientId) -> Self {
        Self { hub, client_id }
    }

    /// The guarded client.
    pub const fn client_id(&self) -> ClientId {
        self.client_id
    }

    /// The hub the client is registered with.
    pub const fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }
}

impl Drop for ClientGuard {
    fn drop(&mut self) {
        self.hub.unregister(self.client_id);
    }
}
