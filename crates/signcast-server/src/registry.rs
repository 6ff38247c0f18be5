use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use signcast_core::{ConnectionId, DeliveryError};
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Lifecycle of one client channel. Only ever moves forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Active = 0,
    Closing = 1,
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Active,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// One connected client: its outbound queue plus liveness bookkeeping.
pub struct Connection {
    id: ConnectionId,
    remote: Option<SocketAddr>,
    tx: mpsc::Sender<String>,
    state: AtomicU8,
    last_seen: AtomicU64,
    cancel: CancellationToken,
}

impl Connection {
    /// Create a connection with an outbound queue of `queue_capacity` messages.
    ///
    /// `cancel` fires when the connection must stop; pass a child of the server's
    /// shutdown token so shutdown reaches every session.
    pub fn open(
        queue_capacity: usize,
        cancel: CancellationToken,
        remote: Option<SocketAddr>,
    ) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let conn = Self {
            id: ConnectionId::new(),
            remote,
            tx,
            state: AtomicU8::new(ConnectionState::Active as u8),
            last_seen: AtomicU64::new(now_secs()),
            cancel,
        };
        (Arc::new(conn), rx)
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn remote(&self) -> Option<SocketAddr> {
        self.remote
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    /// Queue one serialized message without waiting.
    pub fn deliver(&self, payload: String) -> Result<(), DeliveryError> {
        if self.state() == ConnectionState::Closed {
            return Err(DeliveryError::Closed);
        }
        self.tx.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Any inbound traffic (including transport pongs) counts as a sign of life.
    pub fn record_seen(&self) {
        self.last_seen.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_alive(&self, timeout: Duration) -> bool {
        let last = self.last_seen.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < timeout.as_secs()
    }

    /// Active -> Closing, and signal the session to wind down.
    pub fn begin_close(&self) {
        let _ = self.state.compare_exchange(
            ConnectionState::Active as u8,
            ConnectionState::Closing as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        self.cancel.cancel();
    }

    fn mark_closed(&self) {
        self.state
            .store(ConnectionState::Closed as u8, Ordering::Release);
        self.cancel.cancel();
    }

    /// Resolves once the connection has been asked to stop.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }

    pub fn is_closing(&self) -> bool {
        self.cancel.is_cancelled()
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, secs: u64) {
        self.last_seen
            .store(now_secs().saturating_sub(secs), Ordering::Relaxed);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("remote", &self.remote)
            .field("state", &self.state())
            .finish()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Set of live connections. A connection is registered exactly while its session runs.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<ConnectionId, Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the id is already present; the existing entry is kept.
    pub fn register(&self, conn: Arc<Connection>) -> bool {
        let mut connections = self.connections.lock();
        if connections.contains_key(conn.id()) {
            return false;
        }
        connections.insert(conn.id().clone(), conn);
        true
    }

    /// Remove a connection and mark it closed. Removing an absent id is a no-op.
    pub fn unregister(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        let removed = self.connections.lock().remove(id);
        if let Some(conn) = &removed {
            conn.mark_closed();
        }
        removed
    }

    /// Point-in-time copy of the members. Later registrations are not reflected.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.connections.lock().values().cloned().collect()
    }

    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }

    /// Evict connections that have been silent longer than `timeout`.
    pub fn close_idle(&self, timeout: Duration) -> Vec<ConnectionId> {
        let idle: Vec<ConnectionId> = self
            .snapshot()
            .into_iter()
            .filter(|conn| !conn.is_alive(timeout))
            .map(|conn| conn.id().clone())
            .collect();

        for id in &idle {
            self.unregister(id);
            tracing::info!(connection_id = %id, "Closed idle connection");
        }
        idle
    }

    /// Close every connection, used on shutdown.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Arc<Connection>> =
            self.connections.lock().drain().map(|(_, conn)| conn).collect();
        for conn in &drained {
            conn.mark_closed();
        }
        drained.len()
    }
}

/// Periodically evict idle connections until `shutdown` fires.
pub fn start_cleanup_task(
    registry: Arc<ConnectionRegistry>,
    interval: Duration,
    client_timeout: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let removed = registry.close_idle(client_timeout);
                    if !removed.is_empty() {
                        tracing::info!(removed = removed.len(), "Idle connection sweep");
                    }
                }
            }
        }
    })
}
