//! The in-memory registry of open WebSocket connections.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

use time::OffsetDateTime;
use tokio::sync::mpsc;

use crate::user::{User, UserID, UserRole};

/// How many outbound frames may queue per connection before sends fail.
const OUTBOUND_CHANNEL_CAPACITY: usize = 32;

/// A frame queued for delivery to one socket task.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    /// A JSON text frame, already serialized.
    Text(String),
    /// A protocol-level ping, sent by the liveness sweep.
    Ping,
    /// Tell the socket task to close the connection gracefully.
    Terminate,
}

/// A live connection to one user.
#[derive(Debug)]
pub struct ConnectionEntry {
    conn_id: u64,
    /// The ID of the connected user.
    pub user_id: UserID,
    /// The connected user's role, used for role-scoped broadcasts.
    pub role: UserRole,
    /// The connected user's display name, used in logs.
    pub display_name: String,
    /// When the connection was registered.
    pub connected_at: OffsetDateTime,
    tx: mpsc::Sender<OutboundFrame>,
    /// Milliseconds since the Unix epoch of the last pong from this client.
    last_ping: AtomicU64,
}

impl ConnectionEntry {
    /// An identifier unique to this connection, distinguishing it from other
    /// connections by the same user.
    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Record that the client just answered a ping.
    pub fn touch(&self) {
        self.last_ping.store(now_millis(), Ordering::Relaxed);
    }

    /// Milliseconds elapsed since the client last answered a ping.
    pub fn millis_since_last_ping(&self) -> u64 {
        now_millis().saturating_sub(self.last_ping.load(Ordering::Relaxed))
    }

    /// Queue a frame for the socket task without waiting.
    ///
    /// # Errors
    ///
    /// Returns an error if the socket task has gone away or its queue is full.
    pub fn try_send(
        &self,
        frame: OutboundFrame,
    ) -> Result<(), mpsc::error::TrySendError<OutboundFrame>> {
        self.tx.try_send(frame)
    }

    /// Whether the socket task has dropped its receiver.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Tracks the open WebSocket connections, at most one per user.
///
/// Each [crate::AppState] owns its own registry; there is no process-wide
/// instance.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: Mutex<HashMap<UserID, Arc<ConnectionEntry>>>,
    next_conn_id: AtomicU64,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection for `user`, returning the entry and the
    /// receiving end of its outbound channel.
    ///
    /// If the user already had a connection, the old entry is replaced and
    /// told to terminate; its socket task will see [OutboundFrame::Terminate]
    /// and close with a graceful close frame.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    pub fn register(&self, user: &User) -> (Arc<ConnectionEntry>, mpsc::Receiver<OutboundFrame>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);

        let entry = Arc::new(ConnectionEntry {
            conn_id: self.next_conn_id.fetch_add(1, Ordering::Relaxed),
            user_id: user.id,
            role: user.role,
            display_name: user.name.clone(),
            connected_at: OffsetDateTime::now_utc(),
            tx,
            last_ping: AtomicU64::new(now_millis()),
        });

        let replaced = self.inner.lock().unwrap().insert(user.id, entry.clone());

        if let Some(old_entry) = replaced {
            tracing::info!(
                user_id = %user.id,
                "replacing existing connection for reconnecting user"
            );
            let _ = old_entry.try_send(OutboundFrame::Terminate);
        }

        (entry, rx)
    }

    /// Look up the open connection for `user_id`.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    pub fn get(&self, user_id: UserID) -> Option<Arc<ConnectionEntry>> {
        self.inner.lock().unwrap().get(&user_id).cloned()
    }

    /// Remove the connection for `user_id`, but only if it is still the one
    /// identified by `conn_id`.
    ///
    /// The guard stops a socket task that lost a race with a reconnect from
    /// tearing down the replacement connection. Returns whether an entry was
    /// removed.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    pub fn remove(&self, user_id: UserID, conn_id: u64) -> bool {
        let mut connections = self.inner.lock().unwrap();

        match connections.get(&user_id) {
            Some(entry) if entry.conn_id == conn_id => {
                connections.remove(&user_id);
                true
            }
            _ => false,
        }
    }

    /// The number of registered connections.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clone out the current entries so callers can iterate without holding
    /// the registry lock across sends.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    pub fn snapshot(&self) -> Vec<Arc<ConnectionEntry>> {
        self.inner.lock().unwrap().values().cloned().collect()
    }

    /// Tell every connection to terminate and clear the registry.
    ///
    /// Called on graceful server shutdown.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    pub fn shutdown(&self) {
        let entries: Vec<_> = self.inner.lock().unwrap().drain().collect();

        for (user_id, entry) in entries {
            if entry.try_send(OutboundFrame::Terminate).is_err() {
                tracing::debug!(%user_id, "connection already gone during shutdown");
            }
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
