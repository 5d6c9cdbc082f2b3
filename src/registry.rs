use crate::config::QueueCapacities;
use crate::protocol::{BroadcastRecord, InboundMessage, OutboundMessage, SessionId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};

/// A live session, owned exclusively by its connection handler.
///
/// Holds the receiving ends of all three per-session queues plus the
/// senders the handler hands to its reader and writer tasks.
pub struct Session {
    pub id: SessionId,
    pub inbound_tx: mpsc::Sender<InboundMessage>,
    pub inbound_rx: mpsc::Receiver<InboundMessage>,
    pub outbound_tx: mpsc::Sender<OutboundMessage>,
    pub outbound_rx: mpsc::Receiver<OutboundMessage>,
    pub broadcast_rx: mpsc::Receiver<BroadcastRecord>,
}

/// What the registry keeps for each live session: its id and the sending
/// end of its broadcast-inbound queue, used by the hub for fan-out.
#[derive(Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    pub broadcast_tx: mpsc::Sender<BroadcastRecord>,
}

/// Concurrency-safe directory of live sessions.
///
/// A single `RwLock` guards the directory for its whole lifetime:
/// `register` and `unregister` take the write lock, `snapshot` the read
/// lock. Ids come from an atomic counter and are never reused.
pub struct SessionRegistry {
    next_id: AtomicU64,
    sessions: RwLock<BTreeMap<SessionId, SessionHandle>>,
    capacities: QueueCapacities,
}

impl SessionRegistry {
    pub fn new(capacities: QueueCapacities) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            sessions: RwLock::new(BTreeMap::new()),
            capacities,
        }
    }

    /// Allocate the next session id, create the session's three queues,
    /// insert the hub-facing handle into the directory, and return the
    /// owned session.
    pub async fn register(&self) -> Session {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (inbound_tx, inbound_rx) = mpsc::channel(self.capacities.inbound);
        let (outbound_tx, outbound_rx) = mpsc::channel(self.capacities.outbound);
        let (broadcast_tx, broadcast_rx) = mpsc::channel(self.capacities.broadcast_inbound);

        let handle = SessionHandle { id, broadcast_tx };
        self.sessions.write().await.insert(id, handle);

        tracing::debug!(session_id = id, "session registered");

        Session {
            id,
            inbound_tx,
            inbound_rx,
            outbound_tx,
            outbound_rx,
            broadcast_rx,
        }
    }

    /// Remove a session from the directory. Idempotent. Dropping the
    /// stored handle closes the hub's sender for that session's
    /// broadcast-inbound queue.
    pub async fn unregister(&self, id: SessionId) {
        if self.sessions.write().await.remove(&id).is_some() {
            tracing::debug!(session_id = id, "session unregistered");
        }
    }

    /// Current set of live sessions, ordered by ascending id. Used by the
    /// hub for each fan-out round.
    pub async fn snapshot(&self) -> Vec<SessionHandle> {
        self.sessions.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
