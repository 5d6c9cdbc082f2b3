use crate::broadcast::BroadcastHub;
use crate::config::RelayConfig;
use crate::history::HistoryStore;
use crate::llm::Generator;
use crate::protocol::BroadcastRecord;
use crate::registry::SessionRegistry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The explicitly owned service bundle shared by all connection
/// handlers: registry, history, generator, the sending end of the shared
/// broadcast queue, and the process shutdown token.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub history: Arc<HistoryStore>,
    pub generator: Arc<dyn Generator>,
    pub broadcast_tx: mpsc::Sender<BroadcastRecord>,
    pub relay: RelayConfig,
    pub shutdown: CancellationToken,
}

impl AppState {
    /// Construct every core service and the hub that consumes the shared
    /// broadcast queue. The caller spawns the hub and owns the token.
    pub fn new(
        relay: RelayConfig,
        generator: Arc<dyn Generator>,
        shutdown: CancellationToken,
    ) -> (Self, BroadcastHub) {
        let registry = Arc::new(SessionRegistry::new(relay.queue_capacities));
        let history = Arc::new(HistoryStore::new(relay.history_capacity));
        let (broadcast_tx, broadcast_rx) = mpsc::channel(relay.broadcast_queue_capacity);
        let hub = BroadcastHub::new(registry.clone(), broadcast_rx);

        let state = Self {
            registry,
            history,
            generator,
            broadcast_tx,
            relay,
            shutdown,
        };

        (state, hub)
    }
}
