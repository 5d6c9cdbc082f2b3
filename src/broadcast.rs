use crate::protocol::BroadcastRecord;
use crate::registry::SessionRegistry;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// The single task that owns the shared broadcast queue and fans each
/// record out to every registered session except the sender.
///
/// Fan-out is best-effort: a recipient whose broadcast-inbound queue is
/// full has that one record dropped, so a slow consumer never stalls
/// delivery to the others or blocks the hub.
pub struct BroadcastHub {
    registry: Arc<SessionRegistry>,
    broadcast_rx: mpsc::Receiver<BroadcastRecord>,
}

impl BroadcastHub {
    pub fn new(registry: Arc<SessionRegistry>, broadcast_rx: mpsc::Receiver<BroadcastRecord>) -> Self {
        Self {
            registry,
            broadcast_rx,
        }
    }

    /// Spawn the hub loop. It exits when the shutdown token fires or
    /// every sender of the shared queue is gone; no draining on exit.
    pub fn spawn(self, shutdown: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(mut self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("broadcast hub shutting down");
                    break;
                }
                record = self.broadcast_rx.recv() => {
                    let Some(record) = record else { break };
                    self.fan_out(record).await;
                }
            }
        }
    }

    async fn fan_out(&self, record: BroadcastRecord) {
        for handle in self.registry.snapshot().await {
            if handle.id == record.sender_id {
                continue;
            }

            match handle.broadcast_tx.try_send(record.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::debug!(
                        recipient = handle.id,
                        sender = record.sender_id,
                        "broadcast-inbound queue full, dropping record"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    // Session tore down between snapshot and send.
                    tracing::debug!(recipient = handle.id, "session gone during fan-out");
                }
            }
        }
    }
}
