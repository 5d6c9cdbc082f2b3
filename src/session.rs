use crate::config::{BroadcastPayload, RelayConfig};
use crate::history::{HistoryEntry, HistoryStore};
use crate::llm::{Generator, LlmError};
use crate::protocol::{BroadcastRecord, InboundMessage, OutboundMessage, SessionId};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Processing state of a pipeline. At most one inbound message is in
/// flight per session; anything else queues on the inbound channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Processing,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Generation(#[from] LlmError),

    #[error("session queues closed")]
    Closed,
}

/// Per-session state machine driving inbound-message handling.
///
/// One run: pull context from history, call the generator, and only on
/// success append to history, deliver the reply to the owner, and push a
/// broadcast record. A failed generation has no side effects at all.
pub struct SessionPipeline {
    session_id: SessionId,
    inbound_rx: mpsc::Receiver<InboundMessage>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    broadcast_tx: mpsc::Sender<BroadcastRecord>,
    history: Arc<HistoryStore>,
    generator: Arc<dyn Generator>,
    context_window: usize,
    broadcast_payload: BroadcastPayload,
    state: PipelineState,
}

impl SessionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: SessionId,
        inbound_rx: mpsc::Receiver<InboundMessage>,
        outbound_tx: mpsc::Sender<OutboundMessage>,
        broadcast_tx: mpsc::Sender<BroadcastRecord>,
        history: Arc<HistoryStore>,
        generator: Arc<dyn Generator>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            session_id,
            inbound_rx,
            outbound_tx,
            broadcast_tx,
            history,
            generator,
            context_window: config.context_window,
            broadcast_payload: config.broadcast_payload,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn set_state(&mut self, state: PipelineState) {
        self.state = state;
        tracing::debug!(session_id = self.session_id, state = ?state, "pipeline state");
    }

    /// Drive the pipeline until the inbound queue closes (connection
    /// teardown) or the shutdown token fires. Messages are handled
    /// strictly one at a time, which is what gives per-session FIFO
    /// ordering.
    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(session_id = self.session_id, "pipeline shutting down");
                    break;
                }
                inbound = self.inbound_rx.recv() => {
                    let Some(inbound) = inbound else { break };

                    self.set_state(PipelineState::Processing);
                    let result = self.handle_inbound(inbound).await;
                    self.set_state(PipelineState::Idle);

                    match result {
                        Ok(()) => {}
                        Err(PipelineError::Generation(e)) => {
                            // Per-message failure: drop it entirely, the
                            // sender gets silence.
                            tracing::warn!(
                                session_id = self.session_id,
                                error = %e,
                                "generation failed, dropping message"
                            );
                        }
                        Err(PipelineError::Closed) => break,
                    }
                }
            }
        }

        tracing::debug!(session_id = self.session_id, "pipeline stopped");
    }

    async fn handle_inbound(&mut self, inbound: InboundMessage) -> Result<(), PipelineError> {
        tracing::debug!(
            session_id = self.session_id,
            character = %inbound.character,
            "handling inbound message"
        );

        let context = self.history.last_n(self.context_window).await;
        let generated = self
            .generator
            .generate(&inbound.character, &inbound.text, &context)
            .await?;

        self.history
            .push(HistoryEntry {
                session_id: self.session_id,
                raw: inbound.text.clone(),
                generated: generated.clone(),
            })
            .await;

        // Delivery to the owner blocks when its outbound queue is full;
        // that backpressure is confined to this session.
        self.outbound_tx
            .send(OutboundMessage {
                sender_id: self.session_id,
                text: generated.clone(),
                is_user: true,
            })
            .await
            .map_err(|_| PipelineError::Closed)?;

        let payload = match self.broadcast_payload {
            BroadcastPayload::Generated => generated,
            BroadcastPayload::Raw => inbound.text,
        };

        self.broadcast_tx
            .send(BroadcastRecord {
                sender_id: self.session_id,
                text: payload,
            })
            .await
            .map_err(|_| PipelineError::Closed)?;

        Ok(())
    }
}

/// Spawn the task draining a session's broadcast-inbound queue: each
/// record from another session becomes an `isUser: false` outbound
/// frame. Runs independently of the inbound pipeline.
pub fn spawn_forwarder(
    session_id: SessionId,
    mut broadcast_rx: mpsc::Receiver<BroadcastRecord>,
    outbound_tx: mpsc::Sender<OutboundMessage>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                record = broadcast_rx.recv() => {
                    let Some(record) = record else { break };
                    let outbound = OutboundMessage {
                        sender_id: record.sender_id,
                        text: record.text,
                        is_user: false,
                    };
                    if outbound_tx.send(outbound).await.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::debug!(session_id, "broadcast forwarder stopped");
    })
}
