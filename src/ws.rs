use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::Stream, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::protocol::{InboundMessage, SessionId};
use crate::registry::Session;
use crate::session::{spawn_forwarder, SessionPipeline};
use crate::state::AppState;

/// WebSocket upgrade handler for `GET /chat`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle one connection: register a session, spawn its pipeline,
/// forwarder, and writer tasks, then run the read loop inline. On exit
/// the session is unregistered and the tasks wind down through their
/// closing channels, independent of global shutdown.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, stream) = socket.split();

    let Session {
        id,
        inbound_tx,
        inbound_rx,
        outbound_tx,
        mut outbound_rx,
        broadcast_rx,
    } = state.registry.register().await;

    tracing::info!(session_id = id, "websocket connected");

    let pipeline = SessionPipeline::new(
        id,
        inbound_rx,
        outbound_tx.clone(),
        state.broadcast_tx.clone(),
        state.history.clone(),
        state.generator.clone(),
        &state.relay,
    );
    tokio::spawn(pipeline.run(state.shutdown.child_token()));
    spawn_forwarder(id, broadcast_rx, outbound_tx, state.shutdown.child_token());

    // Writer: serialize outbound frames onto the socket until every
    // sender (pipeline + forwarder) is gone or the socket dies.
    tokio::spawn(async move {
        while let Some(outbound) = outbound_rx.recv().await {
            match serde_json::to_string(&outbound) {
                Ok(json) => {
                    if sink.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(session_id = id, error = %e, "failed to serialize outbound frame");
                }
            }
        }
        tracing::debug!(session_id = id, "writer loop stopped");
    });

    read_loop(stream, id, inbound_tx, state.shutdown.child_token()).await;

    // Removal is immediate: the next fan-out snapshot no longer sees
    // this session. Dropping inbound_tx ends the pipeline after its
    // current run; unregistering drops the hub-facing sender, which
    // ends the forwarder.
    state.registry.unregister(id).await;
    tracing::info!(session_id = id, "connection torn down");
}

/// Reader: parse client frames and feed the pipeline. A full inbound
/// queue blocks this loop, which is the backpressure on the client.
/// Exits on socket close/error or on the shutdown token, so an idle
/// connection never holds up graceful shutdown.
async fn read_loop<S>(
    mut stream: S,
    id: SessionId,
    inbound_tx: mpsc::Sender<InboundMessage>,
    shutdown: CancellationToken,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let msg = tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::debug!(session_id = id, "reader shutting down");
                break;
            }
            msg = stream.next() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<InboundMessage>(&text) {
                Ok(inbound) => {
                    if inbound_tx.send(inbound).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(session_id = id, error = %e, "ignoring malformed frame");
                }
            },
            Some(Ok(Message::Close(_))) => {
                tracing::info!(session_id = id, "websocket closed");
                break;
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                tracing::error!(session_id = id, error = %e, "websocket error");
                break;
            }
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn silent_connection_does_not_block_shutdown() {
        let (inbound_tx, _inbound_rx) = mpsc::channel(1);
        let shutdown = CancellationToken::new();

        // A client that never sends anything and never disconnects.
        let stream = futures::stream::pending::<Result<Message, axum::Error>>();
        let reader = tokio::spawn(read_loop(stream, 1, inbound_tx, shutdown.clone()));

        shutdown.cancel();
        tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("reader did not observe shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn frames_are_parsed_and_fed_to_the_pipeline() {
        let (inbound_tx, mut inbound_rx) = mpsc::channel(8);

        let frames: Vec<Result<Message, axum::Error>> = vec![
            Ok(Message::Text(
                r#"{"text":"hi","character":"Pirate"}"#.to_string().into(),
            )),
            // Malformed frames are skipped, not fatal.
            Ok(Message::Text("not json".to_string().into())),
            Ok(Message::Text(
                r#"{"text":"again","character":"Robot"}"#.to_string().into(),
            )),
        ];

        read_loop(
            futures::stream::iter(frames),
            1,
            inbound_tx,
            CancellationToken::new(),
        )
        .await;

        let first = inbound_rx.recv().await.unwrap();
        assert_eq!(first.text, "hi");
        assert_eq!(first.character, "Pirate");

        let second = inbound_rx.recv().await.unwrap();
        assert_eq!(second.text, "again");

        // Reader returned when the stream ended, dropping its sender.
        assert!(inbound_rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn close_frame_ends_the_reader() {
        let (inbound_tx, mut inbound_rx) = mpsc::channel(8);

        let frames: Vec<Result<Message, axum::Error>> = vec![
            Ok(Message::Close(None)),
            Ok(Message::Text(
                r#"{"text":"late","character":"Pirate"}"#.to_string().into(),
            )),
        ];

        read_loop(
            futures::stream::iter(frames),
            1,
            inbound_tx,
            CancellationToken::new(),
        )
        .await;

        // Nothing after the close frame was processed.
        assert!(inbound_rx.recv().await.is_none());
    }
}
