use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        mpsc,
    },
    task::JoinHandle,
};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        feed::ServerEvent,
        ws::{FeedEventFrame, FeedInboundMessage, FeedOutboundMessage},
    },
    services::{feed_service, message_service},
    state::SharedState,
};

/// The writer task has stopped; the connection should be torn down.
#[derive(Debug, Error)]
#[error("connection closed")]
struct ConnectionClosed;

/// Handle the full lifecycle of a change-feed WebSocket connection.
pub async fn handle_socket(
    state: SharedState,
    session_id: Uuid,
    receiver: broadcast::Receiver<ServerEvent>,
    socket: WebSocket,
) {
    let (mut sender, mut inbound) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    if let Some(handshake) = feed_service::handshake(&state, session_id) {
        if send_message_to_websocket(&outbound_tx, &event_frame(handshake)).is_err() {
            finalize(writer_task, outbound_tx).await;
            return;
        }
    }

    let forwarder = spawn_forwarder(session_id, receiver, outbound_tx.clone());
    info!(%session_id, "feed websocket connected");

    while let Some(message) = inbound.next().await {
        match message {
            Ok(Message::Text(text)) => {
                debug!(%session_id, payload = %text, "received feed frame");
                let reply = handle_inbound(&state, session_id, text.as_str()).await;
                if send_message_to_websocket(&outbound_tx, &reply).is_err() {
                    break;
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(%session_id, "feed websocket closed by client");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%session_id, error = %err, "websocket error");
                break;
            }
        }
    }

    forwarder.abort();
    info!(%session_id, "feed websocket disconnected");
    finalize(writer_task, outbound_tx).await;
}

/// Run one inbound frame and build the reply sent back to the client.
pub async fn handle_inbound(
    state: &SharedState,
    session_id: Uuid,
    text: &str,
) -> FeedOutboundMessage {
    let inbound = match FeedInboundMessage::from_json_str(text) {
        Ok(message) => message,
        Err(err) => {
            return FeedOutboundMessage::Error {
                message: format!("malformed frame: {err}"),
            };
        }
    };

    match inbound {
        FeedInboundMessage::Message {
            user_id,
            content,
            image_url,
        } => match message_service::post_user_message(
            state, session_id, &user_id, &content, image_url,
        )
        .await
        {
            Ok(view) => FeedOutboundMessage::Ack { id: view.id },
            Err(err) => FeedOutboundMessage::Error {
                message: err.to_string(),
            },
        },
        FeedInboundMessage::Unknown => FeedOutboundMessage::Error {
            message: "unsupported frame type".into(),
        },
    }
}

fn event_frame(event: ServerEvent) -> FeedEventFrame {
    FeedEventFrame {
        kind: event.event,
        data: event.data,
    }
}

fn spawn_forwarder(
    session_id: Uuid,
    mut receiver: broadcast::Receiver<ServerEvent>,
    outbound_tx: mpsc::UnboundedSender<Message>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if send_message_to_websocket(&outbound_tx, &event_frame(event)).is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(%session_id, skipped, "feed websocket lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Serialise `value` as a text frame. Fails only when the writer is gone.
fn send_message_to_websocket<T>(
    tx: &mpsc::UnboundedSender<Message>,
    value: &T,
) -> Result<(), ConnectionClosed>
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(p) => p,
        Err(err) => {
            warn!(error = %err, "failed to serialize message `{value:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into())).map_err(|_| ConnectionClosed)
}

async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
