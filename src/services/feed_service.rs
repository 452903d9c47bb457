use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::feed::{FeedHandshake, ServerEvent},
    error::ServiceError,
    services::{feed_events::EVENT_FEED_CONNECTED, session_service::load_session},
    state::SharedState,
};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Subscribe to the change-feed of an existing session.
pub async fn subscribe(
    state: &SharedState,
    session_id: Uuid,
) -> Result<broadcast::Receiver<ServerEvent>, ServiceError> {
    let store = state.require_lobby_store().await?;
    load_session(&store, session_id).await?;
    Ok(state.feeds().subscribe(session_id))
}

/// First event delivered to every new subscriber.
pub fn handshake(state: &SharedState, session_id: Uuid) -> Option<ServerEvent> {
    let payload = FeedHandshake {
        session_id,
        degraded: state.is_degraded(),
    };
    match ServerEvent::json(EVENT_FEED_CONNECTED, &payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(error = %err, "failed to serialize feed handshake");
            None
        }
    }
}

fn to_sse_event(payload: ServerEvent) -> Event {
    Event::default()
        .event(payload.event.clone())
        .data(payload.data_string())
}

/// Convert a broadcast receiver into an SSE response, forwarding events and
/// cleaning up once the client disconnects.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    session_id: Uuid,
    handshake: Option<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if let Some(handshake) = handshake {
            if tx.send(Ok(to_sse_event(handshake))).await.is_err() {
                return;
            }
        }

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_sse_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(%session_id, skipped, "feed subscriber lagged");
                            continue;
                        }
                    }
                }
            }
        }

        info!(%session_id, "feed SSE stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(KEEP_ALIVE_INTERVAL)
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig, dao::lobby_store::memory::MemoryLobbyStore,
        services::session_service, state::AppState,
    };

    #[tokio::test]
    async fn subscribe_requires_an_existing_session() {
        let state =
            AppState::with_store(AppConfig::default(), Arc::new(MemoryLobbyStore::new())).await;

        let missing = subscribe(&state, Uuid::new_v4()).await;
        assert!(matches!(missing, Err(ServiceError::NotFound(_))));

        let session = session_service::create_session(&state, None).await.unwrap();
        assert!(subscribe(&state, session.id).await.is_ok());
        assert_eq!(state.feeds().len(), 1);
    }

    #[tokio::test]
    async fn handshake_reports_degraded_flag() {
        let state = AppState::new(AppConfig::default());
        let session_id = Uuid::new_v4();
        let event = handshake(&state, session_id).unwrap();
        assert_eq!(event.event, EVENT_FEED_CONNECTED);
        assert_eq!(event.data["degraded"], true);
        assert_eq!(event.data["session_id"], session_id.to_string());
    }
}
