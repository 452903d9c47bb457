use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State, WebSocketUpgrade},
    response::{
        IntoResponse,
        sse::{Event, Sse},
    },
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::AppError,
    services::{feed_service, websocket_service},
    state::SharedState,
};

/// Configure the change-feed endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sessions/{id}/feed", get(feed_stream))
        .route("/sessions/{id}/ws", get(ws_handler))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/feed",
    tag = "feed",
    params(("id" = String, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session change-feed", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown session")
    )
)]
/// Stream the session's messages and membership changes as server-sent events.
pub async fn feed_stream(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let receiver = feed_service::subscribe(&state, id).await?;
    info!(session_id = %id, "new feed SSE connection");
    let handshake = feed_service::handshake(&state, id);
    Ok(feed_service::to_sse_stream(receiver, id, handshake))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/ws",
    tag = "feed",
    params(("id" = String, Path, description = "Session identifier")),
    responses(
        (status = 101, description = "Switching protocols to WebSocket"),
        (status = 404, description = "Unknown session")
    )
)]
/// Upgrade the HTTP connection into a two-way change-feed socket.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let receiver = feed_service::subscribe(&state, id).await?;
    Ok(ws.on_upgrade(move |socket| websocket_service::handle_socket(state, id, receiver, socket)))
}
