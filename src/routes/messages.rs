use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::message::{
        ListMessagesQuery, MessageStats, MessageView, PostAiMessageRequest, PostMessageRequest,
        RecentMessagesQuery,
    },
    error::AppError,
    routes::extract::AppJson,
    services::{message_service, webhook_service::WEBHOOK_SECRET_HEADER},
    state::SharedState,
};

/// Chat endpoints of a session.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route(
            "/sessions/{id}/messages",
            get(list_messages).post(post_message),
        )
        .route("/sessions/{id}/messages/recent", get(recent_messages))
        .route("/sessions/{id}/messages/stats", get(message_stats))
        .route("/sessions/{id}/messages/ai", post(post_ai_message))
        .route(
            "/sessions/{id}/messages/{message_id}",
            delete(delete_message),
        )
}

/// Conversation history, oldest first.
#[utoipa::path(
    get,
    path = "/sessions/{id}/messages",
    tag = "messages",
    params(("id" = String, Path, description = "Session identifier"), ListMessagesQuery),
    responses(
        (status = 200, description = "Messages", body = [MessageView]),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn list_messages(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListMessagesQuery>,
) -> Result<Json<Vec<MessageView>>, AppError> {
    Ok(Json(
        message_service::list_messages(&state, id, query.limit).await?,
    ))
}

/// Newest messages, returned in chronological order.
#[utoipa::path(
    get,
    path = "/sessions/{id}/messages/recent",
    tag = "messages",
    params(("id" = String, Path, description = "Session identifier"), RecentMessagesQuery),
    responses((status = 200, description = "Messages", body = [MessageView]))
)]
pub async fn recent_messages(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RecentMessagesQuery>,
) -> Result<Json<Vec<MessageView>>, AppError> {
    Ok(Json(
        message_service::recent_messages(&state, id, query.count).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/messages/stats",
    tag = "messages",
    params(("id" = String, Path, description = "Session identifier")),
    responses((status = 200, description = "Message counters", body = MessageStats))
)]
pub async fn message_stats(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageStats>, AppError> {
    Ok(Json(message_service::message_stats(&state, id).await?))
}

/// Post a player message; it is forwarded to the configured webhook.
#[utoipa::path(
    post,
    path = "/sessions/{id}/messages",
    tag = "messages",
    params(("id" = String, Path, description = "Session identifier")),
    request_body = PostMessageRequest,
    responses(
        (status = 201, description = "Message stored", body = MessageView),
        (status = 400, description = "Invalid message"),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn post_message(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<PostMessageRequest>,
) -> Result<(StatusCode, Json<MessageView>), AppError> {
    payload.validate()?;
    let message = message_service::post_user_message(
        &state,
        id,
        &payload.user_id,
        &payload.content,
        payload.image_url,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Callback used by the bot to answer in the chat.
#[utoipa::path(
    post,
    path = "/sessions/{id}/messages/ai",
    tag = "messages",
    params(
        ("id" = String, Path, description = "Session identifier"),
        ("X-Webhook-Secret" = Option<String>, Header, description = "Shared secret, required when configured")
    ),
    request_body = PostAiMessageRequest,
    responses(
        (status = 201, description = "Message stored", body = MessageView),
        (status = 401, description = "Missing or invalid secret"),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn post_ai_message(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    AppJson(payload): AppJson<PostAiMessageRequest>,
) -> Result<(StatusCode, Json<MessageView>), AppError> {
    let provided = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    message_service::authorize_ai_callback(&state, provided)?;
    payload.validate()?;

    let message =
        message_service::post_ai_message(&state, id, &payload.content, payload.image_url).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

#[utoipa::path(
    delete,
    path = "/sessions/{id}/messages/{message_id}",
    tag = "messages",
    params(
        ("id" = String, Path, description = "Session identifier"),
        ("message_id" = String, Path, description = "Message identifier")
    ),
    responses(
        (status = 204, description = "Message deleted"),
        (status = 404, description = "Unknown message")
    )
)]
pub async fn delete_message(
    State(state): State<SharedState>,
    Path((id, message_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    message_service::delete_message(&state, id, message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
