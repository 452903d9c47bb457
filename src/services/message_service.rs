//! Chat messages of a session: history reads, posting and deletion.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::{
    dao::{
        lobby_store::LobbyStore,
        models::{MessageEntity, MessageOrder},
    },
    dto::{
        message::{MessageStats, MessageView},
        validation::validate_image_url,
    },
    error::ServiceError,
    services::{
        feed_events,
        session_service::{load_session, normalize_username},
    },
    state::SharedState,
};

/// Oldest-first history, capped at the configured maximum.
pub async fn list_messages(
    state: &SharedState,
    session_id: Uuid,
    limit: Option<usize>,
) -> Result<Vec<MessageView>, ServiceError> {
    let limits = state.config().messages;
    let limit = limits.clamp(limit, limits.default_limit);
    let store = state.require_lobby_store().await?;
    load_session(&store, session_id).await?;

    let messages = store
        .list_messages(session_id, MessageOrder::Oldest, limit)
        .await?;
    Ok(messages.into_iter().map(MessageView::from).collect())
}

/// The `count` newest messages, returned in chronological order.
pub async fn recent_messages(
    state: &SharedState,
    session_id: Uuid,
    count: Option<usize>,
) -> Result<Vec<MessageView>, ServiceError> {
    let limits = state.config().messages;
    let count = limits.clamp(count, limits.recent_count);
    let store = state.require_lobby_store().await?;
    load_session(&store, session_id).await?;

    let mut messages = store
        .list_messages(session_id, MessageOrder::Newest, count)
        .await?;
    messages.reverse();
    Ok(messages.into_iter().map(MessageView::from).collect())
}

pub async fn message_stats(
    state: &SharedState,
    session_id: Uuid,
) -> Result<MessageStats, ServiceError> {
    let store = state.require_lobby_store().await?;
    load_session(&store, session_id).await?;

    let count = store.count_messages(session_id, false).await?;
    let ai_count = store.count_messages(session_id, true).await?;
    Ok(MessageStats {
        count,
        ai_count,
        has_ai_messages: ai_count > 0,
    })
}

/// Store a player message, publish it on the feed and forward it to the webhook.
pub async fn post_user_message(
    state: &SharedState,
    session_id: Uuid,
    user_id: &str,
    content: &str,
    image_url: Option<String>,
) -> Result<MessageView, ServiceError> {
    let user_id = normalize_username(user_id)?;
    let content = normalize_user_content(state, content)?;
    let image_url = normalize_image_url(image_url)?;

    let store = state.require_lobby_store().await?;
    let message = MessageEntity::from_user(session_id, user_id, content, image_url);
    let view = store_message(state, &store, message).await?;

    state.webhook().notify(view.clone());
    Ok(view)
}

/// Check the shared secret presented by the bot when posting back.
pub fn authorize_ai_callback(state: &SharedState, provided: Option<&str>) -> Result<(), ServiceError> {
    match state.webhook().secret() {
        None => Ok(()),
        Some(expected) if provided == Some(expected) => Ok(()),
        Some(_) => Err(ServiceError::Unauthorized(
            "missing or invalid webhook secret".into(),
        )),
    }
}

/// Store a message produced by the bot. Never forwarded back to the webhook.
///
/// Bot replies are not subject to the player length cap.
pub async fn post_ai_message(
    state: &SharedState,
    session_id: Uuid,
    content: &str,
    image_url: Option<String>,
) -> Result<MessageView, ServiceError> {
    let content = non_empty_content(content)?;
    let image_url = normalize_image_url(image_url)?;

    let store = state.require_lobby_store().await?;
    let message = MessageEntity::from_ai(session_id, content, image_url);
    store_message(state, &store, message).await
}

pub async fn delete_message(
    state: &SharedState,
    session_id: Uuid,
    message_id: Uuid,
) -> Result<(), ServiceError> {
    let store = state.require_lobby_store().await?;
    if !store.delete_message(session_id, message_id).await? {
        return Err(ServiceError::NotFound(format!(
            "message `{message_id}` not found in session `{session_id}`"
        )));
    }

    info!(%session_id, %message_id, "message deleted");
    feed_events::broadcast_message_deleted(state, session_id, message_id);
    Ok(())
}

async fn store_message(
    state: &SharedState,
    store: &Arc<dyn LobbyStore>,
    message: MessageEntity,
) -> Result<MessageView, ServiceError> {
    load_session(store, message.session_id).await?;
    store.insert_message(message.clone()).await?;
    info!(
        session_id = %message.session_id,
        message_id = %message.id,
        ai = message.is_ai,
        "message stored"
    );

    let view = MessageView::from(message);
    feed_events::broadcast_message_created(state, &view);
    Ok(view)
}

fn non_empty_content(content: &str) -> Result<String, ServiceError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::InvalidInput(
            "message content must not be empty".into(),
        ));
    }
    Ok(trimmed.to_string())
}

fn normalize_user_content(state: &SharedState, content: &str) -> Result<String, ServiceError> {
    let trimmed = non_empty_content(content)?;
    let max = state.config().messages.max_content_length;
    let length = trimmed.chars().count();
    if length > max {
        return Err(ServiceError::InvalidInput(format!(
            "message content must be at most {max} characters (got {length})"
        )));
    }
    Ok(trimmed)
}

fn normalize_image_url(image_url: Option<String>) -> Result<Option<String>, ServiceError> {
    let Some(url) = image_url
        .map(|url| url.trim().to_string())
        .filter(|url| !url.is_empty())
    else {
        return Ok(None);
    };

    validate_image_url(&url)
        .map_err(|_| ServiceError::InvalidInput(format!("invalid image url `{url}`")))?;
    Ok(Some(url))
}
