use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug)]
/// Dispatched payload carried across a session's change-feed.
pub struct ServerEvent {
    pub event: String,
    pub data: serde_json::Value,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the event data.
    pub fn json<T>(event: impl Into<String>, payload: &T) -> serde_json::Result<Self>
    where
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_value(payload)?,
        })
    }

    /// Render the data field as sent over SSE.
    pub fn data_string(&self) -> String {
        self.data.to_string()
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to a feed subscriber when it connects.
pub struct FeedHandshake {
    pub session_id: Uuid,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a message has been removed from the conversation.
pub struct MessageDeletedEvent {
    pub id: Uuid,
    pub session_id: Uuid,
}
