use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Lifecycle flag of a game session.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Players are gathering in the lobby.
    #[default]
    Waiting,
    /// The game room is open and chatting has started.
    InProgress,
}

/// Game session persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Opaque identifier, used as both lobby and game id.
    pub id: Uuid,
    /// Joined usernames in join order.
    pub users: Vec<String>,
    /// Current lifecycle flag.
    pub status: SessionStatus,
    /// Monotonic revision used for compare-and-swap updates.
    pub version: u64,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last time the session was written.
    pub updated_at: SystemTime,
}

impl SessionEntity {
    /// Build a fresh session in the waiting state.
    pub fn new(users: Vec<String>) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            users,
            status: SessionStatus::Waiting,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether `username` already belongs to the session.
    pub fn has_user(&self, username: &str) -> bool {
        self.users.iter().any(|user| user == username)
    }

    /// Produce the next revision of this session, bumping the version.
    pub fn next_revision(&self) -> Self {
        Self {
            version: self.version + 1,
            updated_at: SystemTime::now(),
            ..self.clone()
        }
    }
}

/// Chat message persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageEntity {
    /// Primary key of the message.
    pub id: Uuid,
    /// Session the message belongs to.
    pub session_id: Uuid,
    /// Author username; `None` for AI-authored messages.
    pub user_id: Option<String>,
    /// Whether the message was produced by the AI webhook.
    pub is_ai: bool,
    /// Message text.
    pub content: String,
    /// Optional picture attached to the message.
    pub image_url: Option<String>,
    /// Insertion timestamp, used for ordering.
    pub created_at: SystemTime,
}

impl MessageEntity {
    /// Build a message authored by a player.
    pub fn from_user(
        session_id: Uuid,
        user_id: String,
        content: String,
        image_url: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            user_id: Some(user_id),
            is_ai: false,
            content,
            image_url,
            created_at: SystemTime::now(),
        }
    }

    /// Build a message authored by the AI.
    pub fn from_ai(session_id: Uuid, content: String, image_url: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id,
            user_id: None,
            is_ai: true,
            content,
            image_url,
            created_at: SystemTime::now(),
        }
    }
}

/// Which end of a conversation a bounded read starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOrder {
    /// Chronological order, oldest first.
    Oldest,
    /// Reverse chronological order, newest first.
    Newest,
}

/// Sort messages by `(created_at, id)` in the requested direction and keep at most `limit`.
pub fn sort_and_truncate(
    mut messages: Vec<MessageEntity>,
    order: MessageOrder,
    limit: usize,
) -> Vec<MessageEntity> {
    messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    if order == MessageOrder::Newest {
        messages.reverse();
    }
    messages.truncate(limit);
    messages
}
