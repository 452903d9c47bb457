use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::MessageEntity,
    dto::{
        format_system_time,
        validation::{field_errors, validate_optional_image_url, validate_username},
    },
};

/// Who authored a message, from the chat room's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MessageSender {
    User,
    Ai,
}

/// Chat message as rendered by clients.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageView {
    pub id: Uuid,
    pub session_id: Uuid,
    pub sender: MessageSender,
    /// Author username, absent for AI messages.
    pub user_id: Option<String>,
    pub text: String,
    pub image_url: Option<String>,
    pub created_at: String,
}

impl From<MessageEntity> for MessageView {
    fn from(message: MessageEntity) -> Self {
        Self {
            id: message.id,
            session_id: message.session_id,
            sender: if message.is_ai {
                MessageSender::Ai
            } else {
                MessageSender::User
            },
            user_id: message.user_id,
            text: message.content,
            image_url: message.image_url,
            created_at: format_system_time(message.created_at),
        }
    }
}

/// Message posted by a player.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PostMessageRequest {
    pub user_id: String,
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Validate for PostMessageRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        field_errors([
            ("user_id", validate_username(&self.user_id)),
            (
                "image_url",
                validate_optional_image_url(self.image_url.as_deref()),
            ),
        ])
    }
}

/// Message posted back by the bot behind the webhook.
#[derive(Debug, Deserialize, ToSchema)]
pub struct PostAiMessageRequest {
    pub content: String,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Validate for PostAiMessageRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        field_errors([(
            "image_url",
            validate_optional_image_url(self.image_url.as_deref()),
        )])
    }
}

/// Query string accepted by the message history endpoint.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListMessagesQuery {
    /// Maximum number of messages, oldest first.
    pub limit: Option<usize>,
}

/// Query string accepted by the recent messages endpoint.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct RecentMessagesQuery {
    /// Number of newest messages to return.
    pub count: Option<usize>,
}

/// Aggregate counters over a session's conversation.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct MessageStats {
    pub count: u64,
    pub ai_count: u64,
    pub has_ai_messages: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ai_messages_are_projected_with_ai_sender() {
        let session = Uuid::new_v4();
        let view: MessageView =
            MessageEntity::from_ai(session, "I am MonsterBot".into(), None).into();
        assert_eq!(view.sender, MessageSender::Ai);
        assert!(view.user_id.is_none());
        assert_eq!(view.text, "I am MonsterBot");
    }

    #[test]
    fn post_message_request_validates_author_and_image() {
        let ok = PostMessageRequest {
            user_id: "alice".into(),
            content: "attack!".into(),
            image_url: Some("https://example.com/a.png".into()),
        };
        assert!(ok.validate().is_ok());

        let bad = PostMessageRequest {
            user_id: " ".into(),
            content: "attack!".into(),
            image_url: Some("a.png".into()),
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn blank_image_url_means_no_image() {
        let request = PostMessageRequest {
            user_id: "alice".into(),
            content: "hi".into(),
            image_url: Some("  ".into()),
        };
        assert!(request.validate().is_ok());

        let ai = PostAiMessageRequest {
            content: "roar".into(),
            image_url: Some(String::new()),
        };
        assert!(ai.validate().is_ok());
    }

    #[test]
    fn ai_message_request_rejects_relative_image() {
        let request = PostAiMessageRequest {
            content: "roar".into(),
            image_url: Some("not a url".into()),
        };
        assert!(request.validate().is_err());
    }
}
