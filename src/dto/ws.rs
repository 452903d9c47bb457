use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from feed WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedInboundMessage {
    /// Post a chat message on behalf of `user_id`.
    Message {
        user_id: String,
        content: String,
        #[serde(default)]
        image_url: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl FeedInboundMessage {
    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Frames pushed to feed WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedOutboundMessage {
    /// Positive acknowledgement of an inbound message, carrying the stored id.
    Ack { id: Uuid },
    /// The inbound frame was rejected.
    Error { message: String },
}

#[derive(Debug, Serialize, ToSchema)]
/// Change-feed event relayed as a text frame.
pub struct FeedEventFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_message_parses_optional_image() {
        let parsed = FeedInboundMessage::from_json_str(
            r#"{"type":"message","user_id":"alice","content":"hi"}"#,
        )
        .unwrap();
        match parsed {
            FeedInboundMessage::Message {
                user_id,
                content,
                image_url,
            } => {
                assert_eq!(user_id, "alice");
                assert_eq!(content, "hi");
                assert!(image_url.is_none());
            }
            FeedInboundMessage::Unknown => panic!("expected a message frame"),
        }
    }

    #[test]
    fn unknown_frames_are_tolerated() {
        let parsed = FeedInboundMessage::from_json_str(r#"{"type":"typing"}"#).unwrap();
        assert!(matches!(parsed, FeedInboundMessage::Unknown));
    }

    #[test]
    fn outbound_frames_are_tagged() {
        let ack = serde_json::to_value(FeedOutboundMessage::Error {
            message: "nope".into(),
        })
        .unwrap();
        assert_eq!(ack["type"], "error");
        assert_eq!(ack["message"], "nope");
    }
}
