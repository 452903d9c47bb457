use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::dao::models::{MessageEntity, SessionEntity, SessionStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    id: String,
    users: Vec<String>,
    status: SessionStatus,
    version: i64,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<SessionEntity> for MongoSessionDocument {
    fn from(value: SessionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            users: value.users,
            status: value.status,
            version: value.version as i64,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoSessionDocument> for SessionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoSessionDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_id(&value.id)?,
            users: value.users,
            status: value.status,
            version: u64::try_from(value.version).map_err(|_| {
                MongoDaoError::MalformedDocument {
                    id: value.id.clone(),
                    reason: "negative version",
                }
            })?,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMessageDocument {
    #[serde(rename = "_id")]
    id: String,
    session_id: String,
    user_id: Option<String>,
    is_ai: bool,
    content: String,
    image_url: Option<String>,
    created_at: DateTime,
}

impl From<MessageEntity> for MongoMessageDocument {
    fn from(value: MessageEntity) -> Self {
        Self {
            id: value.id.to_string(),
            session_id: value.session_id.to_string(),
            user_id: value.user_id,
            is_ai: value.is_ai,
            content: value.content,
            image_url: value.image_url,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoMessageDocument> for MessageEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoMessageDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_id(&value.id)?,
            session_id: parse_id(&value.session_id)?,
            user_id: value.user_id,
            is_ai: value.is_ai,
            content: value.content,
            image_url: value.image_url,
            created_at: value.created_at.to_system_time(),
        })
    }
}

fn parse_id(raw: &str) -> Result<Uuid, MongoDaoError> {
    Uuid::parse_str(raw).map_err(|_| MongoDaoError::MalformedDocument {
        id: raw.to_owned(),
        reason: "invalid UUID",
    })
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

pub fn versioned_doc_id(id: Uuid, version: u64) -> Document {
    doc! {"_id": id.to_string(), "version": version as i64}
}

pub fn session_filter(session_id: Uuid) -> Document {
    doc! {"session_id": session_id.to_string()}
}
