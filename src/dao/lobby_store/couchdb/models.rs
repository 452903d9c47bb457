use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::{
    lobby_store::couchdb::error::CouchDaoError,
    models::{MessageEntity, SessionEntity, SessionStatus},
};

pub const SESSION_PREFIX: &str = "session::";
pub const MESSAGE_PREFIX: &str = "message::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
    #[serde(default)]
    pub doc: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct FindResponse<T> {
    pub docs: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchSessionDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub session: SessionBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionBody {
    pub users: Vec<String>,
    pub status: SessionStatus,
    pub version: u64,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl From<(SessionEntity, Option<String>)> for CouchSessionDocument {
    fn from((session, rev): (SessionEntity, Option<String>)) -> Self {
        Self {
            id: session_doc_id(session.id),
            rev,
            session: SessionBody {
                users: session.users,
                status: session.status,
                version: session.version,
                created_at: session.created_at,
                updated_at: session.updated_at,
            },
        }
    }
}

impl TryFrom<CouchSessionDocument> for SessionEntity {
    type Error = CouchDaoError;

    fn try_from(doc: CouchSessionDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: extract_uuid(&doc.id)?,
            users: doc.session.users,
            status: doc.session.status,
            version: doc.session.version,
            created_at: doc.session.created_at,
            updated_at: doc.session.updated_at,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchMessageDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub message: MessageBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBody {
    pub message_id: Uuid,
    pub session_id: Uuid,
    pub user_id: Option<String>,
    pub is_ai: bool,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: SystemTime,
}

impl From<MessageEntity> for CouchMessageDocument {
    fn from(message: MessageEntity) -> Self {
        Self {
            id: message_doc_id(&message),
            rev: None,
            message: MessageBody {
                message_id: message.id,
                session_id: message.session_id,
                user_id: message.user_id,
                is_ai: message.is_ai,
                content: message.content,
                image_url: message.image_url,
                created_at: message.created_at,
            },
        }
    }
}

impl From<CouchMessageDocument> for MessageEntity {
    fn from(doc: CouchMessageDocument) -> Self {
        Self {
            id: doc.message.message_id,
            session_id: doc.message.session_id,
            user_id: doc.message.user_id,
            is_ai: doc.message.is_ai,
            content: doc.message.content,
            image_url: doc.message.image_url,
            created_at: doc.message.created_at,
        }
    }
}

pub fn session_doc_id(id: Uuid) -> String {
    format!("{}{}", SESSION_PREFIX, id)
}

/// Prefix shared by every message document of a session.
pub fn session_messages_prefix(session_id: Uuid) -> String {
    format!("{}{}::", MESSAGE_PREFIX, session_id)
}

/// Message ids embed a zero-padded timestamp so `_all_docs` range scans come back chronological.
pub fn message_doc_id(message: &MessageEntity) -> String {
    let micros = message
        .created_at
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_micros())
        .unwrap_or_default();
    format!(
        "{}{:020}::{}",
        session_messages_prefix(message.session_id),
        micros,
        message.id
    )
}

pub fn extract_uuid(doc_id: &str) -> Result<Uuid, CouchDaoError> {
    let (_, id) = doc_id
        .split_once("::")
        .ok_or_else(|| CouchDaoError::InvalidDocId {
            doc_id: doc_id.to_string(),
            kind: "missing separator",
        })?;

    Uuid::parse_str(id).map_err(|_| CouchDaoError::InvalidDocId {
        doc_id: doc_id.to_string(),
        kind: "invalid UUID",
    })
}
