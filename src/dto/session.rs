use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dao::models::{SessionEntity, SessionStatus},
    dto::{
        format_system_time,
        validation::{field_errors, validate_username},
    },
};

/// Payload used to open a new game session.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    /// Creator's username; when omitted the session starts with no members.
    #[serde(default)]
    pub username: Option<String>,
}

impl Validate for CreateSessionRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self.username {
            Some(ref username) => field_errors([("username", validate_username(username))]),
            None => Ok(()),
        }
    }
}

/// Payload used to add a player to a session.
#[derive(Debug, Deserialize, ToSchema)]
pub struct JoinSessionRequest {
    pub username: String,
}

impl Validate for JoinSessionRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        field_errors([("username", validate_username(&self.username))])
    }
}

/// Payload used to flip the session status.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdateStatusRequest {
    pub status: SessionStatus,
}

/// Session projection returned by the REST API and the change-feed.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionSummary {
    pub id: Uuid,
    pub users: Vec<String>,
    pub status: SessionStatus,
    /// Revision counter, bumped on every membership or status change.
    pub version: u64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<SessionEntity> for SessionSummary {
    fn from(session: SessionEntity) -> Self {
        Self {
            id: session.id,
            users: session.users,
            status: session.status,
            version: session.version,
            created_at: format_system_time(session.created_at),
            updated_at: format_system_time(session.updated_at),
        }
    }
}

/// Answer of the lightweight existence probe used by the join dialog.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SessionExistsResponse {
    pub exists: bool,
}
