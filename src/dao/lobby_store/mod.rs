#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{MessageEntity, MessageOrder, SessionEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the persistence layer for game sessions and their chat messages.
pub trait LobbyStore: Send + Sync {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Store `session` only if the persisted version still equals `expected_version`.
    ///
    /// Returns `Ok(false)` when the session no longer exists and
    /// [`StorageError::Conflict`](crate::dao::storage::StorageError::Conflict) when another
    /// writer got there first.
    fn replace_session(
        &self,
        session: SessionEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    fn insert_message(&self, message: MessageEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn list_messages(
        &self,
        session_id: Uuid,
        order: MessageOrder,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<MessageEntity>>>;
    fn count_messages(
        &self,
        session_id: Uuid,
        ai_only: bool,
    ) -> BoxFuture<'static, StorageResult<u64>>;
    fn delete_message(
        &self,
        session_id: Uuid,
        message_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
