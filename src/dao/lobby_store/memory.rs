//! In-process [`LobbyStore`] used for local development and tests.

use std::sync::Arc;

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    lobby_store::LobbyStore,
    models::{MessageEntity, MessageOrder, SessionEntity, sort_and_truncate},
    storage::{StorageError, StorageResult},
};

#[derive(Clone, Default)]
pub struct MemoryLobbyStore {
    sessions: Arc<DashMap<Uuid, SessionEntity>>,
    messages: Arc<DashMap<Uuid, Vec<MessageEntity>>>,
}

impl MemoryLobbyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LobbyStore for MemoryLobbyStore {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.sessions.insert(session.id, session);
            Ok(())
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.sessions.get(&id).map(|entry| entry.value().clone())) })
    }

    fn replace_session(
        &self,
        session: SessionEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            match store.sessions.entry(session.id) {
                Entry::Vacant(_) => Ok(false),
                Entry::Occupied(mut occupied) => {
                    if occupied.get().version != expected_version {
                        return Err(StorageError::Conflict {
                            id: session.id,
                            expected: expected_version,
                        });
                    }
                    occupied.insert(session);
                    Ok(true)
                }
            }
        })
    }

    fn insert_message(&self, message: MessageEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .messages
                .entry(message.session_id)
                .or_default()
                .push(message);
            Ok(())
        })
    }

    fn list_messages(
        &self,
        session_id: Uuid,
        order: MessageOrder,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<MessageEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let messages = store
                .messages
                .get(&session_id)
                .map(|entry| entry.value().clone())
                .unwrap_or_default();
            Ok(sort_and_truncate(messages, order, limit))
        })
    }

    fn count_messages(
        &self,
        session_id: Uuid,
        ai_only: bool,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            let count = store
                .messages
                .get(&session_id)
                .map(|entry| {
                    entry
                        .value()
                        .iter()
                        .filter(|message| !ai_only || message.is_ai)
                        .count()
                })
                .unwrap_or(0);
            Ok(count as u64)
        })
    }

    fn delete_message(
        &self,
        session_id: Uuid,
        message_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let Some(mut entry) = store.messages.get_mut(&session_id) else {
                return Ok(false);
            };
            let before = entry.len();
            entry.retain(|message| message.id != message_id);
            Ok(entry.len() != before)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replace_session_detects_stale_version() {
        let store = MemoryLobbyStore::new();
        let session = SessionEntity::new(vec!["alice".into()]);
        store.insert_session(session.clone()).await.unwrap();

        let mut first = session.next_revision();
        first.users.push("bob".into());
        assert!(store.replace_session(first, 0).await.unwrap());

        let mut stale = session.next_revision();
        stale.users.push("carol".into());
        let err = store.replace_session(stale, 0).await.unwrap_err();
        assert!(err.is_conflict());

        let stored = store.find_session(session.id).await.unwrap().unwrap();
        assert_eq!(stored.users, vec!["alice".to_string(), "bob".to_string()]);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn replace_missing_session_reports_false() {
        let store = MemoryLobbyStore::new();
        let session = SessionEntity::new(Vec::new());
        assert!(!store.replace_session(session, 0).await.unwrap());
    }

    #[tokio::test]
    async fn messages_are_scoped_counted_and_deleted() {
        let store = MemoryLobbyStore::new();
        let session_id = Uuid::new_v4();
        let other_session = Uuid::new_v4();

        let user = MessageEntity::from_user(session_id, "alice".into(), "hello".into(), None);
        let ai = MessageEntity::from_ai(session_id, "grr".into(), None);
        store.insert_message(user.clone()).await.unwrap();
        store.insert_message(ai).await.unwrap();
        store
            .insert_message(MessageEntity::from_ai(other_session, "elsewhere".into(), None))
            .await
            .unwrap();

        assert_eq!(store.count_messages(session_id, false).await.unwrap(), 2);
        assert_eq!(store.count_messages(session_id, true).await.unwrap(), 1);

        assert!(store.delete_message(session_id, user.id).await.unwrap());
        assert!(!store.delete_message(session_id, user.id).await.unwrap());
        assert!(!store.delete_message(other_session, user.id).await.unwrap());
        assert_eq!(store.count_messages(session_id, false).await.unwrap(), 1);
    }
}
