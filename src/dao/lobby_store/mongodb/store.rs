use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{Client, Collection, Database, IndexModel, bson::doc, options::IndexOptions};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoMessageDocument, MongoSessionDocument, doc_id, session_filter, versioned_doc_id,
    },
};
use crate::dao::{
    lobby_store::LobbyStore,
    models::{MessageEntity, MessageOrder, SessionEntity},
    storage::{StorageError, StorageResult},
};

const SESSION_COLLECTION_NAME: &str = "sessions";
const MESSAGE_COLLECTION_NAME: &str = "messages";

#[derive(Clone)]
pub struct MongoLobbyStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = establish_connection(&self.config).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoLobbyStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) = establish_connection(&config).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let index = IndexModel::builder()
            .keys(doc! {"session_id": 1, "created_at": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("message_session_created_idx".to_owned()))
                    .build(),
            )
            .build();

        self.messages()
            .await
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: MESSAGE_COLLECTION_NAME,
                index: "session_id,created_at",
                source,
            })?;

        Ok(())
    }

    async fn sessions(&self) -> Collection<MongoSessionDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoSessionDocument>(SESSION_COLLECTION_NAME)
    }

    async fn messages(&self) -> Collection<MongoMessageDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoMessageDocument>(MESSAGE_COLLECTION_NAME)
    }

    async fn insert_session(&self, session: SessionEntity) -> MongoResult<()> {
        let id = session.id;
        let document: MongoSessionDocument = session.into();
        self.sessions()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveSession { id, source })?;
        Ok(())
    }

    async fn find_session(&self, id: Uuid) -> MongoResult<Option<SessionEntity>> {
        let document = self
            .sessions()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadSession { id, source })?;

        document.map(SessionEntity::try_from).transpose()
    }

    async fn replace_session(
        &self,
        session: SessionEntity,
        expected_version: u64,
    ) -> StorageResult<bool> {
        let id = session.id;
        let document: MongoSessionDocument = session.into();
        let result = self
            .sessions()
            .await
            .replace_one(versioned_doc_id(id, expected_version), &document)
            .await
            .map_err(|source| MongoDaoError::SaveSession { id, source })?;

        if result.matched_count > 0 {
            return Ok(true);
        }

        // Nothing matched: either the session is gone or its version moved on.
        match self.find_session(id).await? {
            Some(_) => Err(StorageError::Conflict {
                id,
                expected: expected_version,
            }),
            None => Ok(false),
        }
    }

    async fn insert_message(&self, message: MessageEntity) -> MongoResult<()> {
        let id = message.id;
        let document: MongoMessageDocument = message.into();
        self.messages()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveMessage { id, source })?;
        Ok(())
    }

    async fn list_messages(
        &self,
        session_id: Uuid,
        order: MessageOrder,
        limit: usize,
    ) -> MongoResult<Vec<MessageEntity>> {
        let direction = match order {
            MessageOrder::Oldest => 1,
            MessageOrder::Newest => -1,
        };

        let documents: Vec<MongoMessageDocument> = self
            .messages()
            .await
            .find(session_filter(session_id))
            .sort(doc! {"created_at": direction, "_id": direction})
            .limit(limit as i64)
            .await
            .map_err(|source| MongoDaoError::LoadMessages { session_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadMessages { session_id, source })?;

        documents
            .into_iter()
            .map(MessageEntity::try_from)
            .collect()
    }

    async fn count_messages(&self, session_id: Uuid, ai_only: bool) -> MongoResult<u64> {
        let mut filter = session_filter(session_id);
        if ai_only {
            filter.insert("is_ai", true);
        }

        self.messages()
            .await
            .count_documents(filter)
            .await
            .map_err(|source| MongoDaoError::LoadMessages { session_id, source })
    }

    async fn delete_message(&self, session_id: Uuid, message_id: Uuid) -> MongoResult<bool> {
        let mut filter = doc_id(message_id);
        filter.insert("session_id", session_id.to_string());

        let result = self
            .messages()
            .await
            .delete_one(filter)
            .await
            .map_err(|source| MongoDaoError::DeleteMessage {
                id: message_id,
                source,
            })?;
        Ok(result.deleted_count > 0)
    }
}

impl LobbyStore for MongoLobbyStore {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_session(session).await.map_err(Into::into) })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session(id).await.map_err(Into::into) })
    }

    fn replace_session(
        &self,
        session: SessionEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.replace_session(session, expected_version).await })
    }

    fn insert_message(&self, message: MessageEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_message(message).await.map_err(Into::into) })
    }

    fn list_messages(
        &self,
        session_id: Uuid,
        order: MessageOrder,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<MessageEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_messages(session_id, order, limit)
                .await
                .map_err(Into::into)
        })
    }

    fn count_messages(
        &self,
        session_id: Uuid,
        ai_only: bool,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .count_messages(session_id, ai_only)
                .await
                .map_err(Into::into)
        })
    }

    fn delete_message(
        &self,
        session_id: Uuid,
        message_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_message(session_id, message_id)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
