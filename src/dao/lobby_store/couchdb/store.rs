use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{from_value, json};
use uuid::Uuid;

use crate::dao::{
    lobby_store::LobbyStore,
    models::{MessageEntity, MessageOrder, SessionEntity},
    storage::{StorageError, StorageResult},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, CouchMessageDocument, CouchSessionDocument, END_SUFFIX, FindResponse,
        session_doc_id, session_messages_prefix,
    },
};

const ALL_DOCS: &str = "_all_docs";
const FIND: &str = "_find";

/// Outcome of a conditional document write.
enum PutOutcome {
    Stored,
    Conflict,
}

#[derive(Clone)]
pub struct CouchLobbyStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchLobbyStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .credentials
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn database_url(&self) -> String {
        format!("{}/{}", self.base_url, self.database)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.database_url(), path);
        self.authorize(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url();

        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::Database {
                database: database.clone(),
                action: "inspect",
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::Database {
                        database: database.clone(),
                        action: "create",
                        source,
                    })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::Transport {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::Decode {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::Status {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// PUT a document; CouchDB answers 409 when the embedded `_rev` is stale.
    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<PutOutcome>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::Transport {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::CONFLICT => Ok(PutOutcome::Conflict),
            status if status.is_success() => Ok(PutOutcome::Stored),
            other => Err(CouchDaoError::Status {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn delete_document(&self, doc_id: &str, rev: &str) -> CouchResult<bool> {
        let response = self
            .request(Method::DELETE, doc_id)
            .query(&[("rev", rev)])
            .send()
            .await
            .map_err(|source| CouchDaoError::Transport {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::CONFLICT => Ok(false),
            status if status.is_success() => Ok(true),
            other => Err(CouchDaoError::Status {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn list_documents<T>(
        &self,
        prefix: &str,
        descending: bool,
        limit: Option<usize>,
    ) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let low = format!("\"{}\"", prefix);
        let high = format!("\"{}{}\"", prefix, END_SUFFIX);
        let (startkey, endkey) = if descending { (high, low) } else { (low, high) };

        let mut query = vec![
            ("include_docs", "true".to_string()),
            ("startkey", startkey),
            ("endkey", endkey),
            ("descending", descending.to_string()),
        ];
        if let Some(limit) = limit {
            query.push(("limit", limit.to_string()));
        }

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::Transport {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::Status {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::Decode {
                path: ALL_DOCS.to_string(),
                source,
            }
        })?;

        let mut documents = Vec::with_capacity(payload.rows.len());
        for row in payload.rows {
            if let Some(doc) = row.doc {
                let parsed = from_value(doc).map_err(|source| CouchDaoError::Deserialize {
                    path: row.id,
                    source,
                })?;
                documents.push(parsed);
            }
        }

        Ok(documents)
    }

    async fn find_message_document(
        &self,
        session_id: Uuid,
        message_id: Uuid,
    ) -> CouchResult<Option<CouchMessageDocument>> {
        let selector = json!({
            "selector": {
                "session_id": session_id,
                "message_id": message_id,
            },
            "limit": 1,
        });

        let response = self
            .request(Method::POST, FIND)
            .json(&selector)
            .send()
            .await
            .map_err(|source| CouchDaoError::Transport {
                path: FIND.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::Status {
                path: FIND.to_string(),
                status: response.status(),
            });
        }

        let payload = response
            .json::<FindResponse<CouchMessageDocument>>()
            .await
            .map_err(|source| CouchDaoError::Decode {
                path: FIND.to_string(),
                source,
            })?;

        Ok(payload.docs.into_iter().next())
    }

    async fn find_session_document(
        &self,
        id: Uuid,
    ) -> CouchResult<Option<CouchSessionDocument>> {
        self.get_document::<CouchSessionDocument>(&session_doc_id(id))
            .await
    }
}

impl LobbyStore for CouchLobbyStore {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = session.id;
            let doc: CouchSessionDocument = (session, None).into();
            match store.put_document(&doc.id, &doc).await? {
                PutOutcome::Stored => Ok(()),
                PutOutcome::Conflict => Err(StorageError::Conflict { id, expected: 0 }),
            }
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let maybe_doc = store.find_session_document(id).await?;
            maybe_doc
                .map(SessionEntity::try_from)
                .transpose()
                .map_err(Into::into)
        })
    }

    fn replace_session(
        &self,
        session: SessionEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let id = session.id;
            let Some(existing) = store.find_session_document(id).await? else {
                return Ok(false);
            };
            if existing.session.version != expected_version {
                return Err(StorageError::Conflict {
                    id,
                    expected: expected_version,
                });
            }

            // The `_rev` read above makes CouchDB reject the write if anyone slipped in between.
            let doc: CouchSessionDocument = (session, existing.rev).into();
            match store.put_document(&doc.id, &doc).await? {
                PutOutcome::Stored => Ok(true),
                PutOutcome::Conflict => Err(StorageError::Conflict {
                    id,
                    expected: expected_version,
                }),
            }
        })
    }

    fn insert_message(&self, message: MessageEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc: CouchMessageDocument = message.into();
            match store.put_document(&doc.id, &doc).await? {
                PutOutcome::Stored => Ok(()),
                PutOutcome::Conflict => Err(CouchDaoError::Status {
                    path: doc.id,
                    status: StatusCode::CONFLICT,
                }
                .into()),
            }
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
            let docs = store
                .list_documents::<CouchMessageDocument>(
                    &session_messages_prefix(session_id),
                    order == MessageOrder::Newest,
                    Some(limit),
                )
                .await?;
            Ok(docs.into_iter().map(Into::into).collect())
        })
    }

    fn count_messages(
        &self,
        session_id: Uuid,
        ai_only: bool,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            let docs = store
                .list_documents::<CouchMessageDocument>(
                    &session_messages_prefix(session_id),
                    false,
                    None,
                )
                .await?;
            let count = docs
                .iter()
                .filter(|doc| !ai_only || doc.message.is_ai)
                .count();
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
            let Some(doc) = store.find_message_document(session_id, message_id).await? else {
                return Ok(false);
            };
            let Some(rev) = doc.rev else {
                return Ok(false);
            };
            store
                .delete_document(&doc.id, &rev)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url();
            let response = store
                .authorize(store.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::Transport {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::Status {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}
