use reqwest::StatusCode;
use thiserror::Error;

use crate::dao::storage::StorageError;

pub type CouchResult<T> = Result<T, CouchDaoError>;

/// Failures raised by the CouchDB lobby store.
#[derive(Debug, Error)]
pub enum CouchDaoError {
    #[error("missing CouchDB environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to build CouchDB HTTP client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// Bootstrapping the lobby database failed at the transport level.
    #[error("failed to {action} CouchDB database `{database}`")]
    Database {
        database: String,
        action: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("CouchDB database `{database}` answered with status {status}")]
    DatabaseStatus {
        database: String,
        status: StatusCode,
    },
    #[error("CouchDB request to `{path}` failed")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("CouchDB answered {status} for `{path}`")]
    Status { path: String, status: StatusCode },
    #[error("CouchDB response for `{path}` is not valid JSON")]
    Decode {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    /// A lobby document did not match the expected session or message shape.
    #[error("CouchDB document at `{path}` does not match the lobby schema")]
    Deserialize {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid lobby document id `{doc_id}`: {kind}")]
    InvalidDocId { doc_id: String, kind: &'static str },
}

impl From<CouchDaoError> for StorageError {
    fn from(err: CouchDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}
