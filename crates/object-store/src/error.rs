use thiserror::Error;

use crate::database::DatabaseError;

/// Errors returned by the object store.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("object storage error: {0}")]
    Storage(#[from] object_store::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<sqlx::Error> for ObjectStoreError {
    fn from(err: sqlx::Error) -> Self {
        ObjectStoreError::Database(DatabaseError::Sqlite(err))
    }
}

pub type Result<T> = std::result::Result<T, ObjectStoreError>;
