use crate::document::DocumentStatus;
use crate::store::{BlobError, RecordError};

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("document code already exists: {0}")]
    DuplicateCode(String),
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("version {version} not found for document {doc_code}")]
    VersionNotFound { doc_code: String, version: u32 },
    #[error("concurrent update conflict on {doc_code}: gave up after {attempts} attempts")]
    ConcurrencyConflict { doc_code: String, attempts: u32 },
    #[error("documents cannot be created as {0}")]
    InvalidInitialStatus(DocumentStatus),
    #[error("content i/o error: {0}")]
    ContentIo(#[from] BlobError),
    #[error("record store error: {0}")]
    RecordStore(#[from] RecordError),
}
