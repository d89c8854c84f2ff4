//! Interfaces to the two external stores the document service drives.
//!
//! - [`BlobStore`]: durable, content-addressed storage for file bytes
//! - [`RecordStore`]: one record per document, with per-key atomic
//!   conditional updates and filtered queries
//!
//! Implementations: [`MemoryRecordStore`] here, `ObjectStore` as a
//! [`BlobStore`] (see `crate::blobs`) and the SQLite record store in the
//! daemon.

mod filter;
mod memory;

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::{Document, DocumentStatus, RecordId, Version};
use crate::metadata::Metadata;

pub use filter::{sort_by_recency, DocumentFilter, StatusClause};
pub use memory::MemoryRecordStore;

/// Opaque handle to content held by a [`BlobStore`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobRef(String);

impl BlobRef {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlobRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob not found: {0}")]
    NotFound(BlobRef),
    #[error("invalid blob reference: {0}")]
    InvalidRef(BlobRef),
    #[error("blob store error: {0}")]
    Backend(#[from] anyhow::Error),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes and return a handle to them.
    async fn put(&self, data: Bytes) -> Result<BlobRef, BlobError>;

    /// Fetch the bytes behind a handle.
    async fn get(&self, blob: &BlobRef) -> Result<Bytes, BlobError>;

    /// Release the content behind a handle.
    async fn delete(&self, blob: &BlobRef) -> Result<(), BlobError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// A record with this doc_code already exists
    #[error("record already exists: {0}")]
    AlreadyExists(String),
    /// A stored record could not be decoded
    #[error("invalid record {doc_code}: {reason}")]
    InvalidRecord { doc_code: String, reason: String },
    #[error("record store error: {0}")]
    Backend(#[from] anyhow::Error),
}

/// A change applied to one record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordPatch {
    /// Push `version` onto the version list and set `current_version` to
    /// its number
    AppendVersion {
        version: Version,
        updated_at: DateTime<Utc>,
    },
    /// Shallow-merge into the stored metadata
    MergeMetadata {
        metadata: Metadata,
        updated_at: DateTime<Utc>,
    },
    /// Replace the stored metadata
    ReplaceMetadata {
        metadata: Metadata,
        updated_at: DateTime<Utc>,
    },
    SetStatus {
        status: DocumentStatus,
        updated_at: DateTime<Utc>,
    },
}

impl RecordPatch {
    /// Apply the patch to an in-memory snapshot.
    pub fn apply(&self, doc: &Document) -> Document {
        match self {
            RecordPatch::AppendVersion {
                version,
                updated_at,
            } => doc.with_version(version.clone(), *updated_at),
            RecordPatch::MergeMetadata {
                metadata,
                updated_at,
            } => doc.with_metadata(doc.metadata.merge(metadata), *updated_at),
            RecordPatch::ReplaceMetadata {
                metadata,
                updated_at,
            } => doc.with_metadata(metadata.clone(), *updated_at),
            RecordPatch::SetStatus { status, updated_at } => {
                doc.with_status(*status, *updated_at)
            }
        }
    }
}

/// Result of [`RecordStore::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// The patch was applied; carries the record as stored afterwards
    Applied(Document),
    /// The record's `current_version` did not match the expected value
    Conflict,
    /// No record with that doc_code
    Missing,
}

/// Fields documents can be grouped and counted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupField {
    Department,
    Category,
    Status,
}

impl GroupField {
    pub fn key_of(&self, doc: &Document) -> String {
        match self {
            GroupField::Department => doc.department.clone(),
            GroupField::Category => doc.category.as_str().to_string(),
            GroupField::Status => doc.status.as_str().to_string(),
        }
    }
}

/// Document and version totals over the whole store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub documents: u64,
    pub versions: u64,
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert `doc` unless a record with its doc_code exists, as one atomic
    /// step. Fails with [`RecordError::AlreadyExists`] otherwise.
    async fn create_if_absent(&self, doc: &Document) -> Result<RecordId, RecordError>;

    async fn find_one(&self, doc_code: &str) -> Result<Option<Document>, RecordError>;

    /// Every record matching `filter`, most recently updated first.
    async fn find_many(&self, filter: &DocumentFilter) -> Result<Vec<Document>, RecordError>;

    /// Apply `patch` to the record for `doc_code` as one indivisible step.
    ///
    /// With `expected_current_version` set, the patch only lands if the
    /// stored `current_version` still equals it.
    async fn update(
        &self,
        doc_code: &str,
        expected_current_version: Option<u32>,
        patch: RecordPatch,
    ) -> Result<UpdateOutcome, RecordError>;

    /// Remove the record for `doc_code` and return it as it was at removal.
    /// Of several concurrent callers at most one gets `Some`.
    async fn delete_one(&self, doc_code: &str) -> Result<Option<Document>, RecordError>;

    /// Number of documents per distinct value of `field`.
    async fn count_by(&self, field: GroupField) -> Result<BTreeMap<String, u64>, RecordError>;

    async fn totals(&self) -> Result<Totals, RecordError>;
}
