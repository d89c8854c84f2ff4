//! The document service: every read and write of document state goes
//! through here.
//!
//! The service owns all invariant enforcement. It holds nothing but its two
//! store handles and its config, so any number of tasks can call it at once;
//! serialization of writers is left to the record store's atomic primitives.

mod error;
mod types;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::document::{Category, Document, DocumentStatus, Version};
use crate::metadata::Metadata;
use crate::store::{
    BlobRef, BlobStore, DocumentFilter, GroupField, RecordError, RecordPatch, RecordStore,
    UpdateOutcome,
};

pub use error::DocumentError;
pub use types::{
    DownloadedFile, FileContent, ServiceConfig, Statistics, UploadRequest,
    DEFAULT_MAX_APPEND_ATTEMPTS,
};

pub type Result<T> = std::result::Result<T, DocumentError>;

#[derive(Debug, Clone)]
pub struct DocumentService<R, B> {
    records: R,
    blobs: B,
    config: ServiceConfig,
}

impl<R, B> DocumentService<R, B>
where
    R: RecordStore,
    B: BlobStore,
{
    pub fn new(records: R, blobs: B) -> Self {
        Self::with_config(records, blobs, ServiceConfig::default())
    }

    pub fn with_config(records: R, blobs: B, config: ServiceConfig) -> Self {
        Self {
            records,
            blobs,
            config,
        }
    }

    pub fn records(&self) -> &R {
        &self.records
    }

    pub fn blobs(&self) -> &B {
        &self.blobs
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Create a document with its first version.
    ///
    /// The record store's insert-if-absent is what guarantees doc_code
    /// uniqueness; the lookup up front only avoids writing content for an
    /// upload that is bound to fail.
    pub async fn upload_document(&self, request: UploadRequest) -> Result<Document> {
        if request.status == DocumentStatus::Archived {
            return Err(DocumentError::InvalidInitialStatus(request.status));
        }
        if self.records.find_one(&request.doc_code).await?.is_some() {
            return Err(DocumentError::DuplicateCode(request.doc_code));
        }

        let file_size = request.content.size();
        let blob = self.blobs.put(request.content.data).await?;

        let version = Version::new(
            1,
            request.content.file_name,
            blob.clone(),
            file_size,
            request.uploaded_by,
            Utc::now(),
            request.description,
        );
        let mut doc = Document::new(
            request.doc_code,
            request.title,
            request.department,
            request.category,
            version,
            request.metadata,
        );
        doc.status = request.status;

        match self.records.create_if_absent(&doc).await {
            Ok(id) => {
                doc.id = id;
                info!(doc_code = %doc.doc_code, title = %doc.title, "document uploaded");
                Ok(doc)
            }
            Err(err) => {
                self.release_blob(&doc.doc_code, &blob).await;
                match err {
                    RecordError::AlreadyExists(code) => Err(DocumentError::DuplicateCode(code)),
                    other => Err(other.into()),
                }
            }
        }
    }

    /// Append a new version of an existing document.
    ///
    /// The append is a compare-and-swap on `current_version`: if another
    /// writer got there first the document is re-read and the append retried
    /// with the next number, up to `max_append_attempts` times.
    pub async fn upload_new_version(
        &self,
        doc_code: &str,
        content: FileContent,
        uploaded_by: &str,
        description: &str,
    ) -> Result<Document> {
        let mut doc = self.require(doc_code).await?;

        let file_size = content.size();
        let blob = self.blobs.put(content.data).await?;

        let attempts = self.config.max_append_attempts.max(1);
        for attempt in 1..=attempts {
            let now = Utc::now();
            let version = Version::new(
                doc.next_version_number(),
                content.file_name.clone(),
                blob.clone(),
                file_size,
                uploaded_by,
                now,
                description,
            );
            let number = version.version;
            let patch = RecordPatch::AppendVersion {
                version,
                updated_at: now,
            };

            match self
                .records
                .update(doc_code, Some(doc.current_version), patch)
                .await
            {
                Ok(UpdateOutcome::Applied(updated)) => {
                    info!(doc_code = %doc_code, version = number, "new version uploaded");
                    return Ok(updated);
                }
                Ok(UpdateOutcome::Conflict) => {
                    debug!(doc_code = %doc_code, attempt, "version append lost a race, retrying");
                    match self.records.find_one(doc_code).await {
                        Ok(Some(fresh)) => doc = fresh,
                        Ok(None) => {
                            self.release_blob(doc_code, &blob).await;
                            return Err(DocumentError::NotFound(doc_code.to_string()));
                        }
                        Err(err) => {
                            self.release_blob(doc_code, &blob).await;
                            return Err(err.into());
                        }
                    }
                }
                Ok(UpdateOutcome::Missing) => {
                    self.release_blob(doc_code, &blob).await;
                    return Err(DocumentError::NotFound(doc_code.to_string()));
                }
                Err(err) => {
                    self.release_blob(doc_code, &blob).await;
                    return Err(err.into());
                }
            }
        }

        self.release_blob(doc_code, &blob).await;
        warn!(doc_code = %doc_code, attempts, "version append gave up");
        Err(DocumentError::ConcurrencyConflict {
            doc_code: doc_code.to_string(),
            attempts,
        })
    }

    /// Merge `metadata` into the document's metadata, or replace it
    /// outright when `merge` is false.
    pub async fn update_metadata(
        &self,
        doc_code: &str,
        metadata: Metadata,
        merge: bool,
    ) -> Result<Document> {
        let updated_at = Utc::now();
        let patch = if merge {
            RecordPatch::MergeMetadata {
                metadata,
                updated_at,
            }
        } else {
            RecordPatch::ReplaceMetadata {
                metadata,
                updated_at,
            }
        };

        let doc = self.apply(doc_code, patch).await?;
        info!(doc_code = %doc_code, merge, "metadata updated");
        Ok(doc)
    }

    /// Documents matching `filter`, most recently updated first.
    pub async fn search(&self, filter: &DocumentFilter) -> Result<Vec<Document>> {
        Ok(self.records.find_many(filter).await?)
    }

    pub async fn list_all(&self, include_archived: bool) -> Result<Vec<Document>> {
        self.search(&DocumentFilter::new().include_archived(include_archived))
            .await
    }

    /// Exact lookup. An unknown code is `Ok(None)`, not an error.
    pub async fn get_by_doc_code(&self, doc_code: &str) -> Result<Option<Document>> {
        Ok(self.records.find_one(doc_code).await?)
    }

    pub async fn get_version_history(&self, doc_code: &str) -> Result<Vec<Version>> {
        Ok(self.require(doc_code).await?.versions)
    }

    pub async fn get_version(&self, doc_code: &str, version: u32) -> Result<Option<Version>> {
        Ok(self.require(doc_code).await?.version(version).cloned())
    }

    /// Fetch the content of `version`, or of the newest version when `None`.
    pub async fn download_file(
        &self,
        doc_code: &str,
        version: Option<u32>,
    ) -> Result<DownloadedFile> {
        let doc = self.require(doc_code).await?;

        let target = match version {
            Some(number) => doc.version(number),
            None => doc.latest_version(),
        }
        .ok_or_else(|| DocumentError::VersionNotFound {
            doc_code: doc_code.to_string(),
            version: version.unwrap_or(doc.current_version),
        })?;

        let content = self.blobs.get(&target.blob).await?;
        debug!(doc_code = %doc_code, version = target.version, size = content.len(), "file downloaded");

        Ok(DownloadedFile {
            file_name: target.file_name.clone(),
            version: target.version,
            content,
        })
    }

    /// Archive a document. Archiving an archived document changes nothing.
    pub async fn archive_document(&self, doc_code: &str) -> Result<Document> {
        let doc = self.require(doc_code).await?;
        if doc.is_archived() {
            debug!(doc_code = %doc_code, "document already archived");
            return Ok(doc);
        }

        let doc = self
            .apply(
                doc_code,
                RecordPatch::SetStatus {
                    status: DocumentStatus::Archived,
                    updated_at: Utc::now(),
                },
            )
            .await?;
        info!(doc_code = %doc_code, "document archived");
        Ok(doc)
    }

    /// Set a document active, whatever its current status.
    pub async fn restore_document(&self, doc_code: &str) -> Result<Document> {
        let doc = self
            .apply(
                doc_code,
                RecordPatch::SetStatus {
                    status: DocumentStatus::Active,
                    updated_at: Utc::now(),
                },
            )
            .await?;
        info!(doc_code = %doc_code, "document restored");
        Ok(doc)
    }

    /// Delete a document, and with `delete_files` the content of every
    /// version. Returns `false` if there was no such document.
    ///
    /// Content is released from the record the store actually removed, so
    /// of two concurrent deletes only the one that removed it releases
    /// anything. Content deletion is best-effort: failures are logged and
    /// never undo the record removal.
    pub async fn delete_document(&self, doc_code: &str, delete_files: bool) -> Result<bool> {
        let Some(doc) = self.records.delete_one(doc_code).await? else {
            return Ok(false);
        };
        info!(doc_code = %doc_code, versions = doc.versions.len(), "document deleted");

        if delete_files {
            for version in &doc.versions {
                self.release_blob(doc_code, &version.blob).await;
            }
        }
        Ok(true)
    }

    /// Totals and per-department, per-category and per-status counts over
    /// all documents, archived ones included.
    pub async fn get_statistics(&self) -> Result<Statistics> {
        let totals = self.records.totals().await?;
        let by_department = self.records.count_by(GroupField::Department).await?;

        let mut by_category = std::collections::BTreeMap::new();
        for (key, count) in self.records.count_by(GroupField::Category).await? {
            let category: Category =
                key.parse()
                    .map_err(|e: crate::document::UnknownCategory| RecordError::InvalidRecord {
                        doc_code: String::from("*"),
                        reason: e.to_string(),
                    })?;
            by_category.insert(category, count);
        }

        let mut by_status = std::collections::BTreeMap::new();
        for (key, count) in self.records.count_by(GroupField::Status).await? {
            let status: DocumentStatus =
                key.parse()
                    .map_err(|e: crate::document::UnknownStatus| RecordError::InvalidRecord {
                        doc_code: String::from("*"),
                        reason: e.to_string(),
                    })?;
            by_status.insert(status, count);
        }

        Ok(Statistics {
            total_documents: totals.documents,
            total_versions: totals.versions,
            by_department,
            by_category,
            by_status,
        })
    }

    async fn require(&self, doc_code: &str) -> Result<Document> {
        self.records
            .find_one(doc_code)
            .await?
            .ok_or_else(|| DocumentError::NotFound(doc_code.to_string()))
    }

    async fn apply(&self, doc_code: &str, patch: RecordPatch) -> Result<Document> {
        match self.records.update(doc_code, None, patch).await? {
            UpdateOutcome::Applied(doc) => Ok(doc),
            UpdateOutcome::Missing => Err(DocumentError::NotFound(doc_code.to_string())),
            // unconditional updates cannot conflict
            UpdateOutcome::Conflict => Err(DocumentError::ConcurrencyConflict {
                doc_code: doc_code.to_string(),
                attempts: 1,
            }),
        }
    }

    async fn release_blob(&self, doc_code: &str, blob: &BlobRef) {
        if let Err(e) = self.blobs.delete(blob).await {
            warn!(doc_code = %doc_code, blob = %blob, error = %e, "failed to delete blob");
        }
    }
}
