use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Serialize;

use crate::document::{Category, DocumentStatus};
use crate::metadata::Metadata;

/// Default number of attempts for an optimistic version append.
pub const DEFAULT_MAX_APPEND_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceConfig {
    /// How many times a version append re-reads and retries after losing a
    /// race before failing with a concurrency conflict
    pub max_append_attempts: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_append_attempts: DEFAULT_MAX_APPEND_ATTEMPTS,
        }
    }
}

/// An uploaded file: its name and its bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub file_name: String,
    pub data: Bytes,
}

impl FileContent {
    pub fn new(file_name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            data: data.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Inputs for creating a new document.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub content: FileContent,
    pub doc_code: String,
    pub title: String,
    pub department: String,
    pub category: Category,
    pub uploaded_by: String,
    pub metadata: Metadata,
    pub description: String,
    /// Active or draft
    pub status: DocumentStatus,
}

impl UploadRequest {
    pub fn new(
        content: FileContent,
        doc_code: impl Into<String>,
        title: impl Into<String>,
        department: impl Into<String>,
        category: Category,
        uploaded_by: impl Into<String>,
    ) -> Self {
        Self {
            content,
            doc_code: doc_code.into(),
            title: title.into(),
            department: department.into(),
            category,
            uploaded_by: uploaded_by.into(),
            metadata: Metadata::new(),
            description: String::new(),
            status: DocumentStatus::Active,
        }
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn draft(mut self) -> Self {
        self.status = DocumentStatus::Draft;
        self
    }
}

/// A version's content together with its stored file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    pub file_name: String,
    pub version: u32,
    pub content: Bytes,
}

/// Counts over every document in the store, archived ones included.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total_documents: u64,
    pub total_versions: u64,
    pub by_department: BTreeMap<String, u64>,
    pub by_category: BTreeMap<Category, u64>,
    pub by_status: BTreeMap<DocumentStatus, u64>,
}
