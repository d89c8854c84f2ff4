//! Core of the knowledge management store: document records, their
//! versions and metadata, the store interfaces, and the document service
//! that enforces every invariant over them.

pub mod blobs;
pub mod document;
pub mod metadata;
pub mod service;
pub mod store;

pub mod prelude {
    pub use crate::document::{Category, Document, DocumentStatus, RecordId, Version};
    pub use crate::metadata::{Metadata, MetadataValue};
    pub use crate::service::{
        DocumentError, DocumentService, DownloadedFile, FileContent, ServiceConfig, Statistics,
        UploadRequest,
    };
    pub use crate::store::{
        BlobRef, BlobStore, DocumentFilter, MemoryRecordStore, RecordStore,
    };
}
