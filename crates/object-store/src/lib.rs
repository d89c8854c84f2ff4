//! SQLite + Object Storage Blob Store
//!
//! This crate stores document content in pluggable object storage
//! (S3/MinIO/local filesystem/memory) and keeps reference-counted metadata
//! for every blob in SQLite.
//!
//! # Features
//!
//! - Content-addressed storage using BLAKE3 hashes
//! - Reference counting, so identical uploads share one object and deleting
//!   one reference never removes content another reference still needs
//! - SQLite for fast metadata queries
//! - Multiple storage backends: S3, MinIO, local filesystem, in-memory
//!
//! # Example
//!
//! ```rust,no_run
//! use km_object_store::ObjectStore;
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), km_object_store::ObjectStoreError> {
//! let store = ObjectStore::new_local(
//!     Path::new("/tmp/km/blobs.db"),
//!     Path::new("/tmp/km/objects"),
//! )
//! .await?;
//!
//! let hash = store.put(b"hello world".to_vec().into()).await?;
//! let data = store.get(&hash).await?.unwrap();
//! assert_eq!(data.as_ref(), b"hello world");
//! # Ok(())
//! # }
//! ```

mod database;
mod error;
mod storage;
mod store;

pub use database::{BlobMetadata, Database, DatabaseError};
pub use error::{ObjectStoreError, Result};
pub use storage::{ObjectStoreConfig, Storage};
pub use store::ObjectStore;

/// Content hash used to address blobs.
pub use blake3::Hash;
