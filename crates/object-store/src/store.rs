//! Main ObjectStore API combining SQLite metadata with object storage.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::database::Database;
use crate::error::Result;
use crate::storage::{ObjectStoreConfig, Storage};
use crate::Hash;

/// ObjectStore provides content-addressed, reference-counted blob storage
/// with SQLite metadata and pluggable object storage backends.
///
/// Every `put` adds one reference to the content's hash; every `delete`
/// removes one. The bytes are only dropped from object storage once the
/// last reference is gone.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    db: Database,
    storage: Storage,
    // puts share the lock; the final release of a blob takes it exclusively
    gc: Arc<RwLock<()>>,
}

impl ObjectStore {
    /// Create a new ObjectStore with a file-based SQLite database.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    /// * `config` - Object storage configuration (S3, MinIO, local, or memory)
    pub async fn new(db_path: &Path, config: ObjectStoreConfig) -> Result<Self> {
        let db = Database::new(db_path).await?;
        let storage = Storage::new(config).await?;
        Ok(Self::from_parts(db, storage))
    }

    /// Create a new ObjectStore with an in-memory SQLite database.
    pub async fn in_memory(config: ObjectStoreConfig) -> Result<Self> {
        let db = Database::in_memory().await?;
        let storage = Storage::new(config).await?;
        Ok(Self::from_parts(db, storage))
    }

    /// Create a new ObjectStore backed by local filesystem.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    /// * `objects_path` - Directory for object storage
    pub async fn new_local(db_path: &Path, objects_path: &Path) -> Result<Self> {
        let config = ObjectStoreConfig::Local {
            path: objects_path.to_path_buf(),
        };
        Self::new(db_path, config).await
    }

    /// Create a new ObjectStore with S3/MinIO storage.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file
    /// * `endpoint` - S3 endpoint URL (e.g., "http://localhost:9000" for MinIO)
    /// * `access_key` - S3 access key ID
    /// * `secret_key` - S3 secret access key
    /// * `bucket` - S3 bucket name
    /// * `region` - Optional S3 region (defaults to "us-east-1")
    pub async fn new_s3(
        db_path: &Path,
        endpoint: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        region: Option<&str>,
    ) -> Result<Self> {
        let config = ObjectStoreConfig::S3 {
            endpoint: endpoint.to_string(),
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            bucket: bucket.to_string(),
            region: region.map(|s| s.to_string()),
        };
        Self::new(db_path, config).await
    }

    /// Create a fully ephemeral ObjectStore (in-memory DB + in-memory object storage).
    ///
    /// Data will be lost when the ObjectStore is dropped. Useful for testing.
    pub async fn new_ephemeral() -> Result<Self> {
        Self::in_memory(ObjectStoreConfig::Memory).await
    }

    fn from_parts(db: Database, storage: Storage) -> Self {
        Self {
            db,
            storage,
            gc: Arc::new(RwLock::new(())),
        }
    }

    /// Close the database connection pool.
    pub async fn close(&self) {
        self.db.close().await;
    }

    /// Store data and return its content hash.
    pub async fn put(&self, data: Bytes) -> Result<Hash> {
        let size = data.len();
        let hash = blake3::hash(&data);
        let hash_str = hash.to_hex().to_string();

        debug!(hash = %hash_str, size = size, "storing blob");

        let _guard = self.gc.read().await;
        self.storage.put_data(&hash_str, data).await?;
        let refs = self.db.retain_blob(&hash_str, size as i64).await?;

        info!(hash = %hash_str, size = size, refs = refs, "blob stored successfully");
        Ok(hash)
    }

    /// Retrieve blob data by hash.
    ///
    /// Returns `None` if the blob doesn't exist.
    pub async fn get(&self, hash: &Hash) -> Result<Option<Bytes>> {
        let hash_str = hash.to_hex().to_string();
        if !self.db.has_blob(&hash_str).await? {
            return Ok(None);
        }
        self.storage.get_data(&hash_str).await
    }

    /// Check if a blob exists in the store.
    pub async fn has(&self, hash: &Hash) -> Result<bool> {
        Ok(self.db.has_blob(&hash.to_hex().to_string()).await?)
    }

    /// Number of live references to a blob.
    pub async fn ref_count(&self, hash: &Hash) -> Result<u64> {
        let metadata = self.db.get_blob(&hash.to_hex().to_string()).await?;
        Ok(metadata.map(|m| m.ref_count.max(0) as u64).unwrap_or(0))
    }

    /// Drop one reference to a blob.
    ///
    /// Returns `true` if a reference existed and was released. The bytes are
    /// removed from object storage together with the last reference.
    pub async fn delete(&self, hash: &Hash) -> Result<bool> {
        let hash_str = hash.to_hex().to_string();

        let _guard = self.gc.write().await;
        let remaining = match self.db.release_blob(&hash_str).await? {
            Some(remaining) => remaining,
            None => return Ok(false),
        };

        if remaining > 0 {
            debug!(hash = %hash_str, refs = remaining, "blob reference released");
            return Ok(true);
        }

        self.storage.delete_data(&hash_str).await?;
        self.db.purge_blob(&hash_str).await?;

        info!(hash = %hash_str, "blob deleted");
        Ok(true)
    }

    /// List all blob hashes in the store.
    pub async fn list(&self) -> Result<Vec<Hash>> {
        let hash_strings = self.db.list_blobs().await?;
        let mut hashes = Vec::with_capacity(hash_strings.len());

        for s in hash_strings {
            match Hash::from_hex(&s) {
                Ok(h) => hashes.push(h),
                Err(_) => {
                    warn!(hash = %s, "invalid hash in database, skipping");
                }
            }
        }

        Ok(hashes)
    }

    /// Get the number of blobs in the store.
    pub async fn count(&self) -> Result<u64> {
        let count = self.db.count_blobs().await?;
        Ok(count as u64)
    }

    /// Get the total size of all blobs in the store.
    pub async fn total_size(&self) -> Result<u64> {
        let size = self.db.total_size().await?;
        Ok(size as u64)
    }

    /// Get the object storage configuration.
    pub fn storage_config(&self) -> &ObjectStoreConfig {
        self.storage.config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ephemeral_store() {
        let store = ObjectStore::new_ephemeral().await.unwrap();

        let data = Bytes::from_static(b"hello world");
        let hash = store.put(data.clone()).await.unwrap();

        assert!(store.has(&hash).await.unwrap());

        let retrieved = store.get(&hash).await.unwrap().unwrap();
        assert_eq!(retrieved, data);

        let list = store.list().await.unwrap();
        assert_eq!(list, vec![hash]);

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.total_size().await.unwrap(), data.len() as u64);

        assert!(store.delete(&hash).await.unwrap());
        assert!(!store.has(&hash).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_local_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("blobs.db");
        let objects_path = temp_dir.path().join("objects");
        let store = ObjectStore::new_local(&db_path, &objects_path).await.unwrap();

        let data = Bytes::from_static(b"test local storage");
        let hash = store.put(data.clone()).await.unwrap();

        assert!(db_path.exists());
        assert!(objects_path.join("data").join(hash.to_hex().to_string()).exists());

        let retrieved = store.get(&hash).await.unwrap().unwrap();
        assert_eq!(retrieved, data);
    }

    #[tokio::test]
    async fn test_identical_content_is_shared() {
        let store = ObjectStore::new_ephemeral().await.unwrap();

        let first = store.put(Bytes::from_static(b"same bytes")).await.unwrap();
        let second = store.put(Bytes::from_static(b"same bytes")).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.ref_count(&first).await.unwrap(), 2);

        // one reference gone, content still readable
        assert!(store.delete(&first).await.unwrap());
        assert_eq!(
            store.get(&first).await.unwrap().unwrap().as_ref(),
            b"same bytes"
        );

        assert!(store.delete(&first).await.unwrap());
        assert!(store.get(&first).await.unwrap().is_none());
        assert!(!store.delete(&first).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let store = ObjectStore::new_ephemeral().await.unwrap();
        let fake_hash = blake3::hash(b"this data was never stored");

        assert!(!store.has(&fake_hash).await.unwrap());
        assert!(store.get(&fake_hash).await.unwrap().is_none());
        assert!(!store.delete(&fake_hash).await.unwrap());
        assert_eq!(store.ref_count(&fake_hash).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_multiple_blobs() {
        let store = ObjectStore::new_ephemeral().await.unwrap();

        let blobs = [
            Bytes::from_static(b"first blob"),
            Bytes::from_static(b"second blob"),
            Bytes::from_static(b"third blob"),
        ];

        let mut hashes = Vec::new();
        for data in &blobs {
            hashes.push(store.put(data.clone()).await.unwrap());
        }

        assert_eq!(store.count().await.unwrap(), 3);

        assert!(store.delete(&hashes[1]).await.unwrap());
        assert_eq!(store.count().await.unwrap(), 2);
        assert!(!store.has(&hashes[1]).await.unwrap());

        assert!(store.has(&hashes[0]).await.unwrap());
        assert!(store.has(&hashes[2]).await.unwrap());
    }
}
