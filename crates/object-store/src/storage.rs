//! Object storage backends for blob data.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore as _, PutPayload};
use tracing::debug;

use crate::error::{ObjectStoreError, Result};

const DATA_PREFIX: &str = "data";

/// Where blob bytes are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectStoreConfig {
    /// Local filesystem directory
    Local { path: PathBuf },
    /// S3-compatible storage (AWS, MinIO, ...)
    S3 {
        endpoint: String,
        access_key: String,
        secret_key: String,
        bucket: String,
        region: Option<String>,
    },
    /// Process memory, lost on drop
    Memory,
}

/// Thin wrapper over an `object_store` backend that lays blobs out as
/// `data/<hash>`.
#[derive(Debug, Clone)]
pub struct Storage {
    inner: Arc<dyn object_store::ObjectStore>,
    config: ObjectStoreConfig,
}

impl Storage {
    pub async fn new(config: ObjectStoreConfig) -> Result<Self> {
        let inner: Arc<dyn object_store::ObjectStore> = match &config {
            ObjectStoreConfig::Local { path } => {
                tokio::fs::create_dir_all(path).await?;
                Arc::new(LocalFileSystem::new_with_prefix(path)?)
            }
            ObjectStoreConfig::S3 {
                endpoint,
                access_key,
                secret_key,
                bucket,
                region,
            } => {
                if bucket.is_empty() {
                    return Err(ObjectStoreError::Config("S3 bucket name is empty".into()));
                }
                let s3 = AmazonS3Builder::new()
                    .with_endpoint(endpoint)
                    .with_access_key_id(access_key)
                    .with_secret_access_key(secret_key)
                    .with_bucket_name(bucket)
                    .with_region(region.as_deref().unwrap_or("us-east-1"))
                    .with_allow_http(endpoint.starts_with("http://"))
                    .build()?;
                Arc::new(s3)
            }
            ObjectStoreConfig::Memory => Arc::new(InMemory::new()),
        };

        Ok(Self { inner, config })
    }

    pub fn config(&self) -> &ObjectStoreConfig {
        &self.config
    }

    fn data_path(hash: &str) -> ObjectPath {
        ObjectPath::from(format!("{DATA_PREFIX}/{hash}"))
    }

    pub async fn put_data(&self, hash: &str, data: Bytes) -> Result<()> {
        debug!(hash = %hash, size = data.len(), "writing object");
        self.inner
            .put(&Self::data_path(hash), PutPayload::from(data))
            .await?;
        Ok(())
    }

    /// Read blob bytes, `None` if the object does not exist.
    pub async fn get_data(&self, hash: &str) -> Result<Option<Bytes>> {
        match self.inner.get(&Self::data_path(hash)).await {
            Ok(result) => Ok(Some(result.bytes().await?)),
            Err(object_store::Error::NotFound { .. }) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete blob bytes. Deleting a missing object is not an error.
    pub async fn delete_data(&self, hash: &str) -> Result<()> {
        match self.inner.delete(&Self::data_path(hash)).await {
            Ok(()) | Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// List the hashes of every object under the data prefix.
    pub async fn list_data_hashes(&self) -> Result<Vec<String>> {
        let prefix = ObjectPath::from(DATA_PREFIX);
        let metas: Vec<_> = self.inner.list(Some(&prefix)).try_collect().await?;
        Ok(metas
            .into_iter()
            .filter_map(|meta| meta.location.filename().map(str::to_string))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_roundtrip_and_missing() {
        let storage = Storage::new(ObjectStoreConfig::Memory).await.unwrap();

        storage
            .put_data("aa11", Bytes::from_static(b"payload"))
            .await
            .unwrap();
        let data = storage.get_data("aa11").await.unwrap().unwrap();
        assert_eq!(data.as_ref(), b"payload");

        assert!(storage.get_data("missing").await.unwrap().is_none());
        storage.delete_data("missing").await.unwrap();

        storage.delete_data("aa11").await.unwrap();
        assert!(storage.get_data("aa11").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_local_layout() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("objects");
        let storage = Storage::new(ObjectStoreConfig::Local { path: root.clone() })
            .await
            .unwrap();

        storage
            .put_data("bb22", Bytes::from_static(b"on disk"))
            .await
            .unwrap();

        assert!(root.join("data").join("bb22").exists());
        assert_eq!(storage.list_data_hashes().await.unwrap(), vec!["bb22"]);
    }
}
