//! [`BlobStore`] backed by the SQLite + object storage `ObjectStore`.
//!
//! Handles are the BLAKE3 hex digest of the content. Identical uploads share
//! a handle; the object store reference-counts them, so every `put` must be
//! matched by exactly one `delete`.

use async_trait::async_trait;
use bytes::Bytes;

use object_store::{Hash, ObjectStore};

use crate::store::{BlobError, BlobRef, BlobStore};

fn parse_ref(blob: &BlobRef) -> Result<Hash, BlobError> {
    Hash::from_hex(blob.as_str()).map_err(|_| BlobError::InvalidRef(blob.clone()))
}

#[async_trait]
impl BlobStore for ObjectStore {
    async fn put(&self, data: Bytes) -> Result<BlobRef, BlobError> {
        let hash = ObjectStore::put(self, data)
            .await
            .map_err(anyhow::Error::from)?;
        Ok(BlobRef::new(hash.to_hex().to_string()))
    }

    async fn get(&self, blob: &BlobRef) -> Result<Bytes, BlobError> {
        let hash = parse_ref(blob)?;
        ObjectStore::get(self, &hash)
            .await
            .map_err(anyhow::Error::from)?
            .ok_or_else(|| BlobError::NotFound(blob.clone()))
    }

    async fn delete(&self, blob: &BlobRef) -> Result<(), BlobError> {
        let hash = parse_ref(blob)?;
        let released = ObjectStore::delete(self, &hash)
            .await
            .map_err(anyhow::Error::from)?;
        if released {
            Ok(())
        } else {
            Err(BlobError::NotFound(blob.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_object_store_as_blob_store() {
        let store = ObjectStore::new_ephemeral().await.unwrap();
        let blobs: &dyn BlobStore = &store;

        let blob = blobs.put(Bytes::from_static(b"leave policy v1")).await.unwrap();
        assert_eq!(blob.as_str().len(), 64);
        assert_eq!(blobs.get(&blob).await.unwrap().as_ref(), b"leave policy v1");

        blobs.delete(&blob).await.unwrap();
        assert!(matches!(blobs.get(&blob).await, Err(BlobError::NotFound(_))));
        assert!(matches!(blobs.delete(&blob).await, Err(BlobError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_invalid_ref() {
        let store = ObjectStore::new_ephemeral().await.unwrap();
        let bogus = BlobRef::new("not-a-hash");
        assert!(matches!(
            BlobStore::get(&store, &bogus).await,
            Err(BlobError::InvalidRef(_))
        ));
    }
}
