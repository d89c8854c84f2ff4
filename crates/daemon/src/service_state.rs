use url::Url;

use common::service::{DocumentService, ServiceConfig};
use object_store::{ObjectStore, ObjectStoreConfig, ObjectStoreError};

use crate::database::{Database, DatabaseSetupError};
use crate::state::{AppState, BlobStoreConfig, StateError};

/// The document service over the SQLite record store and the object store.
pub type Documents = DocumentService<Database, ObjectStore>;

/// Open stores plus the service built on them
#[derive(Debug, Clone)]
pub struct State {
    documents: Documents,
}

impl State {
    pub async fn open(app: &AppState) -> Result<Self, StateSetupError> {
        let service_config = app.config.service_config();

        let (database, blobs) = match &app.config.blob_store {
            BlobStoreConfig::Memory => {
                tracing::warn!("memory blob store configured; nothing will be persisted");
                (Database::in_memory().await?, ObjectStore::new_ephemeral().await?)
            }
            BlobStoreConfig::Filesystem { .. } => {
                let database = Self::open_database(app).await?;
                let objects_path = app.objects_path();
                tracing::debug!(path = %objects_path.display(), "using filesystem blob store");
                let blobs = ObjectStore::new_local(&app.blobs_db_path, &objects_path).await?;
                (database, blobs)
            }
            BlobStoreConfig::S3 { url } => {
                let database = Self::open_database(app).await?;
                let location = BlobStoreConfig::parse_s3_url(url)?;
                tracing::debug!(endpoint = %location.endpoint, bucket = %location.bucket, "using s3 blob store");
                let config = ObjectStoreConfig::S3 {
                    endpoint: location.endpoint,
                    access_key: location.access_key,
                    secret_key: location.secret_key,
                    bucket: location.bucket,
                    region: None,
                };
                let blobs = ObjectStore::new(&app.blobs_db_path, config).await?;
                (database, blobs)
            }
        };

        Ok(Self::from_parts(database, blobs, service_config))
    }

    /// Fully in-memory state.
    pub async fn ephemeral(config: ServiceConfig) -> Result<Self, StateSetupError> {
        let database = Database::in_memory().await?;
        let blobs = ObjectStore::new_ephemeral().await?;
        Ok(Self::from_parts(database, blobs, config))
    }

    fn from_parts(database: Database, blobs: ObjectStore, config: ServiceConfig) -> Self {
        Self {
            documents: DocumentService::with_config(database, blobs, config),
        }
    }

    async fn open_database(app: &AppState) -> Result<Database, StateSetupError> {
        let url = Url::parse(&format!("sqlite://{}", app.db_path.display()))
            .map_err(|_| StateSetupError::InvalidDatabaseUrl)?;
        Ok(Database::connect(&url).await?)
    }

    pub fn documents(&self) -> &Documents {
        &self.documents
    }

    pub fn database(&self) -> &Database {
        self.documents.records()
    }

    pub async fn close(&self) {
        self.documents.records().close().await;
        self.documents.blobs().close().await;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("invalid database url")]
    InvalidDatabaseUrl,
    #[error("database setup error: {0}")]
    Database(#[from] DatabaseSetupError),
    #[error("blob store error: {0}")]
    BlobStore(#[from] ObjectStoreError),
    #[error(transparent)]
    Config(#[from] StateError),
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use common::document::Category;
    use common::service::{FileContent, UploadRequest};

    use super::*;
    use crate::state::AppConfig;

    #[tokio::test]
    async fn test_open_filesystem_state() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let app = AppState::init(Some(temp_dir.path().join("km")), None).unwrap();

        let state = State::open(&app).await.unwrap();
        state
            .documents()
            .upload_document(UploadRequest::new(
                FileContent::new("guide.md", Bytes::from_static(b"# guide")),
                "TR-001",
                "Onboarding Guide",
                "Training",
                Category::Training,
                "alice",
            ))
            .await
            .unwrap();
        state.close().await;

        assert!(app.db_path.exists());
        assert!(app.blobs_db_path.exists());

        // reopen and read back
        let state = State::open(&app).await.unwrap();
        let file = state
            .documents()
            .download_file("TR-001", None)
            .await
            .unwrap();
        assert_eq!(file.content.as_ref(), b"# guide");
    }

    #[tokio::test]
    async fn test_open_memory_state() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = AppConfig {
            blob_store: BlobStoreConfig::Memory,
            ..AppConfig::default()
        };
        let app = AppState::init(Some(temp_dir.path().join("km")), Some(config)).unwrap();

        let state = State::open(&app).await.unwrap();
        assert!(state.documents().list_all(true).await.unwrap().is_empty());
        assert!(!app.db_path.exists());
    }
}
