//! Tests for a document's full lifecycle against filesystem-backed content
//! storage.

use bytes::Bytes;
use common::prelude::*;
use object_store::ObjectStore;
use tempfile::TempDir;

async fn setup_test_env() -> (DocumentService<MemoryRecordStore, ObjectStore>, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let blobs = ObjectStore::new_local(
        &temp_dir.path().join("blobs.db"),
        &temp_dir.path().join("objects"),
    )
    .await
    .unwrap();
    let service = DocumentService::new(MemoryRecordStore::new(), blobs);
    (service, temp_dir)
}

#[tokio::test]
async fn test_document_lifecycle() {
    let (service, _temp) = setup_test_env().await;

    let metadata = Metadata::new()
        .with("owner", "hr-team")
        .with("keywords", vec!["leave", "annual"]);
    let doc = service
        .upload_document(
            UploadRequest::new(
                FileContent::new("leave.pdf", Bytes::from_static(b"%PDF-1.7 leave v1")),
                "HR-001",
                "Leave Policy",
                "HR",
                Category::Regulation,
                "alice",
            )
            .metadata(metadata)
            .description("initial release"),
        )
        .await
        .unwrap();
    assert_eq!(doc.current_version, 1);
    assert_eq!(doc.versions[0].file_size, 17);

    service
        .upload_new_version(
            "HR-001",
            FileContent::new("leave.pdf", "%PDF-1.7 leave v2"),
            "bob",
            "clarified carry-over rules",
        )
        .await
        .unwrap();

    let found = service
        .search(&DocumentFilter::new().keyword("annual"))
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].current_version, 2);

    let archived = service.archive_document("HR-001").await.unwrap();
    assert!(archived.is_archived());
    assert!(service.list_all(false).await.unwrap().is_empty());

    // archived documents stay downloadable
    let file = service.download_file("HR-001", Some(1)).await.unwrap();
    assert_eq!(file.content.as_ref(), b"%PDF-1.7 leave v1");

    service.restore_document("HR-001").await.unwrap();
    assert_eq!(service.list_all(false).await.unwrap().len(), 1);

    let stats = service.get_statistics().await.unwrap();
    assert_eq!(stats.total_documents, 1);
    assert_eq!(stats.total_versions, 2);

    assert!(service.delete_document("HR-001", true).await.unwrap());
    assert!(!service.delete_document("HR-001", true).await.unwrap());
    assert_eq!(service.blobs().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_content_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("blobs.db");
    let objects = temp_dir.path().join("objects");

    let blob = {
        let store = ObjectStore::new_local(&db_path, &objects).await.unwrap();
        let blob = BlobStore::put(&store, Bytes::from_static(b"training deck"))
            .await
            .unwrap();
        store.close().await;
        blob
    };

    let store = ObjectStore::new_local(&db_path, &objects).await.unwrap();
    let data = BlobStore::get(&store, &blob).await.unwrap();
    assert_eq!(data.as_ref(), b"training deck");
}
