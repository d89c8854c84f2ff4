use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::filter::sort_by_recency;
use super::{
    DocumentFilter, GroupField, RecordError, RecordPatch, RecordStore, Totals, UpdateOutcome,
};
use crate::document::{Document, RecordId};

/// Record store kept in process memory.
///
/// Each operation holds the lock for its whole read-check-write, which
/// makes `create_if_absent` and conditional `update` atomic. Clones share
/// the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    records: Arc<Mutex<HashMap<String, Document>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create_if_absent(&self, doc: &Document) -> Result<RecordId, RecordError> {
        let mut records = self.records.lock();
        if records.contains_key(&doc.doc_code) {
            return Err(RecordError::AlreadyExists(doc.doc_code.clone()));
        }
        records.insert(doc.doc_code.clone(), doc.clone());
        Ok(doc.id)
    }

    async fn find_one(&self, doc_code: &str) -> Result<Option<Document>, RecordError> {
        Ok(self.records.lock().get(doc_code).cloned())
    }

    async fn find_many(&self, filter: &DocumentFilter) -> Result<Vec<Document>, RecordError> {
        let mut docs: Vec<Document> = self
            .records
            .lock()
            .values()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect();
        sort_by_recency(&mut docs);
        Ok(docs)
    }

    async fn update(
        &self,
        doc_code: &str,
        expected_current_version: Option<u32>,
        patch: RecordPatch,
    ) -> Result<UpdateOutcome, RecordError> {
        let mut records = self.records.lock();
        let Some(current) = records.get_mut(doc_code) else {
            return Ok(UpdateOutcome::Missing);
        };
        if let Some(expected) = expected_current_version {
            if current.current_version != expected {
                return Ok(UpdateOutcome::Conflict);
            }
        }
        *current = patch.apply(current);
        Ok(UpdateOutcome::Applied(current.clone()))
    }

    async fn delete_one(&self, doc_code: &str) -> Result<Option<Document>, RecordError> {
        Ok(self.records.lock().remove(doc_code))
    }

    async fn count_by(&self, field: GroupField) -> Result<BTreeMap<String, u64>, RecordError> {
        let mut counts = BTreeMap::new();
        for doc in self.records.lock().values() {
            *counts.entry(field.key_of(doc)).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn totals(&self) -> Result<Totals, RecordError> {
        let records = self.records.lock();
        Ok(Totals {
            documents: records.len() as u64,
            versions: records.values().map(|d| d.versions.len() as u64).sum(),
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::document::{Category, DocumentStatus, Version};
    use crate::metadata::Metadata;
    use crate::store::BlobRef;

    fn doc(code: &str) -> Document {
        let v = Version::new(1, "a.pdf", BlobRef::new("x"), 1, "alice", Utc::now(), "");
        Document::new(code, "Title", "HR", Category::Sop, v, Metadata::new())
    }

    #[tokio::test]
    async fn test_create_if_absent_rejects_duplicates() {
        let store = MemoryRecordStore::new();
        let first = doc("HR-001");
        store.create_if_absent(&first).await.unwrap();

        let err = store.create_if_absent(&doc("HR-001")).await.unwrap_err();
        assert!(matches!(err, RecordError::AlreadyExists(code) if code == "HR-001"));
        assert_eq!(store.find_one("HR-001").await.unwrap(), Some(first));
    }

    #[tokio::test]
    async fn test_conditional_update() {
        let store = MemoryRecordStore::new();
        store.create_if_absent(&doc("HR-001")).await.unwrap();

        let patch = RecordPatch::SetStatus {
            status: DocumentStatus::Archived,
            updated_at: Utc::now(),
        };
        let outcome = store.update("HR-001", Some(7), patch.clone()).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::Conflict);

        let outcome = store.update("HR-001", Some(1), patch.clone()).await.unwrap();
        assert!(matches!(outcome, UpdateOutcome::Applied(d) if d.is_archived()));

        let outcome = store.update("NOPE", None, patch).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::Missing);
    }

    #[tokio::test]
    async fn test_counts() {
        let store = MemoryRecordStore::new();
        store.create_if_absent(&doc("A")).await.unwrap();
        store.create_if_absent(&doc("B")).await.unwrap();

        let by_department = store.count_by(GroupField::Department).await.unwrap();
        assert_eq!(by_department.get("HR"), Some(&2));
        let totals = store.totals().await.unwrap();
        assert_eq!(totals, Totals { documents: 2, versions: 2 });

        let removed = store.delete_one("A").await.unwrap();
        assert_eq!(removed.map(|d| d.doc_code), Some("A".to_string()));
        assert!(store.delete_one("A").await.unwrap().is_none());
        assert_eq!(store.len(), 1);
    }
}
