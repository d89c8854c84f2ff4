use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};

use common::document::{Category, Document, DocumentStatus, RecordId, Version};
use common::metadata::Metadata;
use common::store::{
    DocumentFilter, GroupField, RecordError, RecordPatch, RecordStore, StatusClause, Totals,
    UpdateOutcome,
};

use crate::database::Database;

const DOCUMENT_COLUMNS: &str = "doc_code, id, title, department, category, status, \
     current_version, versions, metadata, created_at, updated_at";

fn backend(err: sqlx::Error) -> RecordError {
    RecordError::Backend(err.into())
}

fn invalid(doc_code: &str, reason: impl ToString) -> RecordError {
    RecordError::InvalidRecord {
        doc_code: doc_code.to_string(),
        reason: reason.to_string(),
    }
}

/// Fixed-width RFC 3339, so text order is time order.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn group_column(field: GroupField) -> &'static str {
    match field {
        GroupField::Department => "department",
        GroupField::Category => "category",
        GroupField::Status => "status",
    }
}

#[async_trait]
impl RecordStore for Database {
    async fn create_if_absent(&self, doc: &Document) -> Result<RecordId, RecordError> {
        let versions = serde_json::to_string(&doc.versions)
            .map_err(|e| invalid(&doc.doc_code, e))?;
        let metadata = doc
            .metadata
            .to_json()
            .map_err(|e| invalid(&doc.doc_code, e))?;

        let result = sqlx::query(
            r#"
            INSERT INTO documents (
                doc_code, id, title, department, category, status,
                current_version, versions, metadata, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(doc_code) DO NOTHING
            "#,
        )
        .bind(&doc.doc_code)
        .bind(doc.id.to_string())
        .bind(&doc.title)
        .bind(&doc.department)
        .bind(doc.category.as_str())
        .bind(doc.status.as_str())
        .bind(doc.current_version as i64)
        .bind(versions)
        .bind(metadata)
        .bind(timestamp(&doc.created_at))
        .bind(timestamp(&doc.updated_at))
        .execute(&**self)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(RecordError::AlreadyExists(doc.doc_code.clone()));
        }
        Ok(doc.id)
    }

    async fn find_one(&self, doc_code: &str) -> Result<Option<Document>, RecordError> {
        let row = sqlx::query(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE doc_code = ?1"
        ))
        .bind(doc_code)
        .fetch_optional(&**self)
        .await
        .map_err(backend)?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn find_many(&self, filter: &DocumentFilter) -> Result<Vec<Document>, RecordError> {
        let mut query: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE 1 = 1"
        ));
        match filter.status_clause() {
            Some(StatusClause::Is(status)) => {
                query.push(" AND status = ").push_bind(status.as_str());
            }
            Some(StatusClause::IsNot(status)) => {
                query.push(" AND status != ").push_bind(status.as_str());
            }
            None => {}
        }
        if let Some(department) = &filter.department {
            query.push(" AND department = ").push_bind(department.clone());
        }
        if let Some(category) = filter.category {
            query.push(" AND category = ").push_bind(category.as_str());
        }
        query.push(" ORDER BY updated_at DESC, doc_code ASC");

        let rows = query.build().fetch_all(&**self).await.map_err(backend)?;

        let mut docs = Vec::with_capacity(rows.len());
        for row in &rows {
            let doc = row_to_document(row)?;
            // keyword matching spans JSON metadata, so it runs here
            if filter.matches(&doc) {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    async fn update(
        &self,
        doc_code: &str,
        expected_current_version: Option<u32>,
        patch: RecordPatch,
    ) -> Result<UpdateOutcome, RecordError> {
        let expected = expected_current_version.map(i64::from);

        let row = match &patch {
            RecordPatch::AppendVersion {
                version,
                updated_at,
            } => {
                let entry =
                    serde_json::to_string(version).map_err(|e| invalid(doc_code, e))?;
                sqlx::query(&format!(
                    r#"
                    UPDATE documents
                    SET versions = json_insert(versions, '$[#]', json(?1)),
                        current_version = ?2,
                        updated_at = ?3
                    WHERE doc_code = ?4 AND (?5 IS NULL OR current_version = ?5)
                    RETURNING {DOCUMENT_COLUMNS}
                    "#
                ))
                .bind(entry)
                .bind(version.version as i64)
                .bind(timestamp(updated_at))
                .bind(doc_code)
                .bind(expected)
                .fetch_optional(&**self)
                .await
                .map_err(backend)?
            }
            RecordPatch::SetStatus { status, updated_at } => sqlx::query(&format!(
                r#"
                UPDATE documents
                SET status = ?1, updated_at = ?2
                WHERE doc_code = ?3 AND (?4 IS NULL OR current_version = ?4)
                RETURNING {DOCUMENT_COLUMNS}
                "#
            ))
            .bind(status.as_str())
            .bind(timestamp(updated_at))
            .bind(doc_code)
            .bind(expected)
            .fetch_optional(&**self)
            .await
            .map_err(backend)?,
            RecordPatch::ReplaceMetadata {
                metadata,
                updated_at,
            } => {
                let metadata = metadata.to_json().map_err(|e| invalid(doc_code, e))?;
                sqlx::query(&format!(
                    r#"
                    UPDATE documents
                    SET metadata = ?1, updated_at = ?2
                    WHERE doc_code = ?3 AND (?4 IS NULL OR current_version = ?4)
                    RETURNING {DOCUMENT_COLUMNS}
                    "#
                ))
                .bind(metadata)
                .bind(timestamp(updated_at))
                .bind(doc_code)
                .bind(expected)
                .fetch_optional(&**self)
                .await
                .map_err(backend)?
            }
            RecordPatch::MergeMetadata {
                metadata,
                updated_at,
            } => return self.merge_metadata(doc_code, expected, metadata, updated_at).await,
        };

        match row {
            Some(row) => Ok(UpdateOutcome::Applied(row_to_document(&row)?)),
            None => self.miss(doc_code).await,
        }
    }

    async fn delete_one(&self, doc_code: &str) -> Result<Option<Document>, RecordError> {
        let row = sqlx::query(&format!(
            "DELETE FROM documents WHERE doc_code = ?1 RETURNING {DOCUMENT_COLUMNS}"
        ))
        .bind(doc_code)
        .fetch_optional(&**self)
        .await
        .map_err(backend)?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn count_by(&self, field: GroupField) -> Result<BTreeMap<String, u64>, RecordError> {
        let column = group_column(field);
        let rows = sqlx::query(&format!(
            "SELECT {column} AS key, COUNT(*) AS count FROM documents GROUP BY {column}"
        ))
        .fetch_all(&**self)
        .await
        .map_err(backend)?;

        Ok(rows
            .iter()
            .map(|row| (row.get::<String, _>("key"), row.get::<i64, _>("count") as u64))
            .collect())
    }

    async fn totals(&self) -> Result<Totals, RecordError> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS documents,
                   COALESCE(SUM(json_array_length(versions)), 0) AS versions
            FROM documents
            "#,
        )
        .fetch_one(&**self)
        .await
        .map_err(backend)?;

        Ok(Totals {
            documents: row.get::<i64, _>("documents") as u64,
            versions: row.get::<i64, _>("versions") as u64,
        })
    }
}

impl Database {
    /// A conditional update touched no row: tell a missing record from a
    /// version mismatch.
    async fn miss(&self, doc_code: &str) -> Result<UpdateOutcome, RecordError> {
        let exists = sqlx::query("SELECT 1 FROM documents WHERE doc_code = ?1")
            .bind(doc_code)
            .fetch_optional(&**self)
            .await
            .map_err(backend)?
            .is_some();

        Ok(if exists {
            UpdateOutcome::Conflict
        } else {
            UpdateOutcome::Missing
        })
    }

    /// Shallow merge, read and written under one write lock.
    ///
    /// SQLite's `json_patch` merges nested objects recursively, so the merge
    /// happens in Rust inside an immediate transaction. A transaction that
    /// is dropped before commit rolls back.
    async fn merge_metadata(
        &self,
        doc_code: &str,
        expected: Option<i64>,
        update: &Metadata,
        updated_at: &DateTime<Utc>,
    ) -> Result<UpdateOutcome, RecordError> {
        let mut tx = self.begin_with("BEGIN IMMEDIATE").await.map_err(backend)?;

        let outcome = merge_in_transaction(&mut tx, doc_code, expected, update, updated_at).await?;
        if matches!(outcome, UpdateOutcome::Applied(_)) {
            tx.commit().await.map_err(backend)?;
        }
        Ok(outcome)
    }
}

async fn merge_in_transaction(
    conn: &mut SqliteConnection,
    doc_code: &str,
    expected: Option<i64>,
    update: &Metadata,
    updated_at: &DateTime<Utc>,
) -> Result<UpdateOutcome, RecordError> {
    let row = sqlx::query("SELECT metadata, current_version FROM documents WHERE doc_code = ?1")
        .bind(doc_code)
        .fetch_optional(&mut *conn)
        .await
        .map_err(backend)?;

    let Some(row) = row else {
        return Ok(UpdateOutcome::Missing);
    };
    if let Some(expected) = expected {
        if row.get::<i64, _>("current_version") != expected {
            return Ok(UpdateOutcome::Conflict);
        }
    }

    let stored = Metadata::from_json(&row.get::<String, _>("metadata"))
        .map_err(|e| invalid(doc_code, e))?;
    let merged = stored
        .merge(update)
        .to_json()
        .map_err(|e| invalid(doc_code, e))?;

    let row = sqlx::query(&format!(
        r#"
        UPDATE documents
        SET metadata = ?1, updated_at = ?2
        WHERE doc_code = ?3
        RETURNING {DOCUMENT_COLUMNS}
        "#
    ))
    .bind(merged)
    .bind(timestamp(updated_at))
    .bind(doc_code)
    .fetch_one(&mut *conn)
    .await
    .map_err(backend)?;

    Ok(UpdateOutcome::Applied(row_to_document(&row)?))
}

fn parse_timestamp(doc_code: &str, value: &str) -> Result<DateTime<Utc>, RecordError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| invalid(doc_code, e))
}

fn row_to_document(row: &SqliteRow) -> Result<Document, RecordError> {
    let doc_code: String = row.get("doc_code");

    let id: RecordId = row
        .get::<String, _>("id")
        .parse()
        .map_err(|e| invalid(&doc_code, e))?;
    let category: Category = row
        .get::<String, _>("category")
        .parse()
        .map_err(|e| invalid(&doc_code, e))?;
    let status: DocumentStatus = row
        .get::<String, _>("status")
        .parse()
        .map_err(|e| invalid(&doc_code, e))?;
    let versions: Vec<Version> = serde_json::from_str(&row.get::<String, _>("versions"))
        .map_err(|e| invalid(&doc_code, e))?;
    let metadata = Metadata::from_json(&row.get::<String, _>("metadata"))
        .map_err(|e| invalid(&doc_code, e))?;
    let current_version = u32::try_from(row.get::<i64, _>("current_version"))
        .map_err(|e| invalid(&doc_code, e))?;
    let created_at = parse_timestamp(&doc_code, &row.get::<String, _>("created_at"))?;
    let updated_at = parse_timestamp(&doc_code, &row.get::<String, _>("updated_at"))?;

    Ok(Document {
        id,
        title: row.get("title"),
        department: row.get("department"),
        category,
        status,
        current_version,
        versions,
        metadata,
        created_at,
        updated_at,
        doc_code,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use common::document::{Category, DocumentStatus};
    use common::store::BlobRef;

    use super::*;

    async fn setup_test_db() -> Database {
        Database::in_memory().await.unwrap()
    }

    fn version(n: u32, at: DateTime<Utc>) -> Version {
        Version::new(
            n,
            format!("manual-v{n}.pdf"),
            BlobRef::new(format!("{n:064x}")),
            128,
            "alice",
            at,
            "",
        )
    }

    fn document(code: &str, department: &str, category: Category) -> Document {
        Document::new(
            code,
            format!("{code} title"),
            department,
            category,
            version(1, Utc::now()),
            Metadata::new().with("owner", "qa"),
        )
    }

    #[tokio::test]
    async fn test_create_and_find_round_trip() {
        let db = setup_test_db().await;
        let doc = document("QA-001", "QA", Category::Sop);

        let id = db.create_if_absent(&doc).await.unwrap();
        assert_eq!(id, doc.id);

        let found = db.find_one("QA-001").await.unwrap().unwrap();
        assert_eq!(found, doc);
        assert!(db.find_one("QA-404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_duplicate_code() {
        let db = setup_test_db().await;
        let doc = document("QA-001", "QA", Category::Sop);
        db.create_if_absent(&doc).await.unwrap();

        let err = db
            .create_if_absent(&document("QA-001", "HR", Category::Policy))
            .await
            .unwrap_err();
        assert!(matches!(err, RecordError::AlreadyExists(code) if code == "QA-001"));
        assert_eq!(db.find_one("QA-001").await.unwrap().unwrap(), doc);
    }

    #[tokio::test]
    async fn test_conditional_append() {
        let db = setup_test_db().await;
        let doc = document("QA-001", "QA", Category::Sop);
        db.create_if_absent(&doc).await.unwrap();

        let at = doc.created_at + Duration::seconds(1);
        let patch = RecordPatch::AppendVersion {
            version: version(2, at),
            updated_at: at,
        };

        let stale = db.update("QA-001", Some(5), patch.clone()).await.unwrap();
        assert_eq!(stale, UpdateOutcome::Conflict);

        let UpdateOutcome::Applied(updated) =
            db.update("QA-001", Some(1), patch.clone()).await.unwrap()
        else {
            panic!("append should apply");
        };
        assert_eq!(updated.current_version, 2);
        assert_eq!(updated.versions.len(), 2);
        assert_eq!(updated.updated_at, at);
        updated.check_invariants().unwrap();

        // the same expectation cannot win twice
        let again = db.update("QA-001", Some(1), patch.clone()).await.unwrap();
        assert_eq!(again, UpdateOutcome::Conflict);

        let missing = db.update("QA-404", Some(1), patch).await.unwrap();
        assert_eq!(missing, UpdateOutcome::Missing);
    }

    #[tokio::test]
    async fn test_metadata_merge_is_shallow() {
        let db = setup_test_db().await;
        let mut doc = document("HR-001", "HR", Category::Policy);
        doc.metadata = Metadata::new()
            .with("owner", "hr")
            .with("review", Metadata::new().with("cycle", "yearly").with("by", "legal"));
        db.create_if_absent(&doc).await.unwrap();

        let update = Metadata::new().with("review", Metadata::new().with("cycle", "monthly"));
        let UpdateOutcome::Applied(merged) = db
            .update(
                "HR-001",
                None,
                RecordPatch::MergeMetadata {
                    metadata: update,
                    updated_at: Utc::now(),
                },
            )
            .await
            .unwrap()
        else {
            panic!("merge should apply");
        };

        assert!(merged.metadata.contains_key("owner"));
        let Some(common::metadata::MetadataValue::Map(review)) = merged.metadata.get("review")
        else {
            panic!("review should stay a map");
        };
        assert_eq!(review.len(), 1);

        let missing = db
            .update(
                "HR-404",
                None,
                RecordPatch::MergeMetadata {
                    metadata: Metadata::new(),
                    updated_at: Utc::now(),
                },
            )
            .await
            .unwrap();
        assert_eq!(missing, UpdateOutcome::Missing);
    }

    #[tokio::test]
    async fn test_unfinished_merge_leaves_connection_usable() {
        // one pooled connection: a transaction left open would block every
        // write that follows
        let db = setup_test_db().await;
        db.create_if_absent(&document("HR-001", "HR", Category::Policy))
            .await
            .unwrap();
        let merge = |value: &str| RecordPatch::MergeMetadata {
            metadata: Metadata::new().with("owner", value),
            updated_at: Utc::now(),
        };

        let conflict = db.update("HR-001", Some(7), merge("x")).await.unwrap();
        assert_eq!(conflict, UpdateOutcome::Conflict);

        let abandoned = db.update("HR-001", Some(1), merge("abandoned"));
        let _ = tokio::time::timeout(std::time::Duration::ZERO, abandoned).await;

        let UpdateOutcome::Applied(doc) = db.update("HR-001", Some(1), merge("hr")).await.unwrap()
        else {
            panic!("merge should apply");
        };
        assert_eq!(doc.metadata.get("owner").and_then(|v| v.as_str()), Some("hr"));

        db.update(
            "HR-001",
            None,
            RecordPatch::SetStatus {
                status: DocumentStatus::Archived,
                updated_at: Utc::now(),
            },
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_find_many_filters_and_order() {
        let db = setup_test_db().await;
        let base = Utc::now();
        for (i, (code, department, category)) in [
            ("HR-001", "HR", Category::Policy),
            ("HR-002", "HR", Category::Regulation),
            ("IT-001", "IT", Category::Policy),
        ]
        .into_iter()
        .enumerate()
        {
            let mut doc = document(code, department, category);
            doc.updated_at = base + Duration::seconds(i as i64);
            db.create_if_absent(&doc).await.unwrap();
        }
        db.update(
            "HR-002",
            None,
            RecordPatch::SetStatus {
                status: DocumentStatus::Archived,
                updated_at: base + Duration::seconds(10),
            },
        )
        .await
        .unwrap();

        let codes = |docs: Vec<Document>| docs.into_iter().map(|d| d.doc_code).collect::<Vec<_>>();

        let visible = db.find_many(&DocumentFilter::new()).await.unwrap();
        assert_eq!(codes(visible), vec!["IT-001", "HR-001"]);

        let all = db
            .find_many(&DocumentFilter::new().include_archived(true))
            .await
            .unwrap();
        assert_eq!(codes(all), vec!["HR-002", "IT-001", "HR-001"]);

        let hr_policies = db
            .find_many(&DocumentFilter::new().department("HR").category(Category::Policy))
            .await
            .unwrap();
        assert_eq!(codes(hr_policies), vec!["HR-001"]);

        let by_keyword = db
            .find_many(&DocumentFilter::new().keyword("it-0"))
            .await
            .unwrap();
        assert_eq!(codes(by_keyword), vec!["IT-001"]);
    }

    #[tokio::test]
    async fn test_counts_and_totals() {
        let db = setup_test_db().await;
        db.create_if_absent(&document("HR-001", "HR", Category::Policy))
            .await
            .unwrap();
        db.create_if_absent(&document("IT-001", "IT", Category::Policy))
            .await
            .unwrap();
        db.update(
            "IT-001",
            Some(1),
            RecordPatch::AppendVersion {
                version: version(2, Utc::now()),
                updated_at: Utc::now(),
            },
        )
        .await
        .unwrap();

        let by_category = db.count_by(GroupField::Category).await.unwrap();
        assert_eq!(by_category.get("policy"), Some(&2));
        let by_department = db.count_by(GroupField::Department).await.unwrap();
        assert_eq!(by_department.len(), 2);

        assert_eq!(
            db.totals().await.unwrap(),
            Totals {
                documents: 2,
                versions: 3
            }
        );

        let removed = db.delete_one("HR-001").await.unwrap().unwrap();
        assert_eq!(removed.doc_code, "HR-001");
        assert!(removed.check_invariants().is_ok());
        assert!(db.delete_one("HR-001").await.unwrap().is_none());
        assert_eq!(
            db.totals().await.unwrap(),
            Totals {
                documents: 1,
                versions: 2
            }
        );
    }

    #[tokio::test]
    async fn test_empty_totals() {
        let db = setup_test_db().await;
        assert_eq!(db.totals().await.unwrap(), Totals::default());
        assert!(db.count_by(GroupField::Status).await.unwrap().is_empty());
    }
}
