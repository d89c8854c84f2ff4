//! SQLite database for blob metadata.
//!
//! This module manages its own SQLite connection pool, separate from the
//! document record database. The schema stores only metadata and reference
//! counts - all blob data lives in object storage.

use std::path::Path;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use thiserror::Error;
use tracing::info;

/// Metadata row for a stored blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMetadata {
    pub hash: String,
    pub size: i64,
    pub ref_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Database connection pool for blob metadata.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl std::ops::Deref for Database {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.pool
    }
}

/// Errors that can occur when setting up or querying the database.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),
}

impl Database {
    /// Create a new database connection with a file-based SQLite database.
    ///
    /// The database file will be created if it doesn't exist.
    /// Migrations are run automatically.
    pub async fn new(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Migration(format!("Failed to create database directory: {}", e))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        info!("Blob database initialized at {:?}", path);
        Ok(db)
    }

    /// Create a new in-memory database.
    pub async fn in_memory() -> Result<Self, DatabaseError> {
        let options = SqliteConnectOptions::new()
            .filename(":memory:")
            .create_if_missing(true);

        // a second connection would open a second, empty in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        info!("Blob database initialized in-memory");
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS blobs (
                hash TEXT PRIMARY KEY,
                size INTEGER NOT NULL,
                ref_count INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Close the connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Record a new reference to a blob, inserting the row if needed.
    ///
    /// Returns the reference count after the increment.
    pub async fn retain_blob(&self, hash: &str, size: i64) -> Result<i64, DatabaseError> {
        let now = Utc::now().timestamp();
        let row = sqlx::query(
            r#"
            INSERT INTO blobs (hash, size, ref_count, created_at, updated_at)
            VALUES (?1, ?2, 1, ?3, ?3)
            ON CONFLICT(hash) DO UPDATE
                SET ref_count = ref_count + 1, updated_at = excluded.updated_at
            RETURNING ref_count
            "#,
        )
        .bind(hash)
        .bind(size)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("ref_count"))
    }

    /// Drop one reference to a blob.
    ///
    /// Returns the remaining reference count, or `None` if the blob is unknown.
    pub async fn release_blob(&self, hash: &str) -> Result<Option<i64>, DatabaseError> {
        let now = Utc::now().timestamp();
        let row = sqlx::query(
            r#"
            UPDATE blobs
            SET ref_count = ref_count - 1, updated_at = ?1
            WHERE hash = ?2 AND ref_count > 0
            RETURNING ref_count
            "#,
        )
        .bind(now)
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("ref_count")))
    }

    /// Remove the metadata row of a blob that has no references left.
    pub async fn purge_blob(&self, hash: &str) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM blobs WHERE hash = ?1 AND ref_count <= 0")
            .bind(hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn get_blob(&self, hash: &str) -> Result<Option<BlobMetadata>, DatabaseError> {
        let row = sqlx::query(
            r#"
            SELECT hash, size, ref_count, created_at, updated_at
            FROM blobs
            WHERE hash = ?1
            "#,
        )
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| BlobMetadata {
            hash: r.get("hash"),
            size: r.get("size"),
            ref_count: r.get("ref_count"),
            created_at: r.get("created_at"),
            updated_at: r.get("updated_at"),
        }))
    }

    pub async fn has_blob(&self, hash: &str) -> Result<bool, DatabaseError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM blobs WHERE hash = ?1 AND ref_count > 0")
            .bind(hash)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get::<i64, _>("count") > 0)
    }

    pub async fn list_blobs(&self) -> Result<Vec<String>, DatabaseError> {
        let rows = sqlx::query("SELECT hash FROM blobs WHERE ref_count > 0 ORDER BY created_at ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(|r| r.get("hash")).collect())
    }

    pub async fn count_blobs(&self) -> Result<i64, DatabaseError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM blobs WHERE ref_count > 0")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }

    pub async fn total_size(&self) -> Result<i64, DatabaseError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(size), 0) AS total FROM blobs WHERE ref_count > 0",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("total"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::in_memory().await.unwrap();
        assert_eq!(db.count_blobs().await.unwrap(), 0);
        assert_eq!(db.total_size().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let db = Database::in_memory().await.unwrap();
        db.run_migrations().await.unwrap();
    }

    #[tokio::test]
    async fn test_reference_counting() {
        let db = Database::in_memory().await.unwrap();

        assert_eq!(db.retain_blob("abc", 10).await.unwrap(), 1);
        assert_eq!(db.retain_blob("abc", 10).await.unwrap(), 2);
        assert_eq!(db.count_blobs().await.unwrap(), 1);

        assert_eq!(db.release_blob("abc").await.unwrap(), Some(1));
        // still referenced, nothing to purge
        assert!(!db.purge_blob("abc").await.unwrap());
        assert_eq!(db.release_blob("abc").await.unwrap(), Some(0));
        assert!(!db.has_blob("abc").await.unwrap());
        assert!(db.purge_blob("abc").await.unwrap());

        assert!(db.get_blob("abc").await.unwrap().is_none());
        assert_eq!(db.release_blob("abc").await.unwrap(), None);
    }
}
