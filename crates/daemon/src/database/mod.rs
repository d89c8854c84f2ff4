//! SQLite record store for documents.
//!
//! One row per document. Scalar fields get their own columns so filters and
//! counts run in SQL; the version list and metadata are JSON text.

mod document_queries;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use url::Url;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS documents (
        doc_code TEXT PRIMARY KEY,
        id TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        department TEXT NOT NULL,
        category TEXT NOT NULL,
        status TEXT NOT NULL,
        current_version INTEGER NOT NULL,
        versions TEXT NOT NULL,
        metadata TEXT NOT NULL DEFAULT '{}',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_documents_department ON documents(department)",
    "CREATE INDEX IF NOT EXISTS idx_documents_category ON documents(category)",
    "CREATE INDEX IF NOT EXISTS idx_documents_status ON documents(status)",
    "CREATE INDEX IF NOT EXISTS idx_documents_dept_cat_status ON documents(department, category, status)",
    "CREATE INDEX IF NOT EXISTS idx_documents_updated_at ON documents(updated_at)",
];

#[derive(Debug, Clone)]
pub struct Database(SqlitePool);

impl std::ops::Deref for Database {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Database {
    /// Connect to the database at `url` (`sqlite://<path>` or
    /// `sqlite::memory:`), creating it if needed, and run migrations.
    pub async fn connect(url: &Url) -> Result<Self, DatabaseSetupError> {
        let options = SqliteConnectOptions::from_str(url.as_str())
            .map_err(DatabaseSetupError::InvalidUrl)?
            .create_if_missing(true)
            .foreign_keys(true);

        // every connection to `:memory:` is its own database
        let max_connections = if url.as_str().contains(":memory:") {
            1
        } else {
            5
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(DatabaseSetupError::Connect)?;

        let db = Self(pool);
        db.run_migrations().await?;
        tracing::debug!(url = %url, "document database ready");
        Ok(db)
    }

    pub async fn in_memory() -> Result<Self, DatabaseSetupError> {
        let url = Url::parse("sqlite::memory:").map_err(|_| DatabaseSetupError::InvalidMemoryUrl)?;
        Self::connect(&url).await
    }

    pub async fn close(&self) {
        self.0.close().await;
    }

    async fn run_migrations(&self) -> Result<(), DatabaseSetupError> {
        for statement in MIGRATIONS {
            sqlx::query(statement)
                .execute(&self.0)
                .await
                .map_err(DatabaseSetupError::Migration)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DatabaseSetupError {
    #[error("invalid database url: {0}")]
    InvalidUrl(sqlx::Error),
    #[error("invalid in-memory database url")]
    InvalidMemoryUrl,
    #[error("failed to connect to database: {0}")]
    Connect(sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(sqlx::Error),
}
