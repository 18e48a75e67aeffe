//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::models::CompletedFileRow;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS completed_files (
    file_id      TEXT PRIMARY KEY,
    file_name    TEXT NOT NULL,
    file_size    INTEGER NOT NULL,
    storage_key  TEXT NOT NULL,
    download_url TEXT,
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_completed_files_created_at
    ON completed_files (created_at);
";

/// Store for completed file records.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a completed file record. Fails with `AlreadyExists` if a record
    /// for the file ID is already present.
    async fn put_file(&self, row: &CompletedFileRow) -> MetadataResult<()>;

    /// Fetch a completed file record by ID.
    async fn get_file(&self, file_id: Uuid) -> MetadataResult<Option<CompletedFileRow>>;

    /// Run database migrations.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Create a new SQLite store and run migrations.
    pub async fn new(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection avoids
            // persistent "database is locked" failures under server concurrency.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;

        Ok(store)
    }

    fn row_from_sqlite(row: &sqlx::sqlite::SqliteRow) -> MetadataResult<CompletedFileRow> {
        let file_id: String = row.try_get("file_id")?;
        let created_at: String = row.try_get("created_at")?;

        Ok(CompletedFileRow {
            file_id: Uuid::parse_str(&file_id)
                .map_err(|e| MetadataError::Internal(format!("corrupt file_id column: {e}")))?,
            file_name: row.try_get("file_name")?,
            file_size: row.try_get("file_size")?,
            storage_key: row.try_get("storage_key")?,
            download_url: row.try_get("download_url")?,
            created_at: OffsetDateTime::parse(&created_at, &Rfc3339)
                .map_err(|e| MetadataError::Internal(format!("corrupt created_at column: {e}")))?,
        })
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn put_file(&self, row: &CompletedFileRow) -> MetadataResult<()> {
        let created_at = row
            .created_at
            .format(&Rfc3339)
            .map_err(|e| MetadataError::Internal(format!("unformattable timestamp: {e}")))?;

        sqlx::query(
            "INSERT INTO completed_files \
             (file_id, file_name, file_size, storage_key, download_url, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(row.file_id.to_string())
        .bind(&row.file_name)
        .bind(row.file_size)
        .bind(&row.storage_key)
        .bind(&row.download_url)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error()
                .is_some_and(|db| db.is_unique_violation())
            {
                MetadataError::AlreadyExists(format!("file_id {} already exists", row.file_id))
            } else {
                MetadataError::Database(e)
            }
        })?;

        tracing::debug!(
            file_id = %row.file_id,
            file_size = row.file_size,
            "completed file recorded"
        );

        Ok(())
    }

    async fn get_file(&self, file_id: Uuid) -> MetadataResult<Option<CompletedFileRow>> {
        let row = sqlx::query(
            "SELECT file_id, file_name, file_size, storage_key, download_url, created_at \
             FROM completed_files WHERE file_id = ?",
        )
        .bind(file_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::row_from_sqlite).transpose()
    }

    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        tracing::debug!("completed_files schema ensured");
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
