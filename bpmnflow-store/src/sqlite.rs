use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::document::ProcessDocument;
use crate::error::StoreError;
use crate::ProcessStore;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS process_documents (
    process_name TEXT NOT NULL,
    process_id   TEXT NOT NULL,
    document     TEXT NOT NULL,
    saved_at     TEXT NOT NULL,
    PRIMARY KEY (process_name, process_id)
)
"#;

/// Sqlite-backed store. One row per main process instance; the document is
/// stored as JSON text.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn connect(db_path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePool::connect_with(options).await?;
        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self { pool })
    }

    fn row_to_document(row: SqliteRow) -> Result<ProcessDocument, StoreError> {
        let text: String = row.get("document");
        serde_json::from_str(&text).map_err(|e| StoreError::Deserialization(e.to_string()))
    }
}

#[async_trait]
impl ProcessStore for SqliteStore {
    async fn load(
        &self,
        process_name: &str,
        process_id: &str,
    ) -> Result<Option<ProcessDocument>, StoreError> {
        let row = sqlx::query(
            "SELECT document FROM process_documents WHERE process_name = ? AND process_id = ?",
        )
        .bind(process_name)
        .bind(process_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_document).transpose()
    }

    async fn load_all(&self, process_name: &str) -> Result<Vec<ProcessDocument>, StoreError> {
        let rows = sqlx::query(
            "SELECT document FROM process_documents WHERE process_name = ? ORDER BY process_id",
        )
        .bind(process_name)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_document).collect()
    }

    async fn persist(&self, doc: ProcessDocument) -> Result<(), StoreError> {
        let text =
            serde_json::to_string(&doc).map_err(|e| StoreError::Serialization(e.to_string()))?;
        let saved_at: DateTime<Utc> = doc.saved_at;
        sqlx::query(
            r#"
            INSERT INTO process_documents (process_name, process_id, document, saved_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (process_name, process_id) DO UPDATE
            SET document = excluded.document, saved_at = excluded.saved_at
            "#,
        )
        .bind(&doc.process_name)
        .bind(&doc.process_id)
        .bind(&text)
        .bind(saved_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        debug!(
            process_name = %doc.process_name,
            process_id = %doc.process_id,
            "checkpoint persisted"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}
