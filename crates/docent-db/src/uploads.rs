//! Upload-cache repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};

use docent_core::{Error, Result, UploadRecord, UploadStore};

/// PostgreSQL implementation of [`UploadStore`].
///
/// The `upload_cache` table keys on `(project, identity)`, so the upsert
/// replaces a stale handle in place; a re-uploaded document never grows
/// a second row.
pub struct PgUploadStore {
    pool: Pool<Postgres>,
}

impl PgUploadStore {
    /// Create a new PgUploadStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Count cached handles for a project. Used by admin tooling.
    pub async fn count(&self, project: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM upload_cache WHERE project = $1")
                .bind(project)
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(count)
    }
}

fn row_to_record(row: &sqlx::postgres::PgRow) -> UploadRecord {
    UploadRecord {
        project: row.get("project"),
        identity: row.get("identity"),
        handle: row.get("handle"),
        mime_type: row.get("mime_type"),
        verified_at: row.get::<DateTime<Utc>, _>("verified_at"),
    }
}

#[async_trait]
impl UploadStore for PgUploadStore {
    async fn get(&self, project: &str, identity: &str) -> Result<Option<UploadRecord>> {
        let row = sqlx::query(
            r#"
            SELECT project, identity, handle, mime_type, verified_at
            FROM upload_cache
            WHERE project = $1 AND identity = $2
            "#,
        )
        .bind(project)
        .bind(identity)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.as_ref().map(row_to_record))
    }

    async fn upsert(&self, record: &UploadRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO upload_cache (project, identity, handle, mime_type, verified_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (project, identity) DO UPDATE
            SET handle = EXCLUDED.handle,
                mime_type = EXCLUDED.mime_type,
                verified_at = EXCLUDED.verified_at
            "#,
        )
        .bind(&record.project)
        .bind(&record.identity)
        .bind(&record.handle)
        .bind(&record.mime_type)
        .bind(record.verified_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn delete(&self, project: &str, identity: &str) -> Result<()> {
        sqlx::query("DELETE FROM upload_cache WHERE project = $1 AND identity = $2")
            .bind(project)
            .bind(identity)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}
