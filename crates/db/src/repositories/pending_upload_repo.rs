//! Repository for the `pending_uploads` retry queue.

use raidlog_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::models::pending_upload::{EnqueuePendingUpload, PendingUpload};

const COLUMNS: &str = "\
    id, file_path, event_name, channel_id, attempts, \
    next_retry_at, last_error, created_at";

pub struct PendingUploadRepo;

impl PendingUploadRepo {
    /// Insert or overwrite the queue entry for a file path.
    ///
    /// An existing entry keeps its id and `created_at`; event, channel,
    /// attempts, schedule and last error are replaced.
    pub async fn upsert(
        pool: &PgPool,
        input: &EnqueuePendingUpload,
    ) -> Result<PendingUpload, sqlx::Error> {
        let query = format!(
            "INSERT INTO pending_uploads \
                (file_path, event_name, channel_id, attempts, next_retry_at, last_error) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (file_path) DO UPDATE SET \
                event_name = EXCLUDED.event_name, \
                channel_id = EXCLUDED.channel_id, \
                attempts = EXCLUDED.attempts, \
                next_retry_at = EXCLUDED.next_retry_at, \
                last_error = EXCLUDED.last_error \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, PendingUpload>(&query)
            .bind(&input.file_path)
            .bind(&input.event_name)
            .bind(input.channel_id)
            .bind(input.attempts)
            .bind(input.next_retry_at)
            .bind(&input.last_error)
            .fetch_one(pool)
            .await
    }

    /// Entries whose retry time has come, earliest first.
    pub async fn list_due(
        pool: &PgPool,
        now: Timestamp,
    ) -> Result<Vec<PendingUpload>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM pending_uploads \
             WHERE next_retry_at <= $1 \
             ORDER BY next_retry_at ASC, id ASC"
        );
        sqlx::query_as::<_, PendingUpload>(&query)
            .bind(now)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_path(
        pool: &PgPool,
        file_path: &str,
    ) -> Result<Option<PendingUpload>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM pending_uploads WHERE file_path = $1");
        sqlx::query_as::<_, PendingUpload>(&query)
            .bind(file_path)
            .fetch_optional(pool)
            .await
    }

    pub async fn list_all(pool: &PgPool) -> Result<Vec<PendingUpload>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM pending_uploads ORDER BY next_retry_at ASC");
        sqlx::query_as::<_, PendingUpload>(&query)
            .fetch_all(pool)
            .await
    }

    /// Persist a failed attempt. Returns `false` if the entry is gone.
    pub async fn update_retry(
        pool: &PgPool,
        id: DbId,
        attempts: i32,
        next_retry_at: Timestamp,
        last_error: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE pending_uploads \
             SET attempts = $2, next_retry_at = $3, last_error = $4 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(attempts)
        .bind(next_retry_at)
        .bind(last_error)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM pending_uploads WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
