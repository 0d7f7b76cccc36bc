//! Repository for the `uploads` table.

use raidlog_core::types::DbId;
use sqlx::PgPool;

use crate::models::upload::{CreateUpload, Upload};

/// Column list for `uploads` SELECT queries.
const COLUMNS: &str = "\
    id, event_name, source_ref, file_path, permalink, \
    boss_id, boss_name, success, created_at, enriched_at";

pub struct UploadRepo;

impl UploadRepo {
    /// Insert an upload unless one already exists for the same source.
    ///
    /// Returns the stored row and whether this call created it. A second
    /// call with the same `source_ref` leaves the existing row untouched.
    pub async fn insert_idempotent(
        pool: &PgPool,
        input: &CreateUpload,
    ) -> Result<(Upload, bool), sqlx::Error> {
        let query = format!(
            "INSERT INTO uploads \
                (event_name, source_ref, file_path, permalink, boss_id, boss_name, success) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (source_ref) DO NOTHING \
             RETURNING {COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, Upload>(&query)
            .bind(&input.event_name)
            .bind(&input.source_ref)
            .bind(&input.file_path)
            .bind(&input.permalink)
            .bind(input.boss_id)
            .bind(&input.boss_name)
            .bind(input.success)
            .fetch_optional(pool)
            .await?;

        match inserted {
            Some(upload) => Ok((upload, true)),
            None => {
                let existing = Self::find_by_source(pool, &input.source_ref)
                    .await?
                    .ok_or(sqlx::Error::RowNotFound)?;
                Ok((existing, false))
            }
        }
    }

    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Upload>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM uploads WHERE id = $1");
        sqlx::query_as::<_, Upload>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn find_by_source(
        pool: &PgPool,
        source_ref: &str,
    ) -> Result<Option<Upload>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM uploads WHERE source_ref = $1");
        sqlx::query_as::<_, Upload>(&query)
            .bind(source_ref)
            .fetch_optional(pool)
            .await
    }

    /// All uploads of an event, oldest first.
    pub async fn list_for_event(
        pool: &PgPool,
        event_name: &str,
    ) -> Result<Vec<Upload>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM uploads \
             WHERE event_name = $1 \
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, Upload>(&query)
            .bind(event_name)
            .fetch_all(pool)
            .await
    }

    /// Uploads of an event that were never enriched.
    ///
    /// An upload whose report produced zero rows still counts as enriched.
    pub async fn list_unenriched_for_event(
        pool: &PgPool,
        event_name: &str,
    ) -> Result<Vec<Upload>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM uploads \
             WHERE event_name = $1 AND enriched_at IS NULL \
             ORDER BY created_at ASC, id ASC"
        );
        sqlx::query_as::<_, Upload>(&query)
            .bind(event_name)
            .fetch_all(pool)
            .await
    }

    /// Attach a permalink learned after the row was created.
    ///
    /// An existing non-empty permalink is never overwritten; returns `None`
    /// in that case or when the row does not exist.
    pub async fn attach_permalink(
        pool: &PgPool,
        id: DbId,
        permalink: &str,
    ) -> Result<Option<Upload>, sqlx::Error> {
        let query = format!(
            "UPDATE uploads SET permalink = $2 \
             WHERE id = $1 AND (permalink IS NULL OR permalink = '') \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Upload>(&query)
            .bind(id)
            .bind(permalink)
            .fetch_optional(pool)
            .await
    }

    /// Delete an upload and, through the foreign key, its metrics.
    ///
    /// Returns `true` if a row was removed.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM uploads WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
