//! Repository for the `metrics` table.

use raidlog_core::types::DbId;
use sqlx::PgPool;

use crate::models::metric::{Metric, NewMetric};

const COLUMNS: &str = "id, upload_id, boss_name, actor, metric_key, value";

pub struct MetricRepo;

impl MetricRepo {
    /// Replace every metric row of an upload in one transaction and mark
    /// the upload enriched.
    ///
    /// Readers never observe a mix of old and new rows. Returns the number
    /// of rows inserted.
    pub async fn replace_for_upload(
        pool: &PgPool,
        upload_id: DbId,
        boss_name: &str,
        rows: &[NewMetric],
    ) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM metrics WHERE upload_id = $1")
            .bind(upload_id)
            .execute(&mut *tx)
            .await?;

        let mut inserted = 0;
        if !rows.is_empty() {
            let actors: Vec<&str> = rows.iter().map(|r| r.actor.as_str()).collect();
            let keys: Vec<&str> = rows.iter().map(|r| r.metric_key.as_str()).collect();
            let values: Vec<f64> = rows.iter().map(|r| r.value).collect();

            let result = sqlx::query(
                "INSERT INTO metrics (upload_id, boss_name, actor, metric_key, value) \
                 SELECT $1, $2, a, k, v \
                 FROM UNNEST($3::TEXT[], $4::TEXT[], $5::FLOAT8[]) AS t(a, k, v)",
            )
            .bind(upload_id)
            .bind(boss_name)
            .bind(&actors)
            .bind(&keys)
            .bind(&values)
            .execute(&mut *tx)
            .await?;
            inserted = result.rows_affected();
        }

        sqlx::query("UPDATE uploads SET enriched_at = NOW() WHERE id = $1")
            .bind(upload_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn list_for_upload(
        pool: &PgPool,
        upload_id: DbId,
    ) -> Result<Vec<Metric>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM metrics WHERE upload_id = $1 ORDER BY id ASC"
        );
        sqlx::query_as::<_, Metric>(&query)
            .bind(upload_id)
            .fetch_all(pool)
            .await
    }

    /// Every metric row of every upload of an event.
    pub async fn list_for_event(
        pool: &PgPool,
        event_name: &str,
    ) -> Result<Vec<Metric>, sqlx::Error> {
        sqlx::query_as::<_, Metric>(
            "SELECT m.id, m.upload_id, m.boss_name, m.actor, m.metric_key, m.value \
             FROM metrics m \
             JOIN uploads u ON u.id = m.upload_id \
             WHERE u.event_name = $1 \
             ORDER BY m.upload_id ASC, m.id ASC",
        )
        .bind(event_name)
        .fetch_all(pool)
        .await
    }

    pub async fn count_for_upload(pool: &PgPool, upload_id: DbId) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar("SELECT COUNT(*) FROM metrics WHERE upload_id = $1")
            .bind(upload_id)
            .fetch_one(pool)
            .await
    }

    /// Delete all metric rows of an event and mark its uploads unenriched.
    /// Returns the number of rows removed.
    pub async fn delete_for_event(pool: &PgPool, event_name: &str) -> Result<u64, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let result = sqlx::query(
            "DELETE FROM metrics m USING uploads u \
             WHERE m.upload_id = u.id AND u.event_name = $1",
        )
        .bind(event_name)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE uploads SET enriched_at = NULL WHERE event_name = $1")
            .bind(event_name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }
}
