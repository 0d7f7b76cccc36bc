//! Metric enrichment: report → extracted rows → `metrics` table.

use std::sync::Arc;

use raidlog_core::extraction::extract;
use raidlog_core::registry::Registry;
use raidlog_core::types::DbId;
use raidlog_db::models::metric::NewMetric;
use raidlog_db::repositories::{MetricRepo, UploadRepo};
use raidlog_dpsreport::{Normalizer, Payload};
use sqlx::PgPool;

use crate::error::PipelineError;

/// Writes metric rows for uploads.
///
/// Enrichment is idempotent: each call replaces the upload's rows in one
/// transaction, so running it twice with the same report leaves the same
/// rows behind.
pub struct Enricher {
    pool: PgPool,
    normalizer: Normalizer,
    registry: Arc<Registry>,
}

impl Enricher {
    pub fn new(pool: PgPool, normalizer: Normalizer, registry: Arc<Registry>) -> Self {
        Self {
            pool,
            normalizer,
            registry,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Normalize `payload`, extract its metrics and replace the upload's rows.
    ///
    /// Returns the number of rows written.
    pub async fn enrich_upload(
        &self,
        upload_id: DbId,
        payload: Payload,
    ) -> Result<u64, PipelineError> {
        if UploadRepo::find_by_id(&self.pool, upload_id).await?.is_none() {
            return Err(PipelineError::UploadNotFound(upload_id));
        }

        let report = self.normalizer.normalize(payload).await?;
        let extraction = extract(&report, &self.registry);
        let rows: Vec<NewMetric> = extraction
            .rows
            .into_iter()
            .map(|row| NewMetric {
                actor: row.actor,
                metric_key: row.metric_key,
                value: row.value,
            })
            .collect();

        let written =
            MetricRepo::replace_for_upload(&self.pool, upload_id, &extraction.boss_name, &rows)
                .await?;
        tracing::info!(
            upload_id,
            boss = %extraction.boss_name,
            rows = written,
            "Upload enriched",
        );
        Ok(written)
    }

    /// Re-enrich every upload of the event that was never enriched.
    ///
    /// The report is fetched again from the permalink, or read from the
    /// stored file path. Failures are logged and skipped; returns how many
    /// uploads were repaired.
    pub async fn ensure_enriched(&self, event_name: &str) -> Result<usize, PipelineError> {
        let missing = UploadRepo::list_unenriched_for_event(&self.pool, event_name).await?;
        let mut repaired = 0;

        for upload in &missing {
            let source = upload.report_source().to_string();
            match self
                .enrich_upload(upload.id, Payload::Reference(source.clone()))
                .await
            {
                Ok(_) => repaired += 1,
                Err(e) => tracing::warn!(
                    event = event_name,
                    upload_id = upload.id,
                    source = %source,
                    error = %e,
                    "Could not re-enrich upload",
                ),
            }
        }

        if !missing.is_empty() {
            tracing::info!(
                event = event_name,
                missing = missing.len(),
                repaired,
                "Enrichment repair pass finished",
            );
        }
        Ok(repaired)
    }

    /// Drop every metric row of the event and rebuild them from the reports.
    ///
    /// Returns `(rows deleted, uploads re-enriched)`.
    pub async fn recompute_event(&self, event_name: &str) -> Result<(u64, usize), PipelineError> {
        let deleted = MetricRepo::delete_for_event(&self.pool, event_name).await?;
        tracing::info!(event = event_name, deleted, "Cleared event metrics");
        let repaired = self.ensure_enriched(event_name).await?;
        Ok((deleted, repaired))
    }
}
