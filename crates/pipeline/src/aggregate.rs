//! Event rollups read from the store.

use raidlog_core::aggregate::{summarize, EventSummary, MetricFact, UploadFact};
use raidlog_core::registry::Registry;
use raidlog_db::repositories::{MetricRepo, UploadRepo};
use sqlx::PgPool;

use crate::error::PipelineError;

/// Load the event's uploads and metric rows and roll them up.
///
/// Uploads not yet enriched are counted but contribute nothing; run
/// [`crate::Enricher::ensure_enriched`] first to repair them.
pub async fn aggregate(
    pool: &PgPool,
    registry: &Registry,
    event_name: &str,
) -> Result<EventSummary, PipelineError> {
    let uploads: Vec<UploadFact> = UploadRepo::list_for_event(pool, event_name)
        .await?
        .into_iter()
        .map(|u| UploadFact {
            id: u.id,
            boss_id: u.boss_id,
            boss_name: u.boss_name,
            success: u.success,
            created_at: u.created_at,
        })
        .collect();

    let metrics: Vec<MetricFact> = MetricRepo::list_for_event(pool, event_name)
        .await?
        .into_iter()
        .map(|m| MetricFact {
            upload_id: m.upload_id,
            actor: m.actor,
            metric_key: m.metric_key,
            value: m.value,
        })
        .collect();

    tracing::debug!(
        event = event_name,
        uploads = uploads.len(),
        metrics = metrics.len(),
        "Aggregating event",
    );
    Ok(summarize(event_name, &uploads, &metrics, registry))
}
