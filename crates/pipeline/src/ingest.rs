//! Recording a successful upload: the `uploads` row plus its metrics.

use std::path::{Path, PathBuf};
use std::time::Duration;

use raidlog_core::report::UploadSummary;
use raidlog_db::models::upload::{CreateUpload, Upload};
use raidlog_db::repositories::UploadRepo;
use raidlog_dpsreport::{LogUploader, Payload};
use serde_json::Value;

use crate::enrichment::Enricher;
use crate::error::PipelineError;

/// Where an upload came from.
#[derive(Debug, Clone)]
pub enum UploadSource {
    /// A local log file uploaded to the service.
    File(PathBuf),
    /// An already parsed report, referenced by its permalink.
    Permalink(String),
}

impl UploadSource {
    /// The value stored in `uploads.source_ref`.
    pub fn source_ref(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Permalink(url) => url.trim().to_string(),
        }
    }
}

#[derive(Debug)]
pub struct RecordedUpload {
    pub upload: Upload,
    /// `false` when the source had been recorded before.
    pub created: bool,
    /// Rows written by enrichment, `None` when enrichment failed.
    pub metrics_written: Option<u64>,
}

/// Persist the upload row (idempotent by source) and enrich it.
///
/// `response` is the upload response or the full report. Enrichment
/// failures are logged and left for [`Enricher::ensure_enriched`] to
/// repair; only store failures are returned as errors.
pub async fn record_upload(
    enricher: &Enricher,
    event_name: &str,
    source: &UploadSource,
    response: &Value,
) -> Result<RecordedUpload, PipelineError> {
    let summary = UploadSummary::from_response(response);
    let (file_path, permalink) = match source {
        UploadSource::File(path) => (Some(path.display().to_string()), summary.permalink.clone()),
        UploadSource::Permalink(url) => (
            None,
            summary.permalink.clone().or_else(|| Some(url.trim().to_string())),
        ),
    };

    let input = CreateUpload {
        event_name: event_name.to_string(),
        source_ref: source.source_ref(),
        file_path,
        permalink,
        boss_id: summary.boss_id,
        boss_name: summary.boss_name.clone(),
        success: summary.success,
    };
    let (mut upload, created) = UploadRepo::insert_idempotent(enricher.pool(), &input).await?;

    // A row recorded before the permalink was known gets it now.
    let missing_link = upload.permalink.as_deref().map_or(true, str::is_empty);
    if let (true, Some(link)) = (missing_link, input.permalink.as_deref()) {
        if let Some(updated) = UploadRepo::attach_permalink(enricher.pool(), upload.id, link).await? {
            upload = updated;
        }
    }

    tracing::info!(
        event = event_name,
        upload_id = upload.id,
        source = %input.source_ref,
        boss = %upload.boss_name,
        success = upload.success,
        created,
        "Upload recorded",
    );

    let metrics_written = match enricher
        .enrich_upload(upload.id, Payload::Object(response.clone()))
        .await
    {
        Ok(rows) => Some(rows),
        Err(e) => {
            tracing::warn!(
                upload_id = upload.id,
                error = %e,
                "Enrichment failed, will retry on next repair pass",
            );
            None
        }
    };

    Ok(RecordedUpload {
        upload,
        created,
        metrics_written,
    })
}

/// One upload attempt bounded by `timeout`; running out of time is a
/// failed attempt like any other.
pub async fn upload_with_timeout(
    uploader: &dyn LogUploader,
    path: &Path,
    timeout: Duration,
) -> Result<Value, PipelineError> {
    match tokio::time::timeout(timeout, uploader.upload(path)).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(PipelineError::AttemptTimeout(timeout.as_secs())),
    }
}
