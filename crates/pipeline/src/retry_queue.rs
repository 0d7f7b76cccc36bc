//! Persistent retry queue for log files whose upload kept failing.
//!
//! Entries live in `pending_uploads`. [`RetryQueue::run`] sweeps due
//! entries on a fixed interval using its own small worker pool, separate
//! from any watch session's concurrency gate.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use raidlog_core::backoff::{retry_at, RetryDecision, RetryPolicy};
use raidlog_db::models::pending_upload::{EnqueuePendingUpload, PendingUpload};
use raidlog_db::repositories::PendingUploadRepo;
use raidlog_dpsreport::LogUploader;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use crate::enrichment::Enricher;
use crate::error::PipelineError;
use crate::ingest::{record_upload, upload_with_timeout, UploadSource};

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub scan_interval: Duration,
    pub max_attempts: u32,
    pub base_backoff_secs: u64,
    pub concurrency: usize,
    pub attempt_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            max_attempts: 12,
            base_backoff_secs: 60,
            concurrency: 2,
            attempt_timeout: Duration::from_secs(95),
        }
    }
}

/// What a sweep did with one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Uploaded,
    /// The file no longer exists; the entry was dropped.
    Vanished,
    Rescheduled { attempts: u32 },
    /// The attempt budget is spent; the entry was dropped.
    GaveUp,
    /// The store failed while handling the entry; it is left untouched.
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub processed: usize,
    pub uploaded: usize,
    pub vanished: usize,
    pub rescheduled: usize,
    pub gave_up: usize,
    pub failed: usize,
}

impl SweepReport {
    fn tally(outcomes: &[ItemOutcome]) -> Self {
        let mut report = Self {
            processed: outcomes.len(),
            ..Self::default()
        };
        for outcome in outcomes {
            match outcome {
                ItemOutcome::Uploaded => report.uploaded += 1,
                ItemOutcome::Vanished => report.vanished += 1,
                ItemOutcome::Rescheduled { .. } => report.rescheduled += 1,
                ItemOutcome::GaveUp => report.gave_up += 1,
                ItemOutcome::Failed => report.failed += 1,
            }
        }
        report
    }
}

/// Insert or overwrite the queue entry for `file_path`, due in `delay_secs`.
pub async fn enqueue(
    pool: &PgPool,
    file_path: &Path,
    event_name: &str,
    channel_id: Option<i64>,
    attempts: u32,
    delay_secs: u64,
    error: &str,
) -> Result<PendingUpload, PipelineError> {
    let input = EnqueuePendingUpload {
        file_path: file_path.display().to_string(),
        event_name: event_name.to_string(),
        channel_id,
        attempts: i32::try_from(attempts).unwrap_or(i32::MAX),
        next_retry_at: retry_at(Utc::now(), delay_secs),
        last_error: Some(error.to_string()),
    };
    let entry = PendingUploadRepo::upsert(pool, &input).await?;
    tracing::info!(
        path = %file_path.display(),
        event = event_name,
        attempts,
        delay_secs,
        reason = error,
        "Queued upload for retry",
    );
    Ok(entry)
}

pub struct RetryQueue {
    pool: PgPool,
    uploader: Arc<dyn LogUploader>,
    enricher: Arc<Enricher>,
    config: QueueConfig,
}

impl RetryQueue {
    pub fn new(
        pool: PgPool,
        uploader: Arc<dyn LogUploader>,
        enricher: Arc<Enricher>,
        config: QueueConfig,
    ) -> Self {
        Self {
            pool,
            uploader,
            enricher,
            config,
        }
    }

    fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.config.max_attempts, self.config.base_backoff_secs)
    }

    pub async fn enqueue(
        &self,
        file_path: &Path,
        event_name: &str,
        channel_id: Option<i64>,
        attempts: u32,
        delay_secs: u64,
        error: &str,
    ) -> Result<PendingUpload, PipelineError> {
        enqueue(
            &self.pool,
            file_path,
            event_name,
            channel_id,
            attempts,
            delay_secs,
            error,
        )
        .await
    }

    /// Process every entry whose retry time has come.
    pub async fn sweep_due(&self) -> Result<SweepReport, PipelineError> {
        let due = PendingUploadRepo::list_due(&self.pool, Utc::now()).await?;
        if due.is_empty() {
            return Ok(SweepReport::default());
        }

        let outcomes: Vec<ItemOutcome> = stream::iter(due)
            .map(|entry| self.process_entry(entry))
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        let report = SweepReport::tally(&outcomes);
        tracing::info!(
            processed = report.processed,
            uploaded = report.uploaded,
            vanished = report.vanished,
            rescheduled = report.rescheduled,
            gave_up = report.gave_up,
            "Retry queue sweep finished",
        );
        Ok(report)
    }

    async fn process_entry(&self, entry: PendingUpload) -> ItemOutcome {
        match self.try_process(&entry).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    id = entry.id,
                    path = %entry.file_path,
                    error = %e,
                    "Retry queue entry could not be processed",
                );
                ItemOutcome::Failed
            }
        }
    }

    async fn try_process(&self, entry: &PendingUpload) -> Result<ItemOutcome, PipelineError> {
        let path = Path::new(&entry.file_path);

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            PendingUploadRepo::delete(&self.pool, entry.id).await?;
            tracing::info!(
                path = %entry.file_path,
                "Queued log file is gone, dropping entry",
            );
            return Ok(ItemOutcome::Vanished);
        }

        let attempt =
            upload_with_timeout(self.uploader.as_ref(), path, self.config.attempt_timeout).await;
        let failure = match attempt {
            Ok(response) => {
                let source = UploadSource::File(path.to_path_buf());
                match record_upload(&self.enricher, &entry.event_name, &source, &response).await {
                    Ok(_) => {
                        PendingUploadRepo::delete(&self.pool, entry.id).await?;
                        return Ok(ItemOutcome::Uploaded);
                    }
                    Err(e) => e,
                }
            }
            Err(e) => e,
        };

        let prior = u32::try_from(entry.attempts).unwrap_or(0);
        match self
            .policy()
            .after_failure_with_hint(prior, failure.retry_after())
        {
            RetryDecision::Retry {
                attempts,
                delay_secs,
            } => {
                PendingUploadRepo::update_retry(
                    &self.pool,
                    entry.id,
                    i32::try_from(attempts).unwrap_or(i32::MAX),
                    retry_at(Utc::now(), delay_secs),
                    &failure.to_string(),
                )
                .await?;
                tracing::warn!(
                    path = %entry.file_path,
                    attempts,
                    delay_secs,
                    retryable = failure.is_retryable(),
                    error = %failure,
                    "Queued upload failed, rescheduled",
                );
                Ok(ItemOutcome::Rescheduled { attempts })
            }
            RetryDecision::GiveUp { attempts } => {
                PendingUploadRepo::delete(&self.pool, entry.id).await?;
                tracing::warn!(
                    path = %entry.file_path,
                    attempts,
                    error = %failure,
                    "Queued upload failed too often, giving up",
                );
                Ok(ItemOutcome::GaveUp)
            }
        }
    }

    /// Sweep on a fixed interval until `cancel` is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        tracing::info!(
            interval_secs = self.config.scan_interval.as_secs(),
            concurrency = self.config.concurrency,
            max_attempts = self.config.max_attempts,
            "Retry queue started",
        );

        let mut interval = tokio::time::interval(self.config.scan_interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Retry queue stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.sweep_due().await {
                        tracing::error!(error = %e, "Retry queue sweep failed");
                    }
                }
            }
        }
    }
}
