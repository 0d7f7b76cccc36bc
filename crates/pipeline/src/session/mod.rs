//! File-watch upload session: one polling loop per live event.
//!
//! A session walks its log directory every poll interval, feeds what it
//! sees into a [`FileTracker`] and uploads the files that settled inside
//! the event window. Files that keep failing are handed to the persistent
//! retry queue, and so is anything still unresolved when the session ends.

pub mod tracker;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use chrono::{DateTime, Utc};
use futures::future::join_all;
use raidlog_core::backoff::{RetryDecision, RetryPolicy};
use raidlog_core::types::DbId;
use raidlog_core::window::EventWindow;
use raidlog_dpsreport::LogUploader;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::enrichment::Enricher;
use crate::error::PipelineError;
use crate::ingest::{record_upload, upload_with_timeout, UploadSource};
use crate::retry_queue;

pub use tracker::{FileState, FileTracker, Observation};

/// Delay before the retry queue first picks up an escalated file.
const ESCALATION_DELAY_SECS: u64 = 60;

const LOG_EXTENSIONS: [&str; 3] = [".zevtc", ".evtc", ".evtc.zip"];

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub poll_interval: Duration,
    pub settle_secs: i64,
    pub grace_minutes: i64,
    pub max_attempts: u32,
    pub base_backoff_secs: u64,
    pub concurrency: usize,
    pub attempt_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            settle_secs: 5,
            grace_minutes: 10,
            max_attempts: 5,
            base_backoff_secs: 8,
            concurrency: 2,
            attempt_timeout: Duration::from_secs(95),
        }
    }
}

/// A file the session uploaded and recorded.
#[derive(Debug, Clone)]
pub struct SessionUpload {
    pub path: PathBuf,
    pub upload_id: DbId,
    pub response: Value,
}

pub struct WatchSession {
    event_name: String,
    channel_id: Option<i64>,
    root: PathBuf,
    window: EventWindow,
    config: SessionConfig,
    uploader: Arc<dyn LogUploader>,
    enricher: Arc<Enricher>,
}

impl WatchSession {
    pub fn new(
        event_name: impl Into<String>,
        root: PathBuf,
        window: EventWindow,
        config: SessionConfig,
        uploader: Arc<dyn LogUploader>,
        enricher: Arc<Enricher>,
    ) -> Self {
        Self {
            event_name: event_name.into(),
            channel_id: None,
            root,
            window,
            config,
            uploader,
            enricher,
        }
    }

    /// Channel the event belongs to; carried onto escalated queue entries.
    pub fn with_channel(mut self, channel_id: i64) -> Self {
        self.channel_id = Some(channel_id);
        self
    }

    pub fn spawn(self) -> SessionHandle {
        self.spawn_with_token(CancellationToken::new())
    }

    /// Spawn the session loop, stopping when `cancel` fires.
    pub fn spawn_with_token(self, cancel: CancellationToken) -> SessionHandle {
        let token = cancel.clone();
        let join = tokio::spawn(async move { self.run(token).await });
        SessionHandle { cancel, join }
    }

    /// Poll until the window's deadline passes or `cancel` fires, then
    /// escalate whatever is left. Returns the successful uploads.
    pub async fn run(self, cancel: CancellationToken) -> Vec<SessionUpload> {
        let deadline = self.window.poll_deadline(self.config.grace_minutes);
        let policy = RetryPolicy::new(self.config.max_attempts, self.config.base_backoff_secs);
        let mut tracker = FileTracker::new(self.window, self.config.settle_secs, policy);
        let gate = Semaphore::new(self.config.concurrency.max(1));
        let mut results = Vec::new();

        tracing::info!(
            event = %self.event_name,
            root = %self.root.display(),
            start = %self.window.start,
            end = %self.window.end,
            %deadline,
            "Watch session started",
        );

        loop {
            if Utc::now() > deadline {
                tracing::info!(event = %self.event_name, "Watch session reached its deadline");
                break;
            }

            self.poll(&mut tracker, &gate, &mut results).await;

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!(event = %self.event_name, "Watch session stopping");
                    break;
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        for path in tracker.drain_unresolved() {
            self.escalate(&path, "session ended before upload succeeded")
                .await;
        }

        tracing::info!(
            event = %self.event_name,
            uploaded = results.len(),
            "Watch session finished",
        );
        results
    }

    async fn poll(
        &self,
        tracker: &mut FileTracker,
        gate: &Semaphore,
        results: &mut Vec<SessionUpload>,
    ) {
        let root = self.root.clone();
        let observations = match tokio::task::spawn_blocking(move || scan(&root)).await {
            Ok(observations) => observations,
            Err(e) => {
                tracing::error!(event = %self.event_name, error = %e, "Directory scan failed");
                return;
            }
        };

        let now = Utc::now();
        let eligible: Vec<PathBuf> = observations
            .iter()
            .filter(|obs| tracker.observe(obs, now))
            .map(|obs| obs.path.clone())
            .collect();
        tracing::debug!(
            event = %self.event_name,
            seen = observations.len(),
            eligible = eligible.len(),
            "Polled log directory",
        );
        if eligible.is_empty() {
            return;
        }

        let attempts = join_all(eligible.iter().map(|path| self.attempt(gate, path))).await;

        let now = Utc::now();
        for (path, outcome) in eligible.into_iter().zip(attempts) {
            match outcome {
                Ok((upload_id, response)) => {
                    tracker.record_success(&path);
                    results.push(SessionUpload {
                        path,
                        upload_id,
                        response,
                    });
                }
                Err(e) => match tracker.record_failure(&path, now, e.retry_after()) {
                    RetryDecision::Retry {
                        attempts,
                        delay_secs,
                    } => tracing::warn!(
                        event = %self.event_name,
                        path = %path.display(),
                        attempts,
                        delay_secs,
                        retryable = e.is_retryable(),
                        error = %e,
                        "Upload attempt failed, backing off",
                    ),
                    RetryDecision::GiveUp { attempts } => {
                        tracing::warn!(
                            event = %self.event_name,
                            path = %path.display(),
                            attempts,
                            error = %e,
                            "Upload kept failing, escalating to retry queue",
                        );
                        self.escalate(&path, &format!("session max attempts reached: {e}"))
                            .await;
                    }
                },
            }
        }
    }

    async fn attempt(
        &self,
        gate: &Semaphore,
        path: &Path,
    ) -> Result<(DbId, Value), PipelineError> {
        let _permit = gate.acquire().await.ok();
        let response =
            upload_with_timeout(self.uploader.as_ref(), path, self.config.attempt_timeout).await?;
        let source = UploadSource::File(path.to_path_buf());
        let recorded = record_upload(&self.enricher, &self.event_name, &source, &response).await?;
        Ok((recorded.upload.id, response))
    }

    async fn escalate(&self, path: &Path, reason: &str) {
        let result = retry_queue::enqueue(
            self.enricher.pool(),
            path,
            &self.event_name,
            self.channel_id,
            0,
            ESCALATION_DELAY_SECS,
            reason,
        )
        .await;
        if let Err(e) = result {
            tracing::error!(
                event = %self.event_name,
                path = %path.display(),
                error = %e,
                "Could not escalate file to retry queue",
            );
        }
    }
}

/// Handle to a spawned [`WatchSession`].
pub struct SessionHandle {
    cancel: CancellationToken,
    join: JoinHandle<Vec<SessionUpload>>,
}

impl SessionHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Signal the session to stop and wait for its escalation sweep.
    pub async fn stop(self) -> Vec<SessionUpload> {
        self.cancel.cancel();
        self.wait().await
    }

    /// Wait for the session to end on its own (deadline or token).
    pub async fn wait(self) -> Vec<SessionUpload> {
        match self.join.await {
            Ok(results) => results,
            Err(e) => {
                tracing::error!(error = %e, "Watch session task failed");
                Vec::new()
            }
        }
    }
}

pub fn is_log_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let name = name.to_ascii_lowercase();
    LOG_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Recursively list log files under `root` with their size and mtime.
///
/// Unreadable entries are skipped; a missing root yields nothing.
pub fn scan(root: &Path) -> Vec<Observation> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_log_file(entry.path()))
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            let modified: SystemTime = metadata.modified().ok()?;
            Some(Observation {
                path: entry.into_path(),
                size: metadata.len(),
                mtime: DateTime::<Utc>::from(modified),
            })
        })
        .collect()
}
