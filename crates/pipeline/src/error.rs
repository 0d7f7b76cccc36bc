use raidlog_core::error::CoreError;
use raidlog_core::types::DbId;
use raidlog_dpsreport::{NormalizeError, UploadError};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Upload(#[from] UploadError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Upload attempt timed out after {0}s")]
    AttemptTimeout(u64),

    #[error("Upload {0} not found")]
    UploadNotFound(DbId),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Seconds the upload service asked us to wait before trying again.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Upload(e) => e.retry_after(),
            _ => None,
        }
    }

    /// Whether a later attempt can succeed without anything changing locally.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Upload(e) => e.is_retryable(),
            Self::AttemptTimeout(_) | Self::Database(_) => true,
            _ => false,
        }
    }
}
