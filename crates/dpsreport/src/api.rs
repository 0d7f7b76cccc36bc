//! Upload client for the dps.report `uploadContent` endpoint.
//!
//! One call is one attempt: the client never retries and never touches
//! local state. Callers decide what a failure means through
//! [`UploadError::is_retryable`].

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;

/// Errors from a single upload attempt.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// The service answered 429.
    #[error("Rate limited by dps.report (retry after {retry_after:?}s)")]
    RateLimited { retry_after: Option<u64> },

    /// The service answered 5xx.
    #[error("dps.report server error ({status})")]
    Server { status: u16 },

    /// The request exceeded its total timeout.
    #[error("Upload timed out")]
    Timeout,

    /// Connection, DNS or TLS failure.
    #[error("Upload request failed: {0}")]
    Request(String),

    /// Any other non-200 answer.
    #[error("Upload rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// 200 with a body that is not a JSON object.
    #[error("Upload response was not a JSON object: {0}")]
    InvalidBody(String),

    /// The log file could not be read.
    #[error("Cannot read log file: {0}")]
    Io(#[from] std::io::Error),
}

impl UploadError {
    /// Whether the failure is transient on the service side.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::Server { .. } | Self::Timeout | Self::Request(_)
        )
    }

    /// Seconds the service asked callers to wait, from a 429 `Retry-After`.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for UploadError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// Anything that can turn a log file into an upload response.
///
/// The watch session and the retry queue only depend on this trait so they
/// can run against a fake service in tests.
#[async_trait]
pub trait LogUploader: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<serde_json::Value, UploadError>;
}

/// HTTP client for the dps.report upload endpoint.
pub struct DpsReportApi {
    client: reqwest::Client,
    upload_url: String,
}

impl DpsReportApi {
    /// Create a client whose requests are bounded by `timeout` end to end.
    pub fn new(upload_url: String, timeout: Duration) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, upload_url))
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, upload_url: String) -> Self {
        Self { client, upload_url }
    }

    /// Upload one log file as the multipart `file` field.
    ///
    /// Returns the response object (it carries the permalink and the
    /// encounter summary, not the full report).
    pub async fn upload_file(&self, path: &Path) -> Result<serde_json::Value, UploadError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "log.zevtc".to_string());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/octet-stream")?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    /// Map the status code to an error, or hand back the response.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, UploadError> {
        let status = response.status();
        if status == StatusCode::OK {
            return Ok(response);
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            return Err(UploadError::RateLimited { retry_after });
        }
        if status.is_server_error() {
            return Err(UploadError::Server {
                status: status.as_u16(),
            });
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(UploadError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    async fn parse_response(response: reqwest::Response) -> Result<serde_json::Value, UploadError> {
        let response = Self::ensure_success(response).await?;
        let text = response.text().await?;
        match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(value) if value.is_object() => Ok(value),
            Ok(_) => Err(UploadError::InvalidBody("expected an object".to_string())),
            Err(e) => Err(UploadError::InvalidBody(e.to_string())),
        }
    }
}

#[async_trait]
impl LogUploader for DpsReportApi {
    async fn upload(&self, path: &Path) -> Result<serde_json::Value, UploadError> {
        let result = self.upload_file(path).await;
        match &result {
            Ok(_) => tracing::debug!(path = %path.display(), "Log uploaded"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Log upload failed"),
        }
        result
    }
}
