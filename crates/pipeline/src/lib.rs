//! Log ingestion pipeline: watch sessions, the persistent retry queue,
//! metric enrichment and event rollups.

pub mod aggregate;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod ingest;
pub mod retry_queue;
pub mod session;

pub use config::PipelineConfig;
pub use enrichment::Enricher;
pub use error::PipelineError;
pub use retry_queue::{QueueConfig, RetryQueue};
pub use session::{SessionConfig, SessionHandle, WatchSession};
