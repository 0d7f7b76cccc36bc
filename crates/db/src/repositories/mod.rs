//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod metric_repo;
pub mod pending_upload_repo;
pub mod upload_repo;

pub use metric_repo::MetricRepo;
pub use pending_upload_repo::PendingUploadRepo;
pub use upload_repo::UploadRepo;
