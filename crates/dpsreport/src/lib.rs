//! Client side of the dps.report log-parsing service.
//!
//! [`api`] uploads raw combat logs, [`normalize`] turns whatever a caller
//! holds (an upload response, a permalink, a local JSON file) into a full
//! Elite Insights report, and [`permalink`] knows the service's URL shapes.

pub mod api;
pub mod normalize;
pub mod permalink;

pub use api::{DpsReportApi, LogUploader, UploadError};
pub use normalize::{FetchRetryConfig, NormalizeError, Normalizer, Payload};
