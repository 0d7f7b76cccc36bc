//! Row structs and insert DTOs.

pub mod metric;
pub mod pending_upload;
pub mod upload;
