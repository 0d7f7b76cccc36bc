//! Durable retry queue entries.

use raidlog_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PendingUpload {
    pub id: DbId,
    pub file_path: String,
    pub event_name: String,
    pub channel_id: Option<i64>,
    pub attempts: i32,
    pub next_retry_at: Timestamp,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
}

/// Upsert payload; an existing row for the same path is overwritten.
#[derive(Debug, Clone)]
pub struct EnqueuePendingUpload {
    pub file_path: String,
    pub event_name: String,
    pub channel_id: Option<i64>,
    pub attempts: i32,
    pub next_retry_at: Timestamp,
    pub last_error: Option<String>,
}
