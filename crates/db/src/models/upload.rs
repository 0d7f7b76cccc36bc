//! Upload entity: one remote-parsed encounter log.

use raidlog_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Upload {
    pub id: DbId,
    pub event_name: String,
    /// File path for uploaded files, permalink for ingested reports.
    pub source_ref: String,
    pub file_path: Option<String>,
    pub permalink: Option<String>,
    pub boss_id: i64,
    pub boss_name: String,
    pub success: bool,
    pub created_at: Timestamp,
    /// When metric rows were last written; `None` until the first enrichment.
    pub enriched_at: Option<Timestamp>,
}

impl Upload {
    /// Where the report can be fetched again: the permalink when known,
    /// else the local file.
    pub fn report_source(&self) -> &str {
        self.permalink
            .as_deref()
            .filter(|p| !p.trim().is_empty())
            .or(self.file_path.as_deref())
            .unwrap_or(&self.source_ref)
    }
}

#[derive(Debug, Clone)]
pub struct CreateUpload {
    pub event_name: String,
    pub source_ref: String,
    pub file_path: Option<String>,
    pub permalink: Option<String>,
    pub boss_id: i64,
    pub boss_name: String,
    pub success: bool,
}
