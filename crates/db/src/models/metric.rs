use raidlog_core::types::DbId;
use serde::Serialize;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Metric {
    pub id: DbId,
    pub upload_id: DbId,
    pub boss_name: String,
    pub actor: String,
    pub metric_key: String,
    pub value: f64,
}

/// A metric value ready for insertion; the upload and boss come from the
/// enclosing replace call.
#[derive(Debug, Clone)]
pub struct NewMetric {
    pub actor: String,
    pub metric_key: String,
    pub value: f64,
}
