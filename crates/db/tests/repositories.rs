//! Integration tests for the upload, metric and retry-queue repositories.

use chrono::{Duration, Utc};
use raidlog_db::models::metric::NewMetric;
use raidlog_db::models::pending_upload::EnqueuePendingUpload;
use raidlog_db::models::upload::CreateUpload;
use raidlog_db::repositories::{MetricRepo, PendingUploadRepo, UploadRepo};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_upload(event: &str, source: &str, success: bool) -> CreateUpload {
    CreateUpload {
        event_name: event.to_string(),
        source_ref: source.to_string(),
        file_path: Some(source.to_string()),
        permalink: None,
        boss_id: 19450,
        boss_name: "Dhuum".to_string(),
        success,
    }
}

fn metric(actor: &str, key: &str, value: f64) -> NewMetric {
    NewMetric {
        actor: actor.to_string(),
        metric_key: key.to_string(),
        value,
    }
}

fn pending(path: &str, attempts: i32, delay_secs: i64) -> EnqueuePendingUpload {
    EnqueuePendingUpload {
        file_path: path.to_string(),
        event_name: "raid night".to_string(),
        channel_id: Some(42),
        attempts,
        next_retry_at: Utc::now() + Duration::seconds(delay_secs),
        last_error: Some("timeout".to_string()),
    }
}

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_insert_upload_is_idempotent(pool: PgPool) {
    let input = new_upload("raid night", "/logs/a.zevtc", true);

    let (first, created) = UploadRepo::insert_idempotent(&pool, &input).await.unwrap();
    assert!(created);

    let mut again = input.clone();
    again.success = false;
    let (second, created) = UploadRepo::insert_idempotent(&pool, &again).await.unwrap();
    assert!(!created);
    assert_eq!(second.id, first.id);
    assert!(second.success, "existing row must not be overwritten");

    let all = UploadRepo::list_for_event(&pool, "raid night").await.unwrap();
    assert_eq!(all.len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_attach_permalink_only_once(pool: PgPool) {
    let (upload, _) = UploadRepo::insert_idempotent(&pool, &new_upload("e", "/a.zevtc", true))
        .await
        .unwrap();

    let updated = UploadRepo::attach_permalink(&pool, upload.id, "https://dps.report/abc")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.permalink.as_deref(), Some("https://dps.report/abc"));
    assert_eq!(updated.report_source(), "https://dps.report/abc");

    let second = UploadRepo::attach_permalink(&pool, upload.id, "https://dps.report/zzz")
        .await
        .unwrap();
    assert!(second.is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_delete_upload_cascades_to_metrics(pool: PgPool) {
    let (upload, _) = UploadRepo::insert_idempotent(&pool, &new_upload("e", "/a.zevtc", true))
        .await
        .unwrap();
    MetricRepo::replace_for_upload(&pool, upload.id, "Dhuum", &[metric("A.1", "downs", 1.0)])
        .await
        .unwrap();

    assert!(UploadRepo::delete(&pool, upload.id).await.unwrap());
    assert_eq!(MetricRepo::count_for_upload(&pool, upload.id).await.unwrap(), 0);
    assert!(UploadRepo::find_by_id(&pool, upload.id).await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_replace_metrics_overwrites_previous_rows(pool: PgPool) {
    let (upload, _) = UploadRepo::insert_idempotent(&pool, &new_upload("e", "/a.zevtc", true))
        .await
        .unwrap();

    let inserted = MetricRepo::replace_for_upload(
        &pool,
        upload.id,
        "Dhuum",
        &[metric("A.1", "downs", 2.0), metric("B.2", "downs", 1.0)],
    )
    .await
    .unwrap();
    assert_eq!(inserted, 2);

    MetricRepo::replace_for_upload(&pool, upload.id, "Dhuum", &[metric("A.1", "deaths", 1.0)])
        .await
        .unwrap();
    let rows = MetricRepo::list_for_upload(&pool, upload.id).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].metric_key, "deaths");
    assert_eq!(rows[0].boss_name, "Dhuum");
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_unenriched_and_event_scoped_delete(pool: PgPool) {
    let (a, _) = UploadRepo::insert_idempotent(&pool, &new_upload("e", "/a.zevtc", true))
        .await
        .unwrap();
    let (b, _) = UploadRepo::insert_idempotent(&pool, &new_upload("e", "/b.zevtc", false))
        .await
        .unwrap();
    let (other, _) = UploadRepo::insert_idempotent(&pool, &new_upload("x", "/c.zevtc", true))
        .await
        .unwrap();
    MetricRepo::replace_for_upload(&pool, a.id, "Dhuum", &[metric("A.1", "downs", 1.0)])
        .await
        .unwrap();
    MetricRepo::replace_for_upload(&pool, other.id, "Dhuum", &[metric("A.1", "downs", 1.0)])
        .await
        .unwrap();

    let missing = UploadRepo::list_unenriched_for_event(&pool, "e").await.unwrap();
    assert_eq!(missing.iter().map(|u| u.id).collect::<Vec<_>>(), vec![b.id]);

    assert_eq!(MetricRepo::list_for_event(&pool, "e").await.unwrap().len(), 1);
    assert_eq!(MetricRepo::delete_for_event(&pool, "e").await.unwrap(), 1);
    assert_eq!(MetricRepo::count_for_upload(&pool, other.id).await.unwrap(), 1);

    // Clearing the event makes its uploads eligible for repair again.
    let missing = UploadRepo::list_unenriched_for_event(&pool, "e").await.unwrap();
    assert_eq!(missing.iter().map(|u| u.id).collect::<Vec<_>>(), vec![a.id, b.id]);
    let other = UploadRepo::find_by_id(&pool, other.id).await.unwrap().unwrap();
    assert!(other.enriched_at.is_some());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_enrichment_with_no_rows_still_marks_upload(pool: PgPool) {
    let (upload, _) = UploadRepo::insert_idempotent(&pool, &new_upload("e", "/a.zevtc", true))
        .await
        .unwrap();
    assert!(upload.enriched_at.is_none());

    let inserted = MetricRepo::replace_for_upload(&pool, upload.id, "Dhuum", &[])
        .await
        .unwrap();

    assert_eq!(inserted, 0);
    let upload = UploadRepo::find_by_id(&pool, upload.id).await.unwrap().unwrap();
    assert!(upload.enriched_at.is_some());
    assert!(UploadRepo::list_unenriched_for_event(&pool, "e")
        .await
        .unwrap()
        .is_empty());
}

// ---------------------------------------------------------------------------
// Pending uploads
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_pending_upsert_overwrites_by_path(pool: PgPool) {
    let first = PendingUploadRepo::upsert(&pool, &pending("/a.zevtc", 0, 60))
        .await
        .unwrap();
    let second = PendingUploadRepo::upsert(&pool, &pending("/a.zevtc", 3, 240))
        .await
        .unwrap();

    assert_eq!(second.id, first.id);
    assert_eq!(second.attempts, 3);
    assert!(second.next_retry_at > first.next_retry_at);
    assert_eq!(PendingUploadRepo::list_all(&pool).await.unwrap().len(), 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn test_list_due_and_update_retry(pool: PgPool) {
    let due = PendingUploadRepo::upsert(&pool, &pending("/due.zevtc", 1, -5))
        .await
        .unwrap();
    PendingUploadRepo::upsert(&pool, &pending("/later.zevtc", 1, 600))
        .await
        .unwrap();

    let listed = PendingUploadRepo::list_due(&pool, Utc::now()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].file_path, "/due.zevtc");

    let next = Utc::now() + Duration::seconds(120);
    assert!(PendingUploadRepo::update_retry(&pool, due.id, 2, next, "server error")
        .await
        .unwrap());
    let reloaded = PendingUploadRepo::find_by_path(&pool, "/due.zevtc")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reloaded.attempts, 2);
    assert_eq!(reloaded.last_error.as_deref(), Some("server error"));

    assert!(PendingUploadRepo::delete(&pool, due.id).await.unwrap());
    assert!(!PendingUploadRepo::delete(&pool, due.id).await.unwrap());
}
