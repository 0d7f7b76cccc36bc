//! Shared fixtures for the pipeline integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use raidlog_core::registry::Registry;
use raidlog_dpsreport::{FetchRetryConfig, LogUploader, Normalizer, UploadError};
use raidlog_pipeline::Enricher;
use serde_json::{json, Value};
use sqlx::PgPool;

/// Nothing listens here; remote fetches fail fast.
pub const DEAD_BASE_URL: &str = "http://127.0.0.1:9";

/// A full report for a Dhuum attempt with two players.
pub fn dhuum_report(success: bool) -> Value {
    json!({
        "fightName": "Dhuum",
        "encounter": {"bossId": 19450, "boss": "Dhuum", "success": success},
        "permalink": "https://dps.report/dhuum-1",
        "players": [
            {
                "account": "Alpha.1111",
                "name": "Alpha Char",
                "defenses": [{"downCount": 2, "deadCount": 1}],
                "support": [{"resurrects": 1}],
                "dpsTargets": [[{"powerDps": 20000, "condiDps": 5000}]]
            },
            {
                "account": "Beta.2222",
                "name": "Beta Char",
                "defenses": [{"downCount": 0, "deadCount": 0}],
                "support": [{"resurrects": 4}],
                "dpsTargets": [[{"powerDps": 15000, "condiDps": 1000}]]
            }
        ],
        "mechanics": [{
            "name": "Dip",
            "mechanicsData": [
                {"actor": "Alpha Char", "time": 1000},
                {"actor": "Alpha Char", "time": 9000},
                {"actor": "Beta Char", "time": 4000}
            ]
        }]
    })
}

/// An uploader answering from a script, then with the fallback.
pub struct FakeUploader {
    script: Mutex<VecDeque<Result<Value, UploadError>>>,
    fallback: Option<Value>,
    calls: AtomicUsize,
    seen: Mutex<Vec<PathBuf>>,
}

impl FakeUploader {
    /// Every call succeeds with `response`.
    pub fn answering(response: Value) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Some(response),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Calls take their answers from `script` in order, then succeed with
    /// `response`.
    pub fn scripted(script: Vec<Result<Value, UploadError>>, response: Value) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback: Some(response),
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    /// Every call fails with a server error.
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            fallback: None,
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl LogUploader for FakeUploader {
    async fn upload(&self, path: &Path) -> Result<Value, UploadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(path.to_path_buf());
        if let Some(next) = self.script.lock().unwrap().pop_front() {
            return next;
        }
        match &self.fallback {
            Some(response) => Ok(response.clone()),
            None => Err(UploadError::Server { status: 503 }),
        }
    }
}

pub fn enricher(pool: &PgPool) -> Arc<Enricher> {
    let normalizer = Normalizer::new(DEAD_BASE_URL.to_string())
        .unwrap()
        .with_retry(FetchRetryConfig {
            attempts: 1,
            initial_delay: Duration::from_millis(1),
            multiplier: 2.0,
        });
    Arc::new(Enricher::new(
        pool.clone(),
        normalizer,
        Arc::new(Registry::builtin()),
    ))
}

/// Write a small log file under `dir`.
pub fn write_log(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, b"EVTC20250301\0\0\0\0").unwrap();
    path
}

/// Poll `check` until it holds or five seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
