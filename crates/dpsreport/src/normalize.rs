//! Turn an upload response, permalink or local file into a full report.
//!
//! The JSON report is often not ready right after an upload, so a remote
//! fetch sweeps every candidate URL and retries the whole sweep with
//! exponential backoff before giving up.

use std::path::Path;
use std::time::Duration;

use serde_json::Value;

use crate::permalink::{candidate_urls, is_http_url};

/// Keys that may carry the remote report identifier.
const LINK_FIELDS: [&str; 3] = ["permalink", "permaLink", "id"];

const USER_AGENT: &str = concat!("raidlog/", env!("CARGO_PKG_VERSION"));

/// Per-request timeout for report fetches.
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// What the caller holds.
#[derive(Debug, Clone)]
pub enum Payload {
    /// A report or an upload response.
    Object(Value),
    /// A permalink URL or a local JSON file path.
    Reference(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Retry schedule for the remote candidate sweep.
#[derive(Debug, Clone)]
pub struct FetchRetryConfig {
    /// Number of full sweeps over the candidate URLs.
    pub attempts: u32,
    /// Pause after the first failed sweep.
    pub initial_delay: Duration,
    /// Growth factor of the pause between sweeps.
    pub multiplier: f64,
}

impl Default for FetchRetryConfig {
    fn default() -> Self {
        Self {
            attempts: 5,
            initial_delay: Duration::from_millis(1500),
            multiplier: 2.0,
        }
    }
}

pub struct Normalizer {
    client: reqwest::Client,
    base_url: String,
    retry: FetchRetryConfig,
}

impl Normalizer {
    pub fn new(base_url: String) -> Result<Self, NormalizeError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| NormalizeError::InvalidPayload(format!("HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: reqwest::Client, base_url: String) -> Self {
        Self {
            client,
            base_url,
            retry: FetchRetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: FetchRetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Resolve `payload` to a report object that has a `players` list.
    pub async fn normalize(&self, payload: Payload) -> Result<Value, NormalizeError> {
        match payload {
            Payload::Object(value) => {
                if has_players(&value) {
                    return Ok(value);
                }
                let link = value.as_object().and_then(|map| {
                    LINK_FIELDS
                        .iter()
                        .filter_map(|key| map.get(*key).and_then(Value::as_str))
                        .map(str::trim)
                        .find(|s| !s.is_empty())
                });
                match link {
                    Some(link) => self.resolve_reference(link).await,
                    None => Err(NormalizeError::InvalidPayload(
                        "object has neither a player list nor a report link".to_string(),
                    )),
                }
            }
            Payload::Reference(reference) => self.resolve_reference(&reference).await,
        }
    }

    async fn resolve_reference(&self, reference: &str) -> Result<Value, NormalizeError> {
        let reference = reference.trim();

        let is_file = tokio::fs::metadata(reference)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if is_file {
            return read_local_report(Path::new(reference)).await;
        }

        if is_http_url(reference) {
            return self.fetch_remote(reference).await;
        }

        Err(NormalizeError::InvalidPayload(format!(
            "'{reference}' is neither a readable file nor an http(s) URL"
        )))
    }

    async fn fetch_remote(&self, url: &str) -> Result<Value, NormalizeError> {
        let candidates = candidate_urls(url, &self.base_url);
        let mut delay = self.retry.initial_delay;
        let mut last_error = String::from("no candidate URL");

        for attempt in 1..=self.retry.attempts.max(1) {
            for candidate in &candidates {
                match self.try_candidate(candidate).await {
                    Ok(report) => {
                        tracing::debug!(url = %candidate, attempt, "Fetched report JSON");
                        return Ok(report);
                    }
                    Err(e) => last_error = e,
                }
            }

            if attempt < self.retry.attempts {
                tracing::debug!(
                    url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %last_error,
                    "Report JSON not available yet",
                );
                tokio::time::sleep(delay).await;
                delay = delay.mul_f64(self.retry.multiplier);
            }
        }

        Err(NormalizeError::InvalidPayload(format!(
            "no report JSON for {url}: {last_error}"
        )))
    }

    async fn try_candidate(&self, url: &str) -> Result<Value, String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("{url}: {e}"))?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("{url} => HTTP {}", status.as_u16()));
        }
        let text = response.text().await.map_err(|e| format!("{url}: {e}"))?;
        let body: Value = serde_json::from_str(&text).map_err(|e| format!("{url}: {e}"))?;
        usable_report(body).ok_or_else(|| format!("{url} returned unusable JSON shape"))
    }
}

fn has_players(value: &Value) -> bool {
    matches!(value.get("players"), Some(Value::Array(_)))
}

/// The body itself, or the first report inside a list body.
fn usable_report(body: Value) -> Option<Value> {
    if has_players(&body) {
        return Some(body);
    }
    match body {
        Value::Array(items) => items.into_iter().find(has_players),
        _ => None,
    }
}

async fn read_local_report(path: &Path) -> Result<Value, NormalizeError> {
    let text = tokio::fs::read_to_string(path).await.map_err(|e| {
        NormalizeError::InvalidPayload(format!("cannot read {}: {e}", path.display()))
    })?;
    let value: Value = serde_json::from_str(&text).map_err(|e| {
        NormalizeError::InvalidPayload(format!("{} is not JSON: {e}", path.display()))
    })?;
    if !value.is_object() {
        return Err(NormalizeError::InvalidPayload(format!(
            "{} holds a JSON {}, expected an object",
            path.display(),
            json_kind(&value)
        )));
    }
    Ok(value)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn normalizer() -> Normalizer {
        Normalizer::with_client(reqwest::Client::new(), "https://dps.report".into())
    }

    #[test]
    fn list_bodies_yield_first_report() {
        let body = json!([{"meta": 1}, {"players": [], "fightName": "x"}]);
        assert_eq!(
            usable_report(body),
            Some(json!({"players": [], "fightName": "x"}))
        );
        assert_eq!(usable_report(json!({"players": "nope"})), None);
    }

    #[tokio::test]
    async fn report_object_is_returned_as_is() {
        let report = json!({"players": [{"account": "A.1"}]});
        let out = normalizer()
            .normalize(Payload::Object(report.clone()))
            .await
            .unwrap();
        assert_eq!(out, report);
    }

    #[tokio::test]
    async fn object_without_players_or_link_is_invalid() {
        let result = normalizer()
            .normalize(Payload::Object(json!({"success": true})))
            .await;
        assert_matches!(result, Err(NormalizeError::InvalidPayload(_)));
    }

    #[tokio::test]
    async fn bare_word_reference_is_invalid() {
        let result = normalizer()
            .normalize(Payload::Reference("definitely-not-a-file".into()))
            .await;
        assert_matches!(result, Err(NormalizeError::InvalidPayload(_)));
    }
}
