use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use raidlog_core::registry::Registry;

use crate::error::PipelineError;
use crate::retry_queue::QueueConfig;
use crate::session::SessionConfig;

pub const DEFAULT_UPLOAD_URL: &str = "https://dps.report/uploadContent?json=1";
pub const DEFAULT_DPS_REPORT_BASE_URL: &str = "https://dps.report";

/// Pipeline configuration loaded from environment variables.
///
/// Every value has a default; a value that does not parse falls back to
/// its default with a warning.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Root of the combat-log directory watched by sessions.
    pub log_dir: Option<PathBuf>,
    pub upload_url: String,
    pub dps_report_base_url: String,
    /// Total timeout of one upload HTTP request.
    pub upload_timeout: Duration,
    /// Outer timeout wrapped around each upload attempt.
    pub attempt_timeout: Duration,
    pub pending_scan_interval: Duration,
    pub pending_max_attempts: u32,
    pub pending_base_backoff_secs: u64,
    pub pending_concurrency: usize,
    pub event_grace_minutes: i64,
    pub file_settle_secs: i64,
    pub poll_interval: Duration,
    pub session_max_attempts: u32,
    pub session_base_backoff_secs: u64,
    pub session_concurrency: usize,
    /// JSON mechanic registry replacing the built-in one.
    pub registry_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                                  |
    /// |---------------------------|------------------------------------------|
    /// | `LOG_DIR`                 | none                                     |
    /// | `UPLOAD_URL`              | `https://dps.report/uploadContent?json=1`|
    /// | `DPS_REPORT_BASE_URL`     | `https://dps.report`                     |
    /// | `UPLOAD_TIMEOUT_SECS`     | `90`                                     |
    /// | `ATTEMPT_TIMEOUT_SECS`    | `95`                                     |
    /// | `PENDING_SCAN_SECONDS`    | `30` (or `PENDING_SCAN_MIN` * 60)        |
    /// | `PENDING_MAX_ATTEMPTS`    | `12`                                     |
    /// | `PENDING_BASE_BACKOFF`    | `60`                                     |
    /// | `PENDING_CONCURRENCY`     | `2`                                      |
    /// | `EVENT_GRACE_MINUTES`     | `10`                                     |
    /// | `FILE_SETTLE_SECONDS`     | `5`                                      |
    /// | `POLL_INTERVAL_SECS`      | `5`                                      |
    /// | `SESSION_MAX_ATTEMPTS`    | `5`                                      |
    /// | `SESSION_BASE_BACKOFF`    | `8`                                      |
    /// | `SESSION_CONCURRENCY`     | `2`                                      |
    /// | `MECHANICS_REGISTRY_PATH` | built-in registry                        |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let text = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let pending_scan_secs = match text("PENDING_SCAN_SECONDS") {
            Some(_) => parse_or(&lookup, "PENDING_SCAN_SECONDS", 30u64),
            None if text("PENDING_SCAN_MIN").is_some() => {
                parse_or(&lookup, "PENDING_SCAN_MIN", 0u64).saturating_mul(60)
            }
            None => 30,
        };

        Self {
            log_dir: text("LOG_DIR").map(PathBuf::from),
            upload_url: text("UPLOAD_URL").unwrap_or_else(|| DEFAULT_UPLOAD_URL.into()),
            dps_report_base_url: text("DPS_REPORT_BASE_URL")
                .unwrap_or_else(|| DEFAULT_DPS_REPORT_BASE_URL.into()),
            upload_timeout: Duration::from_secs(parse_or(&lookup, "UPLOAD_TIMEOUT_SECS", 90)),
            attempt_timeout: Duration::from_secs(parse_or(&lookup, "ATTEMPT_TIMEOUT_SECS", 95)),
            pending_scan_interval: Duration::from_secs(pending_scan_secs.max(1)),
            pending_max_attempts: parse_or(&lookup, "PENDING_MAX_ATTEMPTS", 12),
            pending_base_backoff_secs: parse_or(&lookup, "PENDING_BASE_BACKOFF", 60),
            pending_concurrency: parse_or(&lookup, "PENDING_CONCURRENCY", 2usize).max(1),
            event_grace_minutes: parse_or(&lookup, "EVENT_GRACE_MINUTES", 10),
            file_settle_secs: parse_or(&lookup, "FILE_SETTLE_SECONDS", 5),
            poll_interval: Duration::from_secs(parse_or(&lookup, "POLL_INTERVAL_SECS", 5u64).max(1)),
            session_max_attempts: parse_or(&lookup, "SESSION_MAX_ATTEMPTS", 5),
            session_base_backoff_secs: parse_or(&lookup, "SESSION_BASE_BACKOFF", 8),
            session_concurrency: parse_or(&lookup, "SESSION_CONCURRENCY", 2usize).max(1),
            registry_path: text("MECHANICS_REGISTRY_PATH").map(PathBuf::from),
        }
    }

    /// The mechanic registry: the configured JSON file, else the built-in one.
    pub fn load_registry(&self) -> Result<Registry, PipelineError> {
        let Some(path) = &self.registry_path else {
            return Ok(Registry::builtin());
        };
        let document = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("cannot read registry {}: {e}", path.display()))
        })?;
        let registry = Registry::from_json_str(&document)?;
        tracing::info!(
            path = %path.display(),
            encounters = registry.encounters.len(),
            "Loaded mechanic registry",
        );
        Ok(registry)
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            scan_interval: self.pending_scan_interval,
            max_attempts: self.pending_max_attempts,
            base_backoff_secs: self.pending_base_backoff_secs,
            concurrency: self.pending_concurrency,
            attempt_timeout: self.attempt_timeout,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            poll_interval: self.poll_interval,
            settle_secs: self.file_settle_secs,
            grace_minutes: self.event_grace_minutes,
            max_attempts: self.session_max_attempts,
            base_backoff_secs: self.session_base_backoff_secs,
            concurrency: self.session_concurrency,
            attempt_timeout: self.attempt_timeout,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Display + Copy,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return default;
    }
    raw.parse().unwrap_or_else(|_| {
        tracing::warn!(key, value = raw, %default, "Invalid configuration value, using default");
        default
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> PipelineConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let c = PipelineConfig::default();
        assert_eq!(c.upload_url, DEFAULT_UPLOAD_URL);
        assert_eq!(c.upload_timeout, Duration::from_secs(90));
        assert_eq!(c.attempt_timeout, Duration::from_secs(95));
        assert_eq!(c.pending_scan_interval, Duration::from_secs(30));
        assert_eq!(c.pending_max_attempts, 12);
        assert_eq!(c.pending_base_backoff_secs, 60);
        assert_eq!(c.pending_concurrency, 2);
        assert_eq!(c.event_grace_minutes, 10);
        assert_eq!(c.file_settle_secs, 5);
        assert_eq!(c.session_max_attempts, 5);
        assert_eq!(c.session_base_backoff_secs, 8);
        assert!(c.log_dir.is_none());
    }

    #[test]
    fn legacy_scan_minutes_are_honoured() {
        let c = config(&[("PENDING_SCAN_MIN", "2")]);
        assert_eq!(c.pending_scan_interval, Duration::from_secs(120));

        let c = config(&[("PENDING_SCAN_MIN", "2"), ("PENDING_SCAN_SECONDS", "15")]);
        assert_eq!(c.pending_scan_interval, Duration::from_secs(15));
    }

    #[test]
    fn invalid_numbers_fall_back() {
        let c = config(&[("PENDING_MAX_ATTEMPTS", "lots"), ("PENDING_CONCURRENCY", "0")]);
        assert_eq!(c.pending_max_attempts, 12);
        assert_eq!(c.pending_concurrency, 1);
    }

    #[test]
    fn builtin_registry_without_path() {
        let registry = PipelineConfig::default().load_registry().unwrap();
        assert_eq!(registry, Registry::builtin());
    }

    #[test]
    fn missing_registry_file_is_a_config_error() {
        let c = config(&[("MECHANICS_REGISTRY_PATH", "/nonexistent/registry.json")]);
        assert!(matches!(c.load_registry(), Err(PipelineError::Config(_))));
    }
}
