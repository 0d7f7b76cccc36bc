//! Exponential backoff shared by the in-session retry and the persistent
//! retry queue.

use chrono::{DateTime, TimeDelta, Utc};

/// Largest exponent applied to the base delay.
const MAX_EXPONENT: u32 = 20;

/// Upper bound on any scheduled delay (thirty days).
pub const MAX_DELAY_SECS: u64 = 30 * 24 * 60 * 60;

/// Delay after the `attempts`-th failure: `base * 2^(attempts - 1)`,
/// capped at [`MAX_DELAY_SECS`].
///
/// `attempts` is the count *including* the failure just recorded, so the
/// first failure waits `base` seconds.
pub fn backoff_secs(base_secs: u64, attempts: u32) -> u64 {
    let exponent = attempts.saturating_sub(1).min(MAX_EXPONENT);
    base_secs
        .saturating_mul(1u64 << exponent)
        .min(MAX_DELAY_SECS)
}

/// The instant `delay_secs` after `now`, never past [`MAX_DELAY_SECS`] and
/// saturating at the end of representable time.
pub fn retry_at(now: DateTime<Utc>, delay_secs: u64) -> DateTime<Utc> {
    let secs = i64::try_from(delay_secs.min(MAX_DELAY_SECS)).unwrap_or(i64::MAX);
    TimeDelta::try_seconds(secs)
        .and_then(|delay| now.checked_add_signed(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// What to do with an item after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Try again after `delay_secs`, persisting the new attempt count.
    Retry { attempts: u32, delay_secs: u64 },
    /// The attempt budget is spent.
    GiveUp { attempts: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff_secs: u64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff_secs: u64) -> Self {
        Self {
            max_attempts,
            base_backoff_secs,
        }
    }

    /// Decide the next step for an item that had `prior_attempts` failures
    /// before the one that just happened.
    pub fn after_failure(&self, prior_attempts: u32) -> RetryDecision {
        let attempts = prior_attempts.saturating_add(1);
        if attempts >= self.max_attempts {
            RetryDecision::GiveUp { attempts }
        } else {
            RetryDecision::Retry {
                attempts,
                delay_secs: backoff_secs(self.base_backoff_secs, attempts),
            }
        }
    }

    /// Like [`Self::after_failure`], but never retries sooner than a
    /// server-provided `retry_after` hint.
    pub fn after_failure_with_hint(
        &self,
        prior_attempts: u32,
        retry_after: Option<u64>,
    ) -> RetryDecision {
        match self.after_failure(prior_attempts) {
            RetryDecision::Retry {
                attempts,
                delay_secs,
            } => RetryDecision::Retry {
                attempts,
                delay_secs: delay_secs
                    .max(retry_after.unwrap_or(0))
                    .min(MAX_DELAY_SECS),
            },
            give_up => give_up,
        }
    }
}
