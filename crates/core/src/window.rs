//! The time window a file-watch session accepts log files from.

use chrono::{DateTime, Duration, Utc};

use crate::error::CoreError;
use crate::types::Timestamp;

/// Files modified this long before the event start are still accepted.
pub const LEAD_IN_MINUTES: i64 = 5;

/// Files modified this long after the event end are still accepted.
pub const TRAIL_MINUTES: i64 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWindow {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl EventWindow {
    pub fn new(start: Timestamp, end: Timestamp) -> Result<Self, CoreError> {
        if end < start {
            return Err(CoreError::Validation(format!(
                "Event end {end} is before start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    /// Whether a file modified at `mtime` belongs to the event.
    pub fn contains_mtime(&self, mtime: Timestamp) -> bool {
        let earliest = self
            .start
            .checked_sub_signed(Duration::minutes(LEAD_IN_MINUTES))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let latest = self
            .end
            .checked_add_signed(Duration::minutes(TRAIL_MINUTES))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        mtime >= earliest && mtime <= latest
    }

    /// Instant after which the watch loop stops polling. Saturates instead
    /// of overflowing for very large grace periods.
    pub fn poll_deadline(&self, grace_minutes: i64) -> Timestamp {
        let fallback = if grace_minutes < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        };
        Duration::try_minutes(grace_minutes)
            .and_then(|grace| self.end.checked_add_signed(grace))
            .unwrap_or(fallback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn window() -> EventWindow {
        EventWindow::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 20, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2025, 3, 1, 22, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn accepts_lead_in_and_trail() {
        let w = window();
        assert!(w.contains_mtime(w.start - Duration::minutes(5)));
        assert!(w.contains_mtime(w.end + Duration::minutes(15)));
        assert!(w.contains_mtime(w.start + Duration::minutes(30)));
    }

    #[test]
    fn rejects_files_outside_window() {
        let w = window();
        assert!(!w.contains_mtime(w.end + Duration::minutes(20)));
        assert!(!w.contains_mtime(w.start - Duration::minutes(6)));
    }

    #[test]
    fn deadline_adds_grace() {
        let w = window();
        assert_eq!(w.poll_deadline(10), w.end + Duration::minutes(10));
    }

    #[test]
    fn huge_grace_saturates() {
        let w = window();
        assert_eq!(w.poll_deadline(i64::MAX), DateTime::<Utc>::MAX_UTC);
        assert_eq!(w.poll_deadline(i64::MIN), DateTime::<Utc>::MIN_UTC);
    }

    #[test]
    fn window_at_the_edge_of_time_does_not_overflow() {
        let w = EventWindow::new(DateTime::<Utc>::MIN_UTC, DateTime::<Utc>::MAX_UTC).unwrap();
        assert!(w.contains_mtime(Utc::now()));
        assert!(w.contains_mtime(DateTime::<Utc>::MAX_UTC));
    }

    #[test]
    fn end_before_start_is_invalid() {
        let w = window();
        assert!(EventWindow::new(w.end, w.start).is_err());
    }
}
