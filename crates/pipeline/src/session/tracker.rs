//! Per-file state of one watch session.
//!
//! The tracker is pure: callers pass in what the directory scan observed
//! and the current time, and it answers which files should be uploaded
//! now. Upload outcomes are fed back through [`FileTracker::record_success`]
//! and [`FileTracker::record_failure`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Duration;
use raidlog_core::backoff::{retry_at, RetryDecision, RetryPolicy};
use raidlog_core::types::Timestamp;
use raidlog_core::window::EventWindow;

/// One file as seen by a directory scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub path: PathBuf,
    pub size: u64,
    pub mtime: Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileState {
    /// Size changed since the previous scan (or the file is new).
    Growing { size: u64, changed_at: Timestamp },
    /// Size held across scans; waiting for the settle duration.
    Stable { size: u64, changed_at: Timestamp },
    /// At least one failed attempt; not eligible before `next_at`.
    Backoff {
        size: u64,
        changed_at: Timestamp,
        attempts: u32,
        next_at: Timestamp,
    },
    Done,
    OutOfWindow,
    /// Handed to the persistent retry queue.
    Escalated,
}

impl FileState {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Done | Self::OutOfWindow | Self::Escalated)
    }
}

#[derive(Debug)]
pub struct FileTracker {
    window: EventWindow,
    settle: Duration,
    policy: RetryPolicy,
    files: BTreeMap<PathBuf, FileState>,
}

impl FileTracker {
    pub fn new(window: EventWindow, settle_secs: i64, policy: RetryPolicy) -> Self {
        Self {
            window,
            settle: Duration::try_seconds(settle_secs.max(0)).unwrap_or(Duration::MAX),
            policy,
            files: BTreeMap::new(),
        }
    }

    pub fn state(&self, path: &Path) -> Option<FileState> {
        self.files.get(path).copied()
    }

    /// Fold one observation into the file's state.
    ///
    /// Returns `true` when the file should be uploaded now.
    pub fn observe(&mut self, obs: &Observation, now: Timestamp) -> bool {
        let previous = self.files.get(&obs.path).copied();
        if previous.is_some_and(|s| s.is_resolved()) {
            return false;
        }

        if !self.window.contains_mtime(obs.mtime) {
            tracing::debug!(path = %obs.path.display(), mtime = %obs.mtime, "Log file outside event window");
            self.files.insert(obs.path.clone(), FileState::OutOfWindow);
            return false;
        }

        let (next, eligible) = match previous {
            None => (
                FileState::Growing {
                    size: obs.size,
                    changed_at: now,
                },
                false,
            ),
            Some(FileState::Growing { size, changed_at })
            | Some(FileState::Stable { size, changed_at }) => {
                if size != obs.size {
                    (
                        FileState::Growing {
                            size: obs.size,
                            changed_at: now,
                        },
                        false,
                    )
                } else {
                    let settled = now - changed_at >= self.settle;
                    (FileState::Stable { size, changed_at }, settled)
                }
            }
            Some(FileState::Backoff {
                size,
                changed_at,
                attempts,
                next_at,
            }) => {
                if size != obs.size {
                    (
                        FileState::Backoff {
                            size: obs.size,
                            changed_at: now,
                            attempts,
                            next_at,
                        },
                        false,
                    )
                } else {
                    let settled = now - changed_at >= self.settle;
                    let current = FileState::Backoff {
                        size,
                        changed_at,
                        attempts,
                        next_at,
                    };
                    (current, settled && now >= next_at)
                }
            }
            Some(resolved) => (resolved, false),
        };

        self.files.insert(obs.path.clone(), next);
        eligible
    }

    pub fn record_success(&mut self, path: &Path) {
        self.files.insert(path.to_path_buf(), FileState::Done);
    }

    /// Count a failed attempt. The next attempt waits for the backoff or
    /// for `retry_after` seconds, whichever is longer. On
    /// [`RetryDecision::GiveUp`] the file is marked escalated and the caller
    /// hands it to the retry queue.
    pub fn record_failure(
        &mut self,
        path: &Path,
        now: Timestamp,
        retry_after: Option<u64>,
    ) -> RetryDecision {
        let (size, changed_at, prior) = match self.files.get(path) {
            Some(FileState::Growing { size, changed_at })
            | Some(FileState::Stable { size, changed_at }) => (*size, *changed_at, 0),
            Some(FileState::Backoff {
                size,
                changed_at,
                attempts,
                ..
            }) => (*size, *changed_at, *attempts),
            _ => (0, now, 0),
        };

        let decision = self.policy.after_failure_with_hint(prior, retry_after);
        let next = match decision {
            RetryDecision::Retry {
                attempts,
                delay_secs,
            } => FileState::Backoff {
                size,
                changed_at,
                attempts,
                next_at: retry_at(now, delay_secs),
            },
            RetryDecision::GiveUp { .. } => FileState::Escalated,
        };
        self.files.insert(path.to_path_buf(), next);
        decision
    }

    /// Mark every discovered, in-window, unresolved file as escalated and
    /// return the paths.
    pub fn drain_unresolved(&mut self) -> Vec<PathBuf> {
        let mut drained = Vec::new();
        for (path, state) in self.files.iter_mut() {
            if !state.is_resolved() {
                *state = FileState::Escalated;
                drained.push(path.clone());
            }
        }
        drained
    }
}
