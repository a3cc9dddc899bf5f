use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use super::types::{ChangeEvent, ChangeSet};
use crate::core::ChangeKind;

/// How long the watcher thread may sleep with nothing collected.
pub(super) const IDLE_SLEEP: Duration = Duration::from_secs(86400);

/// Debounce window state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum DebounceState {
    /// Nothing collected
    Idle,
    /// Sliding window: every event pushes the deadline out
    Collecting { first_at: Instant, deadline: Instant },
    /// Deadline pinned to `first_at + max_wait`; further events no longer extend it
    Forced { first_at: Instant, deadline: Instant },
}

/// Pure debouncer: timing and per-path coalescing only.
///
/// Time is passed in by the caller so the state machine can be driven
/// deterministically.
pub(super) struct Debouncer {
    window: Duration,
    max_wait: Duration,
    pub(super) state: DebounceState,
    pub(super) changes: BTreeMap<PathBuf, ChangeEvent>,
}

impl Debouncer {
    pub(super) fn new(window: Duration, max_wait: Duration) -> Self {
        Self {
            window,
            max_wait,
            state: DebounceState::Idle,
            changes: BTreeMap::new(),
        }
    }

    /// Record an event and re-arm the deadline.
    ///
    /// Coalescing rules per path:
    /// - Deleted + Created/Modified → the new kind (file was restored)
    /// - Created/Modified + Deleted → Deleted
    /// - otherwise the first event wins
    ///
    /// A path never leaves the window once seen, so every burst yields a set.
    pub(super) fn record(&mut self, event: ChangeEvent, now: Instant) {
        match self.changes.get(&event.path).map(|e| e.kind) {
            None => {
                crate::debug!("watch"; "event {}: {}", event.kind.label(), event.path.display());
                self.changes.insert(event.path.clone(), event);
            }
            Some(existing) => match (existing, event.kind) {
                (ChangeKind::Deleted, ChangeKind::Created | ChangeKind::Modified) => {
                    crate::debug!("watch"; "restore deleted->{}: {}", event.kind.label(), event.path.display());
                    self.changes.insert(event.path.clone(), event);
                }
                (ChangeKind::Created | ChangeKind::Modified, ChangeKind::Deleted) => {
                    crate::debug!("watch"; "upgrade {}->deleted: {}", existing.label(), event.path.display());
                    if let Some(entry) = self.changes.get_mut(&event.path) {
                        entry.kind = ChangeKind::Deleted;
                    }
                }
                _ => {}
            },
        }

        self.arm(now);
    }

    fn arm(&mut self, now: Instant) {
        let first_at = match self.state {
            DebounceState::Idle => now,
            DebounceState::Collecting { first_at, .. } | DebounceState::Forced { first_at, .. } => {
                first_at
            }
        };

        let cap = first_at + self.max_wait;
        let sliding = now + self.window;
        self.state = if sliding >= cap {
            DebounceState::Forced {
                first_at,
                deadline: cap,
            }
        } else {
            DebounceState::Collecting {
                first_at,
                deadline: sliding,
            }
        };
    }

    pub(super) fn deadline(&self) -> Option<Instant> {
        match self.state {
            DebounceState::Idle => None,
            DebounceState::Collecting { deadline, .. } | DebounceState::Forced { deadline, .. } => {
                Some(deadline)
            }
        }
    }

    /// Take the collected change set once the deadline has passed.
    ///
    /// Returns `None` while the window is open or nothing was recorded.
    pub(super) fn poll(&mut self, now: Instant) -> Option<ChangeSet> {
        let deadline = self.deadline()?;
        if now < deadline {
            return None;
        }

        let forced = matches!(self.state, DebounceState::Forced { .. });
        self.state = DebounceState::Idle;
        let changes = std::mem::take(&mut self.changes);
        if changes.is_empty() {
            return None;
        }

        Some(ChangeSet { changes, forced })
    }

    /// Drop everything collected (unsubscribe).
    pub(super) fn clear(&mut self) {
        self.changes.clear();
        self.state = DebounceState::Idle;
    }

    /// Sleep duration until the deadline.
    pub(super) fn sleep_duration(&self, now: Instant) -> Duration {
        match self.deadline() {
            Some(deadline) => deadline
                .saturating_duration_since(now)
                .max(Duration::from_millis(1)),
            None => IDLE_SLEEP,
        }
    }
}
