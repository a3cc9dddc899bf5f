//! Single-flight build queue.
//!
//! At most one build runs at a time. Requests arriving while it runs fold
//! into a single pending slot, which is dispatched as soon as the running
//! build completes:
//!
//! ```text
//! Idle --enqueue--> Building --enqueue--> Pending --complete--> Building
//!   ^                  |                                           |
//!   +----complete------+-------------------------------------------+
//! ```

use std::collections::VecDeque;

use serde::Serialize;

use crate::core::{BuildId, BuildRecord, BuildRequest, BuildStatus, RequestId};
use crate::utils::time::now_millis;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueState {
    Idle,
    Building,
    /// Building, with a follow-up queued
    Pending,
}

/// The build currently running.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentBuild {
    pub build_id: BuildId,
    pub started_at: u64,
    pub request: BuildRequest,
}

/// Snapshot returned by [`BuildQueue::status`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub state: QueueState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_build: Option<CurrentBuild>,
    /// Oldest first
    pub recent_history: Vec<BuildRecord>,
}

/// Bounded FIFO of finished builds, in completion order.
#[derive(Debug, Clone)]
pub struct History {
    records: VecDeque<BuildRecord>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, record: BuildRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn latest(&self) -> Option<&BuildRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &BuildRecord> {
        self.records.iter()
    }
}

/// Build queue state. Owned by the coordinator, never shared.
#[derive(Debug)]
pub struct BuildQueue {
    current: Option<CurrentBuild>,
    pending: Option<BuildRequest>,
    history: History,
    next_request: u64,
    next_build: u64,
}

impl BuildQueue {
    pub fn new(history_capacity: usize) -> Self {
        Self {
            current: None,
            pending: None,
            history: History::new(history_capacity),
            next_request: 1,
            next_build: 1,
        }
    }

    /// Allocate the id for a new request.
    pub fn next_request_id(&mut self) -> RequestId {
        let id = RequestId(self.next_request);
        self.next_request += 1;
        id
    }

    fn next_build_id(&mut self) -> BuildId {
        let id = BuildId(self.next_build);
        self.next_build += 1;
        id
    }

    /// Accept a request.
    ///
    /// Returns the build to dispatch when the queue was idle; otherwise the
    /// request is merged into the pending slot and `None` is returned.
    pub fn enqueue(&mut self, request: BuildRequest) -> Option<CurrentBuild> {
        if self.current.is_none() {
            return Some(self.start(request));
        }

        match &mut self.pending {
            Some(pending) => {
                crate::debug!("queue"; "{} merged into pending {}", request.id, pending.id);
                pending.merge(request);
            }
            None => {
                crate::debug!("queue"; "{} pending", request.id);
                self.pending = Some(request);
            }
        }
        None
    }

    fn start(&mut self, request: BuildRequest) -> CurrentBuild {
        let build = CurrentBuild {
            build_id: self.next_build_id(),
            started_at: now_millis(),
            request,
        };
        self.current = Some(build.clone());
        build
    }

    /// Record a finished build and dispatch the pending request, if any.
    pub fn complete(&mut self, record: BuildRecord) -> Option<CurrentBuild> {
        if self.current.as_ref().map(|c| c.build_id) != Some(record.id) {
            crate::debug!("queue"; "completion for unknown {}", record.id);
        }
        self.current = None;
        self.history.push(record);

        let pending = self.pending.take()?;
        Some(self.start(pending))
    }

    /// Drop the pending request, recording it as cancelled.
    pub fn cancel_pending(&mut self) -> Option<BuildRecord> {
        let pending = self.pending.take()?;
        let id = self.next_build_id();
        let record = BuildRecord::cancelled(id, &pending);
        self.history.push(record.clone());
        Some(record)
    }

    pub fn state(&self) -> QueueState {
        match (&self.current, &self.pending) {
            (None, _) => QueueState::Idle,
            (Some(_), None) => QueueState::Building,
            (Some(_), Some(_)) => QueueState::Pending,
        }
    }

    /// Newest retained record serving request `id`.
    pub fn find(&self, id: RequestId) -> Option<&BuildRecord> {
        self.history.iter().rev().find(|r| r.serves(id))
    }

    /// Request `id` is running or waiting in the pending slot.
    pub fn is_outstanding(&self, id: RequestId) -> bool {
        let carries = |r: &BuildRequest| r.id == id || r.merged_ids.contains(&id);
        self.current.as_ref().is_some_and(|c| carries(&c.request))
            || self.pending.as_ref().is_some_and(carries)
    }

    pub fn is_building(&self) -> bool {
        self.current.is_some()
    }

    pub fn latest(&self) -> Option<&BuildRecord> {
        self.history.latest()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            state: self.state(),
            current_build: self.current.clone(),
            recent_history: self.history.iter().cloned().collect(),
        }
    }
}

/// Aggregates over the retained history.
///
/// Cancelled records never ran and are left out.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub builds: usize,
    /// Successful builds over finished builds, `0.0` with no builds
    pub success_rate: f64,
    pub mean_duration_ms: u64,
}

impl Metrics {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a BuildRecord>) -> Self {
        let (builds, successes, total_ms) = records
            .into_iter()
            .filter(|r| r.status != BuildStatus::Cancelled)
            .fold((0usize, 0usize, 0u64), |(n, ok, ms), r| {
                (n + 1, ok + usize::from(r.is_success()), ms.saturating_add(r.duration_ms))
            });

        if builds == 0 {
            return Self {
                builds: 0,
                success_rate: 0.0,
                mean_duration_ms: 0,
            };
        }
        Self {
            builds,
            success_rate: successes as f64 / builds as f64,
            mean_duration_ms: total_ms / builds as u64,
        }
    }
}
