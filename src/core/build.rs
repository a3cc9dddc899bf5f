//! Build requests and records.
//!
//! A `BuildRequest` lives in the queue until it is dispatched or merged into
//! the pending slot. Once a build finishes its outcome is frozen into a
//! `BuildRecord` and appended to the bounded history.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use super::failure::{Failure, FailureKind};
use crate::frontmatter::{ValidationMode, ValidationResult};

/// Generator build mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Development build (drafts, no minification)
    Dev,
    /// Production build
    Production,
}

impl BuildMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Production => "production",
        }
    }

    /// The stronger of two modes; production wins.
    pub fn max(self, other: Self) -> Self {
        if self == Self::Production || other == Self::Production {
            Self::Production
        } else {
            Self::Dev
        }
    }
}

/// What caused a build request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Trigger {
    FileChange,
    Manual,
    Scheduled,
}

impl Trigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FileChange => "file-change",
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
        }
    }
}

/// Identifier of an accepted build request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Identifier of a build attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct BuildId(pub u64);

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "build-{}", self.0)
    }
}

/// A request to rebuild the site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub id: RequestId,
    pub trigger: Trigger,
    pub requested_at: u64,
    pub changed_paths: BTreeSet<PathBuf>,
    pub mode: BuildMode,
    pub validation: ValidationMode,
    /// Later requests folded into this one while it waited in the pending slot
    pub merged_ids: Vec<RequestId>,
    /// Gate every content file, not just the changed ones
    pub validate_all: bool,
}

impl BuildRequest {
    pub fn new(
        id: RequestId,
        trigger: Trigger,
        mode: BuildMode,
        validation: ValidationMode,
        changed_paths: BTreeSet<PathBuf>,
    ) -> Self {
        // A manual or scheduled build without paths rebuilds everything
        let validate_all = trigger != Trigger::FileChange && changed_paths.is_empty();
        Self {
            id,
            trigger,
            requested_at: crate::utils::time::now_millis(),
            validate_all,
            changed_paths,
            mode,
            validation,
            merged_ids: Vec::new(),
        }
    }

    /// Fold a later request into this one.
    ///
    /// Paths are unioned; production mode, strict validation and the
    /// validate-all gate are sticky.
    pub fn merge(&mut self, other: BuildRequest) {
        self.changed_paths.extend(other.changed_paths);
        self.validate_all |= other.validate_all;
        self.mode = self.mode.max(other.mode);
        self.validation = self.validation.max(other.validation);
        self.merged_ids.push(other.id);
        self.merged_ids.extend(other.merged_ids);
    }
}

/// Terminal status of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildStatus {
    Success,
    Failure,
    Cancelled,
}

/// Immutable outcome of one build attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRecord {
    pub id: BuildId,
    pub started_at: u64,
    pub finished_at: u64,
    pub status: BuildStatus,
    pub duration_ms: u64,
    pub stderr_excerpt: String,
    pub triggering_request_id: RequestId,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub merged_request_ids: Vec<RequestId>,
    pub mode: BuildMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    /// Failing results: blocking errors in strict mode, warnings in lenient mode
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub validation: Vec<ValidationResult>,
}

impl BuildRecord {
    /// Record for a pending request that never ran (dropped at shutdown).
    pub fn cancelled(id: BuildId, request: &BuildRequest) -> Self {
        let now = crate::utils::time::now_millis();
        Self {
            id,
            started_at: now,
            finished_at: now,
            status: BuildStatus::Cancelled,
            duration_ms: 0,
            stderr_excerpt: String::new(),
            triggering_request_id: request.id,
            merged_request_ids: request.merged_ids.clone(),
            mode: request.mode,
            exit_code: None,
            failure: Some(Failure::new(
                FailureKind::Cancelled,
                "shutdown before the build started",
            )),
            validation: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == BuildStatus::Success
    }

    /// Whether this build ran (or was cancelled) on behalf of request `id`.
    pub fn serves(&self, id: RequestId) -> bool {
        self.triggering_request_id == id || self.merged_request_ids.contains(&id)
    }

    /// Field names of blocking validation errors, in report order.
    pub fn failed_fields(&self) -> impl Iterator<Item = &str> {
        self.validation
            .iter()
            .filter(|r| r.blocking)
            .flat_map(|r| r.errors.iter().map(|e| e.field.as_str()))
    }
}
