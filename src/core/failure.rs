//! Machine-readable failure descriptions carried by records and events.

use std::fmt;

use serde::Serialize;

/// Failure kind, stable across the live channel and status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    WatchUnavailable,
    ValidationFailure,
    BuildFailure,
    ProcessCrash,
    PortInUse,
    Timeout,
    /// Pending request dropped by shutdown
    Cancelled,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WatchUnavailable => "watch-unavailable",
            Self::ValidationFailure => "validation-failure",
            Self::BuildFailure => "build-failure",
            Self::ProcessCrash => "process-crash",
            Self::PortInUse => "port-in-use",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure with its kind and a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
