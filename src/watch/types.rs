use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::core::{ChangeKind, FileCategory};

/// A single normalized file change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeEvent {
    /// Path relative to the site root
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub category: FileCategory,
    /// Unix milliseconds of the first event seen for this path
    pub timestamp: u64,
}

/// Coalesced output of one debounce window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub changes: BTreeMap<PathBuf, ChangeEvent>,
    /// Dispatched because the max-wait cap expired, not because edits settled
    pub forced: bool,
}

impl ChangeSet {
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn events(&self) -> impl Iterator<Item = &ChangeEvent> {
        self.changes.values()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.changes.keys().map(PathBuf::as_path)
    }
}
