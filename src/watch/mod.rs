//! File watching.
//!
//! Observes the site's source trees and turns raw notifications into
//! debounced, categorized change sets.
//!
//! Architecture:
//! ```text
//! notify → classifier (glob, temp files, category) → debouncer (timing) → on_change
//! ```
//!
//! Each subscription owns a watcher thread. The callback runs on that
//! thread, so it should hand the change set off rather than do work inline.

mod classifier;
mod debouncer;
mod roots;
mod types;


pub use types::{ChangeEvent, ChangeSet};

use std::path::Path;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, Sender};
use notify::event::{ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher};
use thiserror::Error;

use crate::config::SiteConfig;
use crate::core::{ChangeKind, FailureKind};
use crate::log;
use crate::utils::path::normalize_path;
use classifier::PathClassifier;
use debouncer::Debouncer;
use roots::{RootTarget, WatchRoots};

/// How often detached roots are re-checked.
const MAINTAIN_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WatchError {
    #[error("watch root `{root}` unavailable: {reason}")]
    WatchUnavailable { root: String, reason: String },

    #[error("no watchable root ({} unavailable)", .unavailable.len())]
    NoWatchableRoot { unavailable: Vec<WatchError> },

    #[error("invalid watch glob: {0}")]
    InvalidGlob(String),

    #[error("failed to start watcher: {0}")]
    Backend(String),
}

impl WatchError {
    pub fn kind(&self) -> FailureKind {
        FailureKind::WatchUnavailable
    }
}

/// Factory for watch subscriptions on one site.
pub struct FileWatcher {
    config: Arc<SiteConfig>,
}

impl FileWatcher {
    pub fn new(config: Arc<SiteConfig>) -> Self {
        Self { config }
    }

    /// Watch `roots` (globs relative to the site root), invoking `on_change`
    /// with every settled change set.
    ///
    /// Succeeds when at least one root attaches; the rest are reported on
    /// the handle and re-attached if they appear later.
    pub fn subscribe<F>(&self, roots: &[String], on_change: F) -> Result<WatchHandle, WatchError>
    where
        F: FnMut(ChangeSet) + Send + 'static,
    {
        let classifier = PathClassifier::new(&self.config, roots)
            .map_err(|e| WatchError::InvalidGlob(e.to_string()))?;

        let (event_tx, event_rx) = crossbeam::channel::unbounded();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = event_tx.send(res);
        })
        .map_err(|e| WatchError::Backend(e.to_string()))?;

        let root = self.config.get_root();
        let targets = roots.iter().map(|glob| RootTarget::resolve(root, glob)).collect();
        let mut watch_roots = WatchRoots::new(targets);
        let unavailable = watch_roots.attach_existing(&mut watcher);

        if watch_roots.attached_count() == 0 {
            return Err(WatchError::NoWatchableRoot { unavailable });
        }
        for err in &unavailable {
            log!("watch"; "{}", err);
        }

        let attached = watch_roots.attached_count();
        let (stop_tx, stop_rx) = crossbeam::channel::bounded(1);
        let watch_loop = WatchLoop {
            event_rx,
            stop_rx,
            watcher,
            roots: watch_roots,
            classifier,
            debouncer: Debouncer::new(self.config.watch.debounce(), self.config.watch.max_wait()),
            on_change: Box::new(on_change),
        };

        let thread = std::thread::Builder::new()
            .name("sitekeeper-watch".into())
            .spawn(move || watch_loop.run())
            .map_err(|e| WatchError::Backend(e.to_string()))?;

        crate::debug!("watch"; "watching {} director(ies)", attached);
        Ok(WatchHandle {
            stop_tx,
            thread: Some(thread),
            unavailable,
        })
    }

    /// Release a subscription. Equivalent to dropping the handle.
    pub fn unsubscribe(&self, handle: WatchHandle) {
        handle.unsubscribe();
    }
}

/// A live subscription. Dropping it stops the watcher and discards any
/// change set still collecting.
pub struct WatchHandle {
    stop_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
    unavailable: Vec<WatchError>,
}

impl WatchHandle {
    /// Roots that could not be attached at subscribe time.
    pub fn unavailable(&self) -> &[WatchError] {
        &self.unavailable
    }

    pub fn unsubscribe(self) {}
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

struct WatchLoop {
    event_rx: Receiver<notify::Result<notify::Event>>,
    stop_rx: Receiver<()>,
    /// Watcher handle (must be kept alive)
    watcher: RecommendedWatcher,
    roots: WatchRoots,
    classifier: PathClassifier,
    debouncer: Debouncer,
    on_change: Box<dyn FnMut(ChangeSet) + Send>,
}

impl WatchLoop {
    fn run(mut self) {
        let mut last_maintain = Instant::now();
        let (event_rx, stop_rx) = (self.event_rx.clone(), self.stop_rx.clone());

        loop {
            let timeout = self
                .debouncer
                .sleep_duration(Instant::now())
                .min(MAINTAIN_INTERVAL);

            crossbeam::channel::select! {
                recv(stop_rx) -> _ => break,
                recv(event_rx) -> msg => match msg {
                    Ok(Ok(event)) => self.add_event(&event),
                    Ok(Err(e)) => log!("watch"; "notify error: {}", e),
                    Err(_) => break,
                },
                default(timeout) => {}
            }

            if last_maintain.elapsed() >= MAINTAIN_INTERVAL {
                self.roots.maintain(&mut self.watcher);
                last_maintain = Instant::now();
            }

            if let Some(changes) = self.debouncer.poll(Instant::now()) {
                if changes.forced {
                    crate::debug!("watch"; "max wait reached, dispatching {} change(s)", changes.len());
                }
                (self.on_change)(changes);
            }
        }

        self.debouncer.clear();
    }

    fn add_event(&mut self, event: &notify::Event) {
        let Some(kind) = change_kind(&event.kind) else {
            return;
        };
        crate::debug!("watch"; "raw notify: {:?} {:?}", event.kind, event.paths);

        let now = Instant::now();
        for path in &event.paths {
            let kind = kind.unwrap_or_else(|| kind_by_existence(path));
            if kind != ChangeKind::Deleted && path.is_dir() {
                continue;
            }

            let path = normalize_path(path);
            let Some((relative, category)) = self.classifier.classify(&path) else {
                continue;
            };

            self.debouncer.record(
                ChangeEvent {
                    path: relative,
                    kind,
                    category,
                    timestamp: crate::utils::time::now_millis(),
                },
                now,
            );
        }
    }
}

/// Map a notify event kind. `Some(None)` means the kind has to be decided
/// per path from the filesystem (renames).
fn change_kind(kind: &EventKind) -> Option<Option<ChangeKind>> {
    match kind {
        EventKind::Create(_) => Some(Some(ChangeKind::Created)),
        EventKind::Remove(_) => Some(Some(ChangeKind::Deleted)),
        // Ignore metadata-only changes (mtime/atime/chmod noise)
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(Some(ChangeKind::Deleted)),
        EventKind::Modify(ModifyKind::Name(_)) => Some(None),
        EventKind::Modify(_) => Some(Some(ChangeKind::Modified)),
        _ => None,
    }
}

fn kind_by_existence(path: &Path) -> ChangeKind {
    if path.exists() {
        ChangeKind::Modified
    } else {
        ChangeKind::Deleted
    }
}
