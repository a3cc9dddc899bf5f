use std::path::{Path, PathBuf};

use notify::{RecursiveMode, Watcher};
use rustc_hash::FxHashSet;

use super::WatchError;

/// Directory that must be watched for one glob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) struct RootTarget {
    /// Glob as configured
    pub(super) glob: String,
    /// Absolute literal base directory of the glob
    pub(super) dir: PathBuf,
    pub(super) mode: RecursiveMode,
}

impl RootTarget {
    /// Resolve a root-relative glob to the directory that has to be watched.
    ///
    /// `content/**/*.md` → `content` (recursive), `hugo.toml` → the site
    /// root (non-recursive; the glob set filters siblings out).
    pub(super) fn resolve(root: &Path, glob: &str) -> Self {
        let literal = literal_prefix(glob);
        let has_meta = literal.len() < glob.len();

        let dir = if has_meta {
            // Up to the last separator before the first metacharacter
            match literal.rfind('/') {
                Some(i) => root.join(&literal[..i]),
                None => root.to_path_buf(),
            }
        } else {
            root.join(glob)
                .parent()
                .map_or_else(|| root.to_path_buf(), Path::to_path_buf)
        };

        let mode = if has_meta {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        Self {
            glob: glob.to_string(),
            dir,
            mode,
        }
    }
}

fn literal_prefix(glob: &str) -> &str {
    let end = glob
        .find(|c| matches!(c, '*' | '?' | '[' | '{'))
        .unwrap_or(glob.len());
    &glob[..end]
}

/// Watch-root consistency manager.
///
/// Responsibility:
/// - Attach existing roots at subscribe time
/// - Re-attach roots that were removed and recreated
pub(super) struct WatchRoots {
    desired: Vec<RootTarget>,
    attached: FxHashSet<PathBuf>,
}

impl WatchRoots {
    /// Deduplicate by directory; recursive wins over non-recursive.
    pub(super) fn new(targets: Vec<RootTarget>) -> Self {
        let mut desired: Vec<RootTarget> = Vec::new();
        for target in targets {
            match desired.iter_mut().find(|d| d.dir == target.dir) {
                Some(existing) => {
                    if target.mode == RecursiveMode::Recursive {
                        existing.mode = RecursiveMode::Recursive;
                    }
                }
                None => desired.push(target),
            }
        }

        Self {
            desired,
            attached: FxHashSet::default(),
        }
    }

    /// Attach every root that exists now, returning the ones that could not
    /// be attached.
    pub(super) fn attach_existing(&mut self, watcher: &mut impl Watcher) -> Vec<WatchError> {
        let mut unavailable = Vec::new();

        for target in &self.desired {
            if !target.dir.is_dir() {
                unavailable.push(WatchError::WatchUnavailable {
                    root: target.glob.clone(),
                    reason: format!("{} is not a directory", target.dir.display()),
                });
                continue;
            }

            match watcher.watch(&target.dir, target.mode) {
                Ok(()) => {
                    self.attached.insert(target.dir.clone());
                }
                Err(e) => unavailable.push(WatchError::WatchUnavailable {
                    root: target.glob.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        unavailable
    }

    pub(super) fn attached_count(&self) -> usize {
        self.attached.len()
    }

    /// Returns the directories attached by this call.
    pub(super) fn maintain(&mut self, watcher: &mut impl Watcher) -> Vec<PathBuf> {
        // Drop stale handles for roots that no longer exist.
        self.attached.retain(|path| path.exists());

        let mut reattached = Vec::new();
        for target in &self.desired {
            if self.attached.contains(&target.dir) || !target.dir.is_dir() {
                continue;
            }

            if watcher.watch(&target.dir, target.mode).is_ok() {
                self.attached.insert(target.dir.clone());
                crate::debug!("watch"; "re-attached watch: {}", target.dir.display());
                reattached.push(target.dir.clone());
            }
        }
        reattached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_globs() {
        let root = Path::new("/site");

        let target = RootTarget::resolve(root, "content/**");
        assert_eq!(target.dir, PathBuf::from("/site/content"));
        assert_eq!(target.mode, RecursiveMode::Recursive);

        let target = RootTarget::resolve(root, "content/posts/*.md");
        assert_eq!(target.dir, PathBuf::from("/site/content/posts"));

        let target = RootTarget::resolve(root, "**/*.md");
        assert_eq!(target.dir, PathBuf::from("/site"));
        assert_eq!(target.mode, RecursiveMode::Recursive);

        let target = RootTarget::resolve(root, "hugo.toml");
        assert_eq!(target.dir, PathBuf::from("/site"));
        assert_eq!(target.mode, RecursiveMode::NonRecursive);

        let target = RootTarget::resolve(root, "config/_default/params.toml");
        assert_eq!(target.dir, PathBuf::from("/site/config/_default"));
    }

    #[test]
    fn test_dedup_prefers_recursive() {
        let root = Path::new("/site");
        let roots = WatchRoots::new(vec![
            RootTarget::resolve(root, "hugo.toml"),
            RootTarget::resolve(root, "config.toml"),
            RootTarget::resolve(root, "*.yaml"),
        ]);
        assert_eq!(roots.desired.len(), 1);
        assert_eq!(roots.desired[0].glob, "hugo.toml");
        assert_eq!(roots.desired[0].mode, RecursiveMode::Recursive);
    }
}
