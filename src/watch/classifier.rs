use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::{CategoryConfig, SiteConfig};
use crate::core::FileCategory;

/// Decides whether a raw path is watched, and which category it belongs to.
pub(super) struct PathClassifier {
    root: PathBuf,
    output: PathBuf,
    globs: GlobSet,
    categories: CategoryConfig,
}

impl PathClassifier {
    pub(super) fn new(config: &SiteConfig, roots: &[String]) -> Result<Self, globset::Error> {
        let mut builder = GlobSetBuilder::new();
        for root in roots {
            builder.add(Glob::new(root)?);
        }

        Ok(Self {
            root: config.get_root().to_path_buf(),
            output: config.output_dir().to_path_buf(),
            globs: builder.build()?,
            categories: config.watch.categories.clone(),
        })
    }

    /// Root-relative path and category, or `None` if the path is not watched.
    pub(super) fn classify(&self, path: &Path) -> Option<(PathBuf, FileCategory)> {
        if is_temp_file(path) || path.starts_with(&self.output) {
            return None;
        }

        let relative = path.strip_prefix(&self.root).ok()?;
        if !self.globs.is_match(relative) {
            return None;
        }

        Some((relative.to_path_buf(), self.category(relative)))
    }

    /// Category by path prefix. Config wins over the directory categories,
    /// and anything unmatched is treated as static.
    pub(super) fn category(&self, relative: &Path) -> FileCategory {
        let matches = |prefixes: &[PathBuf]| prefixes.iter().any(|p| relative.starts_with(p));

        if matches(&self.categories.config) {
            FileCategory::Config
        } else if matches(&self.categories.content) {
            FileCategory::Content
        } else if matches(&self.categories.layout) {
            FileCategory::Layout
        } else {
            FileCategory::Static
        }
    }
}

/// Check if path is a temp/backup file (editor artifacts).
pub(super) fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "swx" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
        || name.starts_with('#')
}
