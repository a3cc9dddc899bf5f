//! Path normalization utilities.

use std::path::{Path, PathBuf};

/// Normalize a file system path to absolute form.
///
/// Tries `canonicalize()` first (resolves symlinks, `.`, `..`).
/// Falls back to the path itself when absolute, or joins it with the
/// current directory when relative. Deleted files cannot be canonicalized,
/// so their parent is canonicalized instead when possible.
#[inline]
pub fn normalize_path(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    if let (Some(parent), Some(name)) = (path.parent(), path.file_name())
        && let Ok(parent) = parent.canonicalize()
    {
        return parent.join(name);
    }

    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().map_or_else(|_| path.to_path_buf(), |cwd| cwd.join(path))
    }
}

/// Path relative to `root`, or the path unchanged if it lies outside.
pub fn relative_to(path: &Path, root: &Path) -> PathBuf {
    path.strip_prefix(root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_relative() {
        let normalized = normalize_path(Path::new("relative/path/file.md"));
        assert!(normalized.is_absolute());
    }

    #[test]
    fn test_normalize_deleted_file_keeps_canonical_parent() {
        let dir = tempfile::TempDir::new().unwrap();
        let gone = dir.path().join("gone.md");
        let normalized = normalize_path(&gone);
        assert_eq!(
            normalized,
            dir.path().canonicalize().unwrap().join("gone.md")
        );
    }

    #[test]
    fn test_relative_to() {
        let root = Path::new("/site");
        assert_eq!(
            relative_to(Path::new("/site/content/a.md"), root),
            PathBuf::from("content/a.md")
        );
        assert_eq!(
            relative_to(Path::new("/elsewhere/a.md"), root),
            PathBuf::from("/elsewhere/a.md")
        );
    }
}
