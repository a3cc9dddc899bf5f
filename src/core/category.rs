//! File category definitions.

use std::path::Path;

use serde::Serialize;

/// Kind of content file, determines whether front matter is validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentKind {
    /// Markdown file (.md, .markdown)
    Markdown,
    /// HTML content with front matter (.html, .htm)
    Html,
}

impl ContentKind {
    /// Detect content kind from file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "md" | "markdown" => Some(Self::Markdown),
            "html" | "htm" => Some(Self::Html),
            _ => None,
        }
    }

    /// Detect content kind from file path.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Check if a path is a content file.
    #[inline]
    pub fn is_content_file(path: &Path) -> bool {
        Self::from_path(path).is_some()
    }
}

/// Category of a changed file, derived from its path prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    /// Content sources (front matter is validated)
    Content,
    /// Templates and partials
    Layout,
    /// Assets copied as-is
    Static,
    /// Site configuration
    Config,
}

impl FileCategory {
    pub fn name(self) -> &'static str {
        match self {
            Self::Content => "content",
            Self::Layout => "layout",
            Self::Static => "static",
            Self::Config => "config",
        }
    }
}

/// What happened to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Created,
    Modified,
    Deleted,
}

impl ChangeKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_from_extension() {
        assert_eq!(
            ContentKind::from_extension("md"),
            Some(ContentKind::Markdown)
        );
        assert_eq!(ContentKind::from_extension("HTML"), Some(ContentKind::Html));
        assert_eq!(ContentKind::from_extension("css"), None);
    }

    #[test]
    fn test_is_content_file() {
        assert!(ContentKind::is_content_file(&PathBuf::from("post.md")));
        assert!(ContentKind::is_content_file(&PathBuf::from("doc.markdown")));
        assert!(!ContentKind::is_content_file(&PathBuf::from("image.png")));
        assert!(!ContentKind::is_content_file(&PathBuf::from("noext")));
    }

    #[test]
    fn test_category_serializes_lowercase() {
        let json = serde_json::to_string(&FileCategory::Layout).unwrap();
        assert_eq!(json, "\"layout\"");
    }
}
