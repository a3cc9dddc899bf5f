//! `[watch]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [watch]
//! roots = ["content/**", "layouts/**", "static/**", "hugo.toml"]
//! debounce_ms = 500           # Quiet period before a change set is dispatched
//! max_wait_ms = 5000          # Upper bound under a continuous event stream
//!
//! [watch.categories]
//! content = ["content"]
//! layout = ["layouts", "themes"]
//! static = ["static", "assets"]
//! config = ["hugo.toml", "config"]
//! ```
//!
//! Roots are globs relative to the site root. Categories are path prefixes,
//! also relative to the site root; the first matching category wins in the
//! order config, content, layout, static.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// File watching settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Globs (relative to the site root) selecting watched files.
    pub roots: Vec<String>,

    /// Sliding debounce window in milliseconds.
    pub debounce_ms: u64,

    /// Maximum time a change set may be held back, in milliseconds.
    pub max_wait_ms: u64,

    /// Path-prefix rules for change categories.
    pub categories: CategoryConfig,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            roots: [
                "content/**",
                "layouts/**",
                "themes/**",
                "static/**",
                "assets/**",
                "config/**",
                "hugo.toml",
                "config.toml",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            debounce_ms: 500,
            max_wait_ms: 5000,
            categories: CategoryConfig::default(),
        }
    }
}

impl WatchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

/// Path prefixes mapping changed files to categories.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    pub content: Vec<PathBuf>,
    pub layout: Vec<PathBuf>,
    #[serde(rename = "static")]
    pub static_files: Vec<PathBuf>,
    pub config: Vec<PathBuf>,
}

impl Default for CategoryConfig {
    fn default() -> Self {
        fn paths(items: &[&str]) -> Vec<PathBuf> {
            items.iter().map(PathBuf::from).collect()
        }
        Self {
            content: paths(&["content"]),
            layout: paths(&["layouts", "themes"]),
            static_files: paths(&["static", "assets"]),
            config: paths(&["config", "hugo.toml", "config.toml", "hugo.yaml", "config.yaml"]),
        }
    }
}
