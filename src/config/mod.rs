//! Site configuration management for `sitekeeper.toml`.
//!
//! # Sections
//!
//! | Section        | Purpose                                        |
//! |----------------|------------------------------------------------|
//! | `[watch]`      | Watch roots, debounce window, categories       |
//! | `[generator]`  | External generator command, ports, timeouts    |
//! | `[queue]`      | Build history capacity                         |
//! | `[live]`       | Live status WebSocket channel                  |
//! | `[validate]`   | Front matter schema and locale subtrees        |
//!
//! A missing config file is not an error: the defaults describe a stock Hugo
//! site rooted at the current directory.

mod error;
pub mod section;

pub use error::{ConfigDiagnostics, ConfigError};
pub use section::{
    CategoryConfig, GeneratorConfig, LiveConfig, QueueConfig, ValidateConfig, WatchConfig,
};

use crate::cli::{Cli, Commands};
use crate::log;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Default config file name.
pub const CONFIG_FILE: &str = "sitekeeper.toml";

/// Root configuration structure representing sitekeeper.toml
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Site root directory - parent of config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub watch: WatchConfig,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub live: LiveConfig,

    #[serde(default)]
    pub validate: ValidateConfig,
}

impl SiteConfig {
    /// Load configuration for a CLI invocation.
    ///
    /// Searches upward from cwd for the config file. The site root is the
    /// config file's parent directory, or cwd when no file exists.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;

        let (mut config, config_path) = match find_config_file(&cli.config) {
            Some(path) => (Self::from_path(&path)?, path),
            None => {
                crate::debug!("config"; "{} not found, using defaults", cli.config.display());
                (Self::default(), cwd.join(&cli.config))
            }
        };

        let root = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or(cwd);
        config.config_path = config_path;
        config.finalize(&root);
        config.apply_command_options(cli);
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from file path with unknown field detection.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }

        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>)> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })
        .map_err(ConfigError::Toml)?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {} are ignored:", display_path);
        for field in fields {
            eprintln!("- {}", field);
        }
    }

    /// Resolve root-relative paths.
    pub fn finalize(&mut self, root: &Path) {
        self.root = crate::utils::path::normalize_path(root);

        let output = expand_path(&self.generator.output);
        self.generator.output = if output.is_absolute() {
            output
        } else {
            self.root.join(output)
        };
    }

    /// Apply command-specific overrides.
    fn apply_command_options(&mut self, cli: &Cli) {
        if let Commands::Serve { port: Some(port), .. } = &cli.command {
            self.generator.port = *port;
        }
    }

    /// Check cross-field constraints, reporting every problem at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut diag = ConfigDiagnostics::new();

        if self.watch.roots.is_empty() {
            diag.error("watch.roots", "must list at least one glob");
        }
        for root in &self.watch.roots {
            if let Err(e) = globset::Glob::new(root) {
                diag.error("watch.roots", format!("invalid glob `{root}`: {e}"));
            }
        }
        if self.watch.debounce_ms == 0 {
            diag.error("watch.debounce_ms", "must be greater than 0");
        }
        if self.watch.max_wait_ms < self.watch.debounce_ms {
            diag.error_with_hint(
                "watch.max_wait_ms",
                format!(
                    "{}ms is shorter than the debounce window ({}ms)",
                    self.watch.max_wait_ms, self.watch.debounce_ms
                ),
                "max_wait_ms bounds how long a change set may be held back",
            );
        }

        if self.generator.command.is_empty() || self.generator.program_name().is_empty() {
            diag.error_with_hint(
                "generator.command",
                "must name the generator program",
                "e.g. command = [\"hugo\"]",
            );
        }
        for (field, value) in [
            ("generator.build_timeout_ms", self.generator.build_timeout_ms),
            ("generator.stop_timeout_ms", self.generator.stop_timeout_ms),
            ("generator.health_interval_ms", self.generator.health_interval_ms),
        ] {
            if value == 0 {
                diag.error(field, "must be greater than 0");
            }
        }

        if self.queue.history_capacity == 0 {
            diag.error("queue.history_capacity", "must be greater than 0");
        }

        if self.validate.locales.iter().any(|l| l.trim().is_empty()) {
            diag.error("validate.locales", "locale names must not be empty");
        }

        diag.into_result()
    }

    /// Get the site root directory path
    pub fn get_root(&self) -> &Path {
        &self.root
    }

    /// Get path relative to the site root
    pub fn root_relative(&self, path: impl AsRef<Path>) -> PathBuf {
        crate::utils::path::relative_to(path.as_ref(), &self.root)
    }

    /// Absolute generator output directory.
    pub fn output_dir(&self) -> &Path {
        &self.generator.output
    }
}

/// Expand `~` in a configured path.
fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    PathBuf::from(shellexpand::tilde(&raw).as_ref())
}

/// Find config file by searching upward from current directory
pub fn find_config_file(config_name: &Path) -> Option<PathBuf> {
    if config_name.is_absolute() {
        return config_name.exists().then(|| config_name.to_path_buf());
    }

    let cwd = std::env::current_dir().ok()?;
    let mut current = cwd.as_path();
    loop {
        let candidate = current.join(config_name);
        if candidate.exists() {
            return Some(candidate);
        }
        current = current.parent()?;
    }
}

/// Parse a config snippet rooted at `/site` (tests only).
#[cfg(test)]
pub fn test_parse_config(content: &str) -> SiteConfig {
    let mut config = SiteConfig::from_str(content).unwrap();
    config.root = PathBuf::from("/site");
    config
}
